//! Configurable in-memory adapters for tests.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use verbatim_core::audio::AudioInput;
use verbatim_core::transcript::{
    DiarizationResult, DiarizationSegment, TranscriptResult, TranscriptSegment,
};

use crate::contract::{
    feature, AdapterError, DiarizationAdapter, ModelCapabilities, ParamKind, ParamMap,
    ParameterSpec, ProcessingContext, TranscriptionAdapter,
};

fn mock_capabilities(model_id: &str, diarization: bool) -> ModelCapabilities {
    ModelCapabilities {
        model_id: model_id.to_owned(),
        model_family: "mock".to_owned(),
        display_name: format!("Mock {model_id}"),
        description: "test double".to_owned(),
        supported_languages: vec!["en".to_owned()],
        supported_formats: vec!["wav".to_owned(), "webm".to_owned(), "mp3".to_owned()],
        requires_gpu: false,
        memory_requirement_mb: 0,
        requires_mono_16k: false,
        features: BTreeMap::from([
            (feature::TIMESTAMPS.to_owned(), true),
            (feature::DIARIZATION.to_owned(), diarization),
        ]),
        metadata: BTreeMap::new(),
    }
}

fn mock_schema() -> Vec<ParameterSpec> {
    vec![
        ParameterSpec::new("model", ParamKind::String, "basic", "model name"),
        ParameterSpec::new("temperature", ParamKind::Float, "quality", "sampling temperature")
            .range(0.0, 1.0),
    ]
}

/// Canned two-speaker dialog used as the default mock transcript.
pub fn sample_transcript() -> TranscriptResult {
    TranscriptResult {
        language: "en".into(),
        text: "hello there general kenobi".into(),
        segments: vec![
            TranscriptSegment {
                start: 0.0,
                end: 2.0,
                text: "hello there".into(),
                speaker: None,
                words: None,
            },
            TranscriptSegment {
                start: 2.0,
                end: 4.5,
                text: "general kenobi".into(),
                speaker: None,
                words: None,
            },
        ],
        word_segments: None,
        processing_time: 0.1,
        model_used: "mock".into(),
        metadata: BTreeMap::new(),
    }
}

pub struct MockTranscription {
    capabilities: ModelCapabilities,
    schema: Vec<ParameterSpec>,
    result: Mutex<Result<TranscriptResult, String>>,
    ready: AtomicBool,
    fail_preparation: AtomicBool,
    pub calls: AtomicUsize,
    pub last_params: Mutex<Option<ParamMap>>,
}

impl MockTranscription {
    pub fn succeeding(model_id: &str) -> Self {
        Self {
            capabilities: mock_capabilities(model_id, false),
            schema: mock_schema(),
            result: Mutex::new(Ok(sample_transcript())),
            ready: AtomicBool::new(true),
            fail_preparation: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
            last_params: Mutex::new(None),
        }
    }

    pub fn failing(model_id: &str, message: &str) -> Self {
        let mock = Self::succeeding(model_id);
        *mock.result.lock() = Err(message.to_owned());
        mock
    }

    pub fn with_result(self, result: TranscriptResult) -> Self {
        *self.result.lock() = Ok(result);
        self
    }

    pub fn with_native_diarization(mut self) -> Self {
        self.capabilities
            .features
            .insert(feature::DIARIZATION.to_owned(), true);
        self
    }

    pub fn requiring_mono_16k(mut self) -> Self {
        self.capabilities.requires_mono_16k = true;
        self
    }

    pub fn not_ready(self) -> Self {
        self.ready.store(false, Ordering::SeqCst);
        self
    }

    pub fn failing_preparation(self) -> Self {
        self.fail_preparation.store(true, Ordering::SeqCst);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TranscriptionAdapter for MockTranscription {
    fn capabilities(&self) -> &ModelCapabilities {
        &self.capabilities
    }

    fn parameter_schema(&self) -> &[ParameterSpec] {
        &self.schema
    }

    async fn prepare_environment(&self) -> Result<(), AdapterError> {
        if self.fail_preparation.load(Ordering::SeqCst) {
            return Err(AdapterError::NotReady(self.capabilities.model_id.clone()));
        }
        Ok(())
    }

    async fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    async fn transcribe(
        &self,
        _audio: &AudioInput,
        params: &ParamMap,
        _proc_ctx: &ProcessingContext,
        cancel: &CancellationToken,
    ) -> Result<TranscriptResult, AdapterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_params.lock() = Some(params.clone());
        if cancel.is_cancelled() {
            return Err(AdapterError::Cancelled);
        }
        self.result
            .lock()
            .clone()
            .map_err(|msg| AdapterError::Backend { status: 500, body: msg })
    }
}

/// Two-speaker diarization covering the sample transcript's span.
pub fn sample_diarization() -> DiarizationResult {
    DiarizationResult {
        segments: vec![
            DiarizationSegment { start: 0.0, end: 2.1, speaker: "SPEAKER_00".into() },
            DiarizationSegment { start: 2.1, end: 4.5, speaker: "SPEAKER_01".into() },
        ],
    }
}

pub struct MockDiarization {
    capabilities: ModelCapabilities,
    schema: Vec<ParameterSpec>,
    result: Mutex<Result<DiarizationResult, String>>,
    ready: AtomicBool,
    pub calls: AtomicUsize,
}

impl MockDiarization {
    pub fn succeeding(model_id: &str) -> Self {
        Self {
            capabilities: mock_capabilities(model_id, true),
            schema: mock_schema(),
            result: Mutex::new(Ok(sample_diarization())),
            ready: AtomicBool::new(true),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(model_id: &str, message: &str) -> Self {
        let mock = Self::succeeding(model_id);
        *mock.result.lock() = Err(message.to_owned());
        mock
    }

    pub fn with_segments(self, segments: Vec<DiarizationSegment>) -> Self {
        *self.result.lock() = Ok(DiarizationResult { segments });
        self
    }

    pub fn not_ready(self) -> Self {
        self.ready.store(false, Ordering::SeqCst);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DiarizationAdapter for MockDiarization {
    fn capabilities(&self) -> &ModelCapabilities {
        &self.capabilities
    }

    fn parameter_schema(&self) -> &[ParameterSpec] {
        &self.schema
    }

    async fn prepare_environment(&self) -> Result<(), AdapterError> {
        Ok(())
    }

    async fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    async fn diarize(
        &self,
        _audio: &AudioInput,
        _params: &ParamMap,
        _proc_ctx: &ProcessingContext,
        cancel: &CancellationToken,
    ) -> Result<DiarizationResult, AdapterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if cancel.is_cancelled() {
            return Err(AdapterError::Cancelled);
        }
        self.result
            .lock()
            .clone()
            .map_err(|msg| AdapterError::Backend { status: 500, body: msg })
    }
}
