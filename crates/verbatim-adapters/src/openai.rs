//! OpenAI-hosted Whisper transcription.

use std::collections::BTreeMap;
use std::time::Instant;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use verbatim_core::audio::AudioInput;
use verbatim_core::transcript::TranscriptResult;

use crate::cloud;
use crate::contract::{
    f64_param, feature, str_param, AdapterError, ModelCapabilities, ParamKind, ParamMap,
    ParameterSpec, ProcessingContext, TranscriptionAdapter,
};

const API_URL: &str = "https://api.openai.com/v1/audio/transcriptions";
pub const DEFAULT_MODEL: &str = "whisper-1";

pub struct OpenAiAdapter {
    client: reqwest::Client,
    api_key: Option<String>,
    capabilities: ModelCapabilities,
    schema: Vec<ParameterSpec>,
}

impl OpenAiAdapter {
    pub fn new(api_key: Option<String>) -> Self {
        let capabilities = ModelCapabilities {
            model_id: "openai_whisper".into(),
            model_family: "openai".into(),
            display_name: "OpenAI Whisper API".into(),
            description: "Hosted Whisper transcription".into(),
            supported_languages: ["de", "en", "es", "fr", "it", "ja", "ko", "nl", "pl", "pt", "ru", "zh"]
                .iter()
                .map(|s| (*s).to_owned())
                .collect(),
            supported_formats: ["flac", "mp3", "mp4", "mpeg", "mpga", "m4a", "ogg", "wav", "webm"]
                .iter()
                .map(|s| (*s).to_owned())
                .collect(),
            requires_gpu: false,
            memory_requirement_mb: 0,
            requires_mono_16k: false,
            features: [
                (feature::TIMESTAMPS, true),
                (feature::WORD_LEVEL, false),
                (feature::DIARIZATION, false),
                (feature::TRANSLATION, true),
                (feature::LANGUAGE_DETECTION, true),
            ]
            .iter()
            .map(|(k, v)| ((*k).to_owned(), *v))
            .collect(),
            metadata: BTreeMap::from([
                ("provider".to_owned(), "openai".to_owned()),
                ("api_url".to_owned(), API_URL.to_owned()),
            ]),
        };

        let schema = vec![
            ParameterSpec::new("api_key", ParamKind::String, "authentication",
                "OpenAI API key (overrides the system default)"),
            ParameterSpec::new("model", ParamKind::String, "basic", "Whisper model")
                .default_value(serde_json::json!(DEFAULT_MODEL)),
            ParameterSpec::new("language", ParamKind::String, "basic",
                "Language of the input audio (ISO-639-1)"),
            ParameterSpec::new("prompt", ParamKind::String, "advanced",
                "Optional text to guide the model style"),
            ParameterSpec::new("temperature", ParamKind::Float, "quality", "Sampling temperature")
                .default_value(serde_json::json!(0.0))
                .range(0.0, 1.0),
        ];

        Self {
            client: cloud::build_client(),
            api_key,
            capabilities,
            schema,
        }
    }

    fn resolve_api_key(&self, params: &ParamMap) -> Result<String, AdapterError> {
        str_param(params, "api_key")
            .map(str::to_owned)
            .or_else(|| self.api_key.clone())
            .ok_or_else(|| AdapterError::MissingCredential("openai_whisper".into()))
    }
}

#[async_trait]
impl TranscriptionAdapter for OpenAiAdapter {
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
        self.api_key.is_some()
    }

    #[instrument(skip_all, fields(job_id = %proc_ctx.job_id))]
    async fn transcribe(
        &self,
        audio: &AudioInput,
        params: &ParamMap,
        proc_ctx: &ProcessingContext,
        cancel: &CancellationToken,
    ) -> Result<TranscriptResult, AdapterError> {
        let started = Instant::now();
        let api_key = self.resolve_api_key(params)?;
        let model = str_param(params, "model").unwrap_or(DEFAULT_MODEL).to_owned();

        let mut fields: Vec<(&'static str, String)> = vec![
            ("model", model.clone()),
            ("response_format", "verbose_json".to_owned()),
        ];
        if let Some(lang) = str_param(params, "language") {
            fields.push(("language", lang.to_owned()));
        }
        if let Some(prompt) = str_param(params, "prompt") {
            fields.push(("prompt", prompt.to_owned()));
        }
        let temperature = f64_param(params, "temperature").unwrap_or(0.0);
        fields.push(("temperature", format!("{temperature:.2}")));

        let resp = cloud::multipart_transcribe(
            &self.client,
            API_URL,
            &api_key,
            audio.effective_path(),
            fields,
            cancel,
        )
        .await?;

        Ok(cloud::into_transcript(resp, &model, "openai", started))
    }
}
