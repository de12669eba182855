use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use verbatim_core::audio::AudioInput;
use verbatim_core::transcript::{DiarizationResult, TranscriptResult};

/// Feature flags advertised in [`ModelCapabilities::features`].
pub mod feature {
    pub const TIMESTAMPS: &str = "timestamps";
    pub const WORD_LEVEL: &str = "word_level";
    pub const DIARIZATION: &str = "diarization";
    pub const TRANSLATION: &str = "translation";
    pub const LANGUAGE_DETECTION: &str = "language_detection";
    pub const VAD: &str = "vad";
}

/// Descriptive record every adapter exposes for discovery and routing.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModelCapabilities {
    pub model_id: String,
    pub model_family: String,
    pub display_name: String,
    pub description: String,
    pub supported_languages: Vec<String>,
    pub supported_formats: Vec<String>,
    pub requires_gpu: bool,
    /// Zero for cloud backends.
    pub memory_requirement_mb: u64,
    /// Whether the backend expects mono 16 kHz input.
    pub requires_mono_16k: bool,
    pub features: BTreeMap<String, bool>,
    pub metadata: BTreeMap<String, String>,
}

impl ModelCapabilities {
    pub fn has_feature(&self, name: &str) -> bool {
        self.features.get(name).copied().unwrap_or(false)
    }

    /// Whether diarization is embedded in the transcription pass.
    pub fn native_diarization(&self) -> bool {
        self.has_feature(feature::DIARIZATION)
    }

    pub fn supports_format(&self, format: &str) -> bool {
        self.supported_formats.iter().any(|f| f == format)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    String,
    Integer,
    Float,
    Boolean,
}

/// One entry of an adapter's parameter schema.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    pub kind: ParamKind,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub options: Vec<String>,
    pub group: String,
    pub description: String,
}

impl ParameterSpec {
    pub fn new(name: &str, kind: ParamKind, group: &str, description: &str) -> Self {
        Self {
            name: name.to_owned(),
            kind,
            required: false,
            default: None,
            min: None,
            max: None,
            options: Vec::new(),
            group: group.to_owned(),
            description: description.to_owned(),
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn default_value(mut self, v: Value) -> Self {
        self.default = Some(v);
        self
    }

    pub fn range(mut self, min: f64, max: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    pub fn options(mut self, options: &[&str]) -> Self {
        self.options = options.iter().map(|s| (*s).to_owned()).collect();
        self
    }
}

/// Per-job context threaded into every adapter call.
#[derive(Clone, Debug)]
pub struct ProcessingContext {
    pub job_id: String,
    pub output_dir: PathBuf,
    pub temp_dir: PathBuf,
    pub metadata: BTreeMap<String, String>,
}

/// Opaque backend-specific parameter map produced by the parameter adapter.
pub type ParamMap = serde_json::Map<String, Value>;

pub fn str_param<'a>(params: &'a ParamMap, key: &str) -> Option<&'a str> {
    params.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

pub fn f64_param(params: &ParamMap, key: &str) -> Option<f64> {
    params.get(key).and_then(Value::as_f64)
}

pub fn u64_param(params: &ParamMap, key: &str) -> Option<u64> {
    params.get(key).and_then(Value::as_u64)
}

#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("model not registered: {0}")]
    NotRegistered(String),

    #[error("model not ready: {0}")]
    NotReady(String),

    #[error("invalid audio input: {0}")]
    InvalidInput(String),

    #[error("missing credential for {0}")]
    MissingCredential(String),

    #[error("backend error (status {status}): {body}")]
    Backend { status: u16, body: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed backend response: {0}")]
    MalformedResponse(String),

    #[error("parameter validation failed: {0}")]
    InvalidParameters(String),

    #[error("cancelled")]
    Cancelled,
}

impl AdapterError {
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::NotRegistered(_) => "not_registered",
            Self::NotReady(_) => "not_ready",
            Self::InvalidInput(_) => "invalid_input",
            Self::MissingCredential(_) => "missing_credential",
            Self::Backend { .. } => "backend",
            Self::Network(_) => "network",
            Self::Io(_) => "io",
            Self::MalformedResponse(_) => "malformed_response",
            Self::InvalidParameters(_) => "invalid_parameters",
            Self::Cancelled => "cancelled",
        }
    }
}

/// A speech-to-text backend.
#[async_trait]
pub trait TranscriptionAdapter: Send + Sync {
    fn capabilities(&self) -> &ModelCapabilities;

    fn parameter_schema(&self) -> &[ParameterSpec];

    /// Idempotent environment preparation (model downloads, client setup).
    /// Cloud adapters return immediately.
    async fn prepare_environment(&self) -> Result<(), AdapterError>;

    /// Pure readiness probe; must not mutate state.
    async fn is_ready(&self) -> bool;

    async fn transcribe(
        &self,
        audio: &AudioInput,
        params: &ParamMap,
        proc_ctx: &ProcessingContext,
        cancel: &CancellationToken,
    ) -> Result<TranscriptResult, AdapterError>;
}

/// A speaker-diarization backend.
#[async_trait]
pub trait DiarizationAdapter: Send + Sync {
    fn capabilities(&self) -> &ModelCapabilities;

    fn parameter_schema(&self) -> &[ParameterSpec];

    async fn prepare_environment(&self) -> Result<(), AdapterError>;

    async fn is_ready(&self) -> bool;

    async fn diarize(
        &self,
        audio: &AudioInput,
        params: &ParamMap,
        proc_ctx: &ProcessingContext,
        cancel: &CancellationToken,
    ) -> Result<DiarizationResult, AdapterError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps_with(features: &[(&str, bool)]) -> ModelCapabilities {
        ModelCapabilities {
            model_id: "m".into(),
            model_family: "f".into(),
            display_name: "M".into(),
            description: String::new(),
            supported_languages: vec!["en".into()],
            supported_formats: vec!["wav".into(), "mp3".into()],
            requires_gpu: false,
            memory_requirement_mb: 0,
            requires_mono_16k: false,
            features: features.iter().map(|(k, v)| ((*k).to_owned(), *v)).collect(),
            metadata: BTreeMap::new(),
        }
    }

    #[test]
    fn feature_lookup_defaults_false() {
        let caps = caps_with(&[(feature::TIMESTAMPS, true)]);
        assert!(caps.has_feature(feature::TIMESTAMPS));
        assert!(!caps.has_feature(feature::DIARIZATION));
        assert!(!caps.native_diarization());
    }

    #[test]
    fn native_diarization_from_feature_flag() {
        let caps = caps_with(&[(feature::DIARIZATION, true)]);
        assert!(caps.native_diarization());
    }

    #[test]
    fn format_support() {
        let caps = caps_with(&[]);
        assert!(caps.supports_format("wav"));
        assert!(!caps.supports_format("flac"));
    }

    #[test]
    fn parameter_spec_builder() {
        let spec = ParameterSpec::new("temperature", ParamKind::Float, "quality", "sampling")
            .default_value(serde_json::json!(0.0))
            .range(0.0, 1.0);
        assert_eq!(spec.name, "temperature");
        assert_eq!(spec.min, Some(0.0));
        assert_eq!(spec.max, Some(1.0));
        assert!(!spec.required);
    }

    #[test]
    fn param_map_accessors() {
        let mut map = ParamMap::new();
        map.insert("model".into(), serde_json::json!("whisper-large-v3"));
        map.insert("temperature".into(), serde_json::json!(0.2));
        map.insert("empty".into(), serde_json::json!(""));

        assert_eq!(str_param(&map, "model"), Some("whisper-large-v3"));
        assert_eq!(str_param(&map, "empty"), None);
        assert_eq!(str_param(&map, "missing"), None);
        assert_eq!(f64_param(&map, "temperature"), Some(0.2));
    }

    #[test]
    fn error_kinds() {
        assert_eq!(AdapterError::Cancelled.error_kind(), "cancelled");
        assert_eq!(
            AdapterError::Backend { status: 500, body: "boom".into() }.error_kind(),
            "backend"
        );
        assert_eq!(AdapterError::NotRegistered("x".into()).error_kind(), "not_registered");
    }
}
