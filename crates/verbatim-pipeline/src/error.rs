use verbatim_adapters::AdapterError;
use verbatim_audio::AudioError;
use verbatim_store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("failed to load job: {0}")]
    Store(#[from] StoreError),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("transcription failed: {0}")]
    Transcription(#[source] AdapterError),

    #[error("audio processing failed: {0}")]
    Audio(#[from] AudioError),

    #[error("multi-track processing failed: {0}")]
    MultiTrack(String),

    #[error("failed to serialize transcript: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("cancelled")]
    Cancelled,
}

impl PipelineError {
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Store(_) => "store",
            Self::InvalidInput(_) => "invalid_input",
            Self::Transcription(_) => "transcription",
            Self::Audio(_) => "audio",
            Self::MultiTrack(_) => "multi_track",
            Self::Serialization(_) => "serialization",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether the failure was driven by cancellation rather than a fault.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled)
            || matches!(self, Self::Transcription(AdapterError::Cancelled))
            || matches!(self, Self::Audio(AudioError::Cancelled))
    }
}
