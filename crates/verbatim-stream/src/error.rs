use verbatim_audio::AudioError;
use verbatim_store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("audio processing failed: {0}")]
    Audio(#[from] AudioError),

    #[error("quick job not found: {0}")]
    NotFound(String),

    #[error("quick job expired: {0}")]
    Expired(String),
}

impl StreamError {
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Store(_) => "store",
            Self::Io(_) => "io",
            Self::Audio(_) => "audio",
            Self::NotFound(_) => "not_found",
            Self::Expired(_) => "expired",
        }
    }
}
