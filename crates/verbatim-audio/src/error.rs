#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{command} failed (status {status}): {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("cancelled")]
    Cancelled,
}

impl AudioError {
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Io(_) => "io",
            Self::CommandFailed { .. } => "command_failed",
            Self::Cancelled => "cancelled",
        }
    }
}
