use thiserror::Error;

/// Errors surfaced by the job pipeline.
///
/// `Validation` is the only variant returned synchronously from submission;
/// every other variant ends up recorded on the failed job.
#[derive(Debug, Error)]
pub enum TtsError {
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Model load failed: {0}")]
    ModelLoad(String),

    #[error("Synthesis failed: {0}")]
    Synthesis(String),

    #[error("Audio processing failed: {0}")]
    Filter(String),

    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("Invalid job transition: {0}")]
    InvalidTransition(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TtsError>;

impl From<serde_json::Error> for TtsError {
    fn from(e: serde_json::Error) -> Self {
        TtsError::Storage(format!("metadata encoding: {e}"))
    }
}

impl From<hound::Error> for TtsError {
    fn from(e: hound::Error) -> Self {
        TtsError::Storage(format!("wav write err: {e}"))
    }
}
