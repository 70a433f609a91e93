//! Runtime error types

use mavlog_core::{MavlogError, UploadError};

/// Errors surfaced by the runtime and its handle
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("Channel closed: {message}")]
    ChannelClosed { message: String },

    #[error("Runtime task failed: {0}")]
    TaskFailed(String),

    #[error("HTTP client setup failed: {0}")]
    HttpClient(#[source] reqwest::Error),

    #[error(transparent)]
    Core(#[from] MavlogError),
}

impl RuntimeError {
    pub fn channel_closed(message: impl Into<String>) -> Self {
        RuntimeError::ChannelClosed {
            message: message.into(),
        }
    }
}

impl From<UploadError> for RuntimeError {
    fn from(e: UploadError) -> Self {
        RuntimeError::Core(MavlogError::Upload(e))
    }
}

pub type RuntimeResult<T> = std::result::Result<T, RuntimeError>;
