//! Errors surfaced by orchestrator API implementations.

use thiserror::Error;

/// Result type alias for orchestrator API calls.
pub type ApiResult<T> = Result<T, ApiError>;

/// Errors that can occur while talking to the orchestrator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    #[error("transport error: {0}")]
    Transport(String),

    /// The orchestrator answered with an error document.
    #[error("{code}: {message}")]
    Service { code: String, message: String },

    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("credentials error: {0}")]
    Credentials(String),
}

impl ApiError {
    pub fn service(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Service {
            code: code.into(),
            message: message.into(),
        }
    }
}
