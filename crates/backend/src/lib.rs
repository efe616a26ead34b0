pub mod http;

use async_trait::async_trait;
use slackrelay_core::types::BackendState;
use thiserror::Error;

pub use http::HttpBackend;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    #[error("API error ({status}): {body}")]
    ApiError { status: u16, body: String },
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Network error: {0}")]
    NetworkError(String),
    #[error("Invalid response: {0}")]
    DecodeError(String),
}

/// The task-processing service the bridge forwards requests to.
#[async_trait]
pub trait BackendApi: Send + Sync {
    /// Enqueue `text` as a new user message.
    async fn submit(&self, text: &str) -> Result<(), BackendError>;

    /// Current conversation history and queue status.
    async fn query_state(&self) -> Result<BackendState, BackendError>;
}
