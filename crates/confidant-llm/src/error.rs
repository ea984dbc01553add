//! Error types for completion providers

use thiserror::Error;

/// Result alias used across the LLM client
pub type LlmResult<T> = Result<T, LlmError>;

/// Errors raised while requesting or reading a completion
#[derive(Debug, Error)]
pub enum LlmError {
    /// Provider configuration is unusable
    #[error("configuration error: {0}")]
    Config(String),

    /// Transport-level failure
    #[cfg(feature = "replicate")]
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Payload could not be encoded or decoded
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Provider answered with a non-success status
    #[error("provider API error: status={status}, body={body}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Response body, as text
        body: String,
    },

    /// Provider answered successfully but with an unexpected shape
    #[error("provider returned invalid response: {0}")]
    InvalidResponse(String),

    /// The stream failed after it started
    #[error("stream error: {0}")]
    Stream(String),
}

impl LlmError {
    /// Create a stream error
    pub fn stream(message: impl Into<String>) -> Self {
        Self::Stream(message.into())
    }

    /// Whether the failure happened after the first chunk could have been produced
    pub fn is_mid_stream(&self) -> bool {
        matches!(self, Self::Stream(_))
    }
}
