//! Error taxonomy for the chat core
//!
//! Rejections (`Unauthenticated`, `RateLimited`, `NotFound`, `InvalidRequest`)
//! are raised before any side effect. Everything else is logged in full and
//! reported to callers only as a generic internal error.

use confidant_llm::LlmError;
use thiserror::Error;

/// Result alias for the chat core
pub type ChatResult<T> = Result<T, ChatError>;

/// Boxed source error from a storage backend
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised by the chat core
#[derive(Debug, Error)]
pub enum ChatError {
    /// No usable caller identity
    #[error("caller is not authenticated")]
    Unauthenticated,

    /// Admission denied by the rate limiter
    #[error("rate limit exceeded")]
    RateLimited,

    /// Unknown persona / conversation
    #[error("persona not found: {persona_id}")]
    NotFound {
        /// Requested persona identifier
        persona_id: String,
    },

    /// A key-value or relational store could not be reached
    #[error("store unavailable during {operation}: {source}")]
    StoreUnavailable {
        /// Operation being attempted
        operation: String,
        /// Backend error
        #[source]
        source: BoxError,
    },

    /// Retrieval failed; absorbed by [`crate::RetrievalClient::search`]
    #[error("retrieval failed: {message}")]
    RetrievalFailed {
        /// Failure description
        message: String,
    },

    /// The completion endpoint errored or timed out
    #[error("upstream model failure: {message}")]
    UpstreamModelFailure {
        /// Failure description
        message: String,
        /// Provider error, when there is one
        #[source]
        source: Option<LlmError>,
    },

    /// Malformed input
    #[error("invalid request: {message}")]
    InvalidRequest {
        /// What is wrong with the input
        message: String,
    },

    /// Anything unexpected
    #[error("internal error: {message}")]
    Internal {
        /// Failure description
        message: String,
    },
}

impl ChatError {
    /// Create a store error
    pub fn store(operation: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::StoreUnavailable {
            operation: operation.into(),
            source: source.into(),
        }
    }

    /// Create a retrieval error
    pub fn retrieval(message: impl std::fmt::Display) -> Self {
        Self::RetrievalFailed {
            message: message.to_string(),
        }
    }

    /// Create a validation error
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Completion endpoint did not answer before the deadline
    pub fn upstream_timeout(timeout: std::time::Duration) -> Self {
        Self::UpstreamModelFailure {
            message: format!("no response within {:?}", timeout),
            source: None,
        }
    }

    /// Whether this error is a side-effect-free rejection of the request
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::Unauthenticated
                | Self::RateLimited
                | Self::NotFound { .. }
                | Self::InvalidRequest { .. }
        )
    }
}

impl From<LlmError> for ChatError {
    fn from(err: LlmError) -> Self {
        Self::UpstreamModelFailure {
            message: err.to_string(),
            source: Some(err),
        }
    }
}
