//! Configuration for the chat core

use std::time::Duration;

/// Tunables for one chat turn
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Model identifier folded into every conversation key
    pub model_id: String,

    /// Number of most recent history lines used as dialogue context
    pub history_window: usize,

    /// Number of relevant excerpts requested from the vector index
    pub top_k: usize,

    /// Separator between lines of a persona's seed dialogue
    pub seed_delimiter: String,

    /// Generation length passed to the completion endpoint
    pub max_length: u32,

    /// Deadline for the whole completion, from request to last chunk
    pub completion_timeout: Duration,

    /// Chunks buffered between the model stream and the caller
    pub stream_buffer: usize,
}

impl ChatConfig {
    /// Create a configuration for the given model
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            ..Self::default()
        }
    }

    /// Set the recent-history window
    pub fn with_history_window(mut self, window: usize) -> Self {
        self.history_window = window;
        self
    }

    /// Set the number of retrieved excerpts
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Set the seed delimiter
    pub fn with_seed_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.seed_delimiter = delimiter.into();
        self
    }

    /// Set the generation length
    pub fn with_max_length(mut self, max_length: u32) -> Self {
        self.max_length = max_length;
        self
    }

    /// Set the completion deadline
    pub fn with_completion_timeout(mut self, timeout: Duration) -> Self {
        self.completion_timeout = timeout;
        self
    }

    /// Set the chunk buffer size
    pub fn with_stream_buffer(mut self, buffer: usize) -> Self {
        self.stream_buffer = buffer.max(1);
        self
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            model_id: "llama2-13b".to_string(),
            history_window: 30,
            top_k: 3,
            seed_delimiter: "\n\n".to_string(),
            max_length: 2040,
            completion_timeout: Duration::from_secs(120),
            stream_buffer: 32,
        }
    }
}

/// Admission quota
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Requests admitted per window
    pub quota: u64,

    /// Window length
    pub window: Duration,
}

impl RateLimitConfig {
    /// Create a quota of `quota` requests per `window`
    pub fn new(quota: u64, window: Duration) -> Self {
        Self { quota, window }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            quota: 10,
            window: Duration::from_secs(10),
        }
    }
}
