//! Server configuration
//!
//! Loaded from environment variables prefixed `CONFIDANT__`, with `__`
//! separating nested keys (`CONFIDANT__REPLICATE__API_TOKEN`). A `.env` file
//! in the working directory is read first when present.

use confidant_memory::{ChatConfig, RateLimitConfig};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Completion endpoint settings
#[derive(Debug, Clone, Deserialize)]
pub struct ReplicateSettings {
    /// API token, required
    #[serde(default)]
    pub api_token: Option<String>,

    /// Model in `owner/name` form
    pub model: String,

    /// Override of the API base URL
    #[serde(default)]
    pub base_url: Option<String>,
}

/// Vector index settings
#[derive(Debug, Clone, Deserialize)]
pub struct PineconeSettings {
    pub api_key: String,
    pub index_host: String,
    #[serde(default)]
    pub namespace: Option<String>,
}

/// Embedding endpoint settings
#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiSettings {
    pub api_key: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

/// Admission quota
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RateLimitSettings {
    pub quota: u64,
    pub window_secs: u64,
}

/// Everything the server needs to start
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Listen address
    pub bind: String,

    /// Emit logs as JSON lines
    pub log_json: bool,

    /// Model identifier folded into conversation keys
    pub model_id: String,

    /// Recent history lines fed to the model
    pub history_window: usize,

    /// Retrieved excerpts per turn
    pub top_k: usize,

    /// Generation length
    pub max_length: u32,

    /// Deadline for one completion
    pub completion_timeout_secs: u64,

    pub rate_limit: RateLimitSettings,

    pub replicate: ReplicateSettings,

    /// Redis URL; history and rate limits stay in process memory without it
    #[serde(default)]
    pub redis_url: Option<String>,

    /// Postgres URL; records stay in process memory without it
    #[serde(default)]
    pub database_url: Option<String>,

    /// JSON file of personas loaded into the in-memory record store
    #[serde(default)]
    pub personas_path: Option<PathBuf>,

    #[serde(default)]
    pub pinecone: Option<PineconeSettings>,

    #[serde(default)]
    pub openai: Option<OpenAiSettings>,
}

impl ServerConfig {
    /// Load from the environment on top of the defaults
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenv::dotenv().ok();
        Self::from_source(
            config::Environment::with_prefix("CONFIDANT")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
    }

    /// Load from an arbitrary source on top of the defaults
    pub fn from_source<S>(source: S) -> Result<Self, config::ConfigError>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let defaults = ChatConfig::default();
        let limits = RateLimitConfig::default();

        config::Config::builder()
            .set_default("bind", "0.0.0.0:3000")?
            .set_default("log_json", false)?
            .set_default("model_id", defaults.model_id)?
            .set_default("history_window", defaults.history_window as u64)?
            .set_default("top_k", defaults.top_k as u64)?
            .set_default("max_length", u64::from(defaults.max_length))?
            .set_default(
                "completion_timeout_secs",
                defaults.completion_timeout.as_secs(),
            )?
            .set_default("rate_limit.quota", limits.quota)?
            .set_default("rate_limit.window_secs", limits.window.as_secs())?
            .set_default("replicate.model", "meta/llama-2-70b-chat")?
            .add_source(source)
            .build()?
            .try_deserialize()
    }

    /// Chat core settings
    pub fn chat_config(&self) -> ChatConfig {
        ChatConfig::new(&self.model_id)
            .with_history_window(self.history_window)
            .with_top_k(self.top_k)
            .with_max_length(self.max_length)
            .with_completion_timeout(Duration::from_secs(self.completion_timeout_secs))
    }

    /// Rate limiter settings
    pub fn rate_limit_config(&self) -> RateLimitConfig {
        RateLimitConfig::new(
            self.rate_limit.quota,
            Duration::from_secs(self.rate_limit.window_secs),
        )
    }
}
