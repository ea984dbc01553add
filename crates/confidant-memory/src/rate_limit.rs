//! Per-identifier admission control
//!
//! A request is admitted when fewer than `quota` requests with the same
//! identifier were admitted in the current fixed window. Check and increment
//! happen as one atomic step in every backend.

use crate::config::RateLimitConfig;
use crate::error::ChatResult;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

/// Outcome of one admission check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitDecision {
    /// Whether the request may proceed
    pub allowed: bool,

    /// Quota per window
    pub limit: u64,

    /// Admissions left in the current window
    pub remaining: u64,

    /// Time until the current window ends
    #[serde(skip)]
    pub reset_after: Duration,
}

/// Admission control keyed by caller identifier
#[async_trait::async_trait]
pub trait RateLimiter: Send + Sync {
    /// Atomically check and count one request for `identifier`
    async fn admit(&self, identifier: &str) -> ChatResult<RateLimitDecision>;
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u64,
}

/// Admissions between two sweeps of expired windows
const SWEEP_EVERY: u64 = 1024;

#[derive(Debug, Default)]
struct WindowTable {
    windows: HashMap<String, Window>,
    admissions: u64,
}

/// In-process fixed-window limiter
#[derive(Debug)]
pub struct FixedWindowLimiter {
    config: RateLimitConfig,
    table: Mutex<WindowTable>,
}

impl FixedWindowLimiter {
    /// Create a limiter with the given quota
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            table: Mutex::new(WindowTable::default()),
        }
    }

    fn decide(&self, identifier: &str, now: Instant) -> RateLimitDecision {
        let mut table = self.table.lock();
        let period = self.config.window;

        table.admissions += 1;
        if table.admissions % SWEEP_EVERY == 0 {
            table
                .windows
                .retain(|_, w| now.duration_since(w.started) < period);
        }

        let window = table
            .windows
            .entry(identifier.to_string())
            .or_insert(Window { started: now, count: 0 });
        if now.duration_since(window.started) >= period {
            *window = Window { started: now, count: 0 };
        }

        let reset_after = self
            .config
            .window
            .saturating_sub(now.duration_since(window.started));

        if window.count >= self.config.quota {
            return RateLimitDecision {
                allowed: false,
                limit: self.config.quota,
                remaining: 0,
                reset_after,
            };
        }

        window.count += 1;
        RateLimitDecision {
            allowed: true,
            limit: self.config.quota,
            remaining: self.config.quota - window.count,
            reset_after,
        }
    }
}

impl FixedWindowLimiter {
    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.table.lock().windows.len()
    }
}

impl Default for FixedWindowLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}

#[async_trait::async_trait]
impl RateLimiter for FixedWindowLimiter {
    async fn admit(&self, identifier: &str) -> ChatResult<RateLimitDecision> {
        Ok(self.decide(identifier, Instant::now()))
    }
}

#[cfg(feature = "redis")]
pub use self::redis_limiter::RedisRateLimiter;

#[cfg(feature = "redis")]
mod redis_limiter {
    use super::{RateLimitDecision, RateLimiter};
    use crate::config::RateLimitConfig;
    use crate::error::{ChatError, ChatResult};
    use redis::aio::ConnectionManager;
    use redis::Script;
    use std::time::Duration;

    const ADMIT_SCRIPT: &str = r#"
local count = redis.call('INCR', KEYS[1])
if count == 1 then
  redis.call('PEXPIRE', KEYS[1], ARGV[1])
end
return { count, redis.call('PTTL', KEYS[1]) }
"#;

    /// Fixed-window limiter shared by every process talking to one Redis
    #[derive(Clone)]
    pub struct RedisRateLimiter {
        connection: ConnectionManager,
        config: RateLimitConfig,
        prefix: String,
        script: Script,
    }

    impl RedisRateLimiter {
        /// Create a limiter over an existing connection
        pub fn new(connection: ConnectionManager, config: RateLimitConfig) -> Self {
            Self {
                connection,
                config,
                prefix: "ratelimit".to_string(),
                script: Script::new(ADMIT_SCRIPT),
            }
        }

        /// Override the key prefix
        pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
            self.prefix = prefix.into();
            self
        }
    }

    #[async_trait::async_trait]
    impl RateLimiter for RedisRateLimiter {
        async fn admit(&self, identifier: &str) -> ChatResult<RateLimitDecision> {
            let key = format!("{}:{}", self.prefix, identifier);
            let window_ms = u64::try_from(self.config.window.as_millis()).unwrap_or(u64::MAX);

            let mut con = self.connection.clone();
            let (count, ttl_ms): (u64, i64) = self
                .script
                .key(&key)
                .arg(window_ms)
                .invoke_async(&mut con)
                .await
                .map_err(|e| ChatError::store("rate_limit", e))?;

            let reset_after = Duration::from_millis(u64::try_from(ttl_ms).unwrap_or(0));
            Ok(RateLimitDecision {
                allowed: count <= self.config.quota,
                limit: self.config.quota,
                remaining: self.config.quota.saturating_sub(count),
                reset_after,
            })
        }
    }
}
