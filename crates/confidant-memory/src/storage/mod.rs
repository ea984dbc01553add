//! Ordered-set storage backends for conversation history
//!
//! Every backend stores [`HistoryEntry`] values under a string key, ordered by
//! their score. Appends are assigned their score by the backend itself so that
//! concurrent writers can never tie or reorder a conversation.

mod memory;

#[cfg(feature = "redis")]
mod redis;

pub use memory::InMemoryScoredSetStore;

#[cfg(feature = "redis")]
pub use self::redis::RedisScoredSetStore;

use crate::error::ChatResult;
use crate::history::HistoryEntry;

/// Key-value store with sorted-set semantics (score = order, member = line)
#[async_trait::async_trait]
pub trait ScoredSetStore: Send + Sync {
    /// Backend name used in logs
    fn backend_name(&self) -> &'static str;

    /// Atomically append `text` with order `max(floor, highest + 1)`.
    ///
    /// Returns the order assigned to the new entry.
    async fn append(&self, key: &str, text: &str, floor: i64) -> ChatResult<i64>;

    /// Write all `entries` only if `key` holds nothing yet.
    ///
    /// Returns whether anything was written.
    async fn insert_if_absent(&self, key: &str, entries: &[HistoryEntry]) -> ChatResult<bool>;

    /// Entries with `min <= order <= max`, oldest first
    async fn range_by_score(&self, key: &str, min: i64, max: i64) -> ChatResult<Vec<HistoryEntry>>;

    /// The last `limit` entries, oldest first
    async fn tail(&self, key: &str, limit: usize) -> ChatResult<Vec<HistoryEntry>>;

    /// Whether `key` holds any entry
    async fn exists(&self, key: &str) -> ChatResult<bool>;
}
