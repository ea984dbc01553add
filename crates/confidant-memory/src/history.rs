//! Conversation history backed by an ordered-set store

use crate::error::ChatResult;
use crate::key::ConversationKey;
use crate::storage::ScoredSetStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// One line of a conversation log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// The line as it is fed back into prompts
    pub text: String,

    /// Sort position; later lines have larger values
    pub order: i64,
}

impl HistoryEntry {
    /// Create a new entry
    pub fn new(text: impl Into<String>, order: i64) -> Self {
        Self {
            text: text.into(),
            order,
        }
    }
}

/// Append-only, time-ordered conversation log per [`ConversationKey`]
#[derive(Clone)]
pub struct HistoryStore {
    /// Storage backend
    store: Arc<dyn ScoredSetStore>,
}

impl HistoryStore {
    /// Create a history store over the given backend
    pub fn new(store: Arc<dyn ScoredSetStore>) -> Self {
        Self { store }
    }

    /// Append a line and return its order.
    ///
    /// Orders start from the current wall-clock millisecond and are bumped by
    /// the backend when needed, so they strictly increase in write order.
    pub async fn append(&self, key: &ConversationKey, text: &str) -> ChatResult<i64> {
        let now = chrono::Utc::now().timestamp_millis();
        let order = self.store.append(&key.storage_key(), text, now).await?;

        debug!(
            conversation = %key,
            order,
            backend = self.store.backend_name(),
            "Appended history entry"
        );

        Ok(order)
    }

    /// Whether the conversation has any entry
    pub async fn exists(&self, key: &ConversationKey) -> ChatResult<bool> {
        self.store.exists(&key.storage_key()).await
    }

    /// Seed the conversation with a persona's canned dialogue.
    ///
    /// `seed_text` is split on `delimiter`; line *i* is written with order *i*,
    /// which sorts before any timestamped entry. Blank lines are skipped. This
    /// is a no-op when the conversation already has entries. Returns whether
    /// anything was written.
    pub async fn seed_if_empty(
        &self,
        key: &ConversationKey,
        seed_text: &str,
        delimiter: &str,
    ) -> ChatResult<bool> {
        let lines = split_seed(seed_text, delimiter);
        if lines.is_empty() {
            return Ok(false);
        }

        let storage_key = key.storage_key();
        if self.store.exists(&storage_key).await? {
            debug!(conversation = %key, "Conversation already has history, skipping seed");
            return Ok(false);
        }

        let seeded = self.store.insert_if_absent(&storage_key, &lines).await?;
        if seeded {
            debug!(conversation = %key, lines = lines.len(), "Seeded conversation history");
        }

        Ok(seeded)
    }

    /// The last `limit` entries, oldest first
    pub async fn read_recent_entries(
        &self,
        key: &ConversationKey,
        limit: usize,
    ) -> ChatResult<Vec<HistoryEntry>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        self.store.tail(&key.storage_key(), limit).await
    }

    /// The last `limit` lines joined into one prompt-ready block
    pub async fn read_recent(&self, key: &ConversationKey, limit: usize) -> ChatResult<String> {
        let entries = self.read_recent_entries(key, limit).await?;
        Ok(entries
            .into_iter()
            .map(|entry| entry.text)
            .collect::<Vec<_>>()
            .join("\n"))
    }

    /// Entries whose order lies within `min..=max`, oldest first
    pub async fn read_range(
        &self,
        key: &ConversationKey,
        min: i64,
        max: i64,
    ) -> ChatResult<Vec<HistoryEntry>> {
        self.store.range_by_score(&key.storage_key(), min, max).await
    }
}

fn split_seed(seed_text: &str, delimiter: &str) -> Vec<HistoryEntry> {
    let pieces: Vec<&str> = if delimiter.is_empty() {
        vec![seed_text]
    } else {
        seed_text.split(delimiter).collect()
    };

    pieces
        .into_iter()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(position, line)| HistoryEntry::new(line, position as i64))
        .collect()
}
