//! In-process ordered-set store

use super::ScoredSetStore;
use crate::error::ChatResult;
use crate::history::HistoryEntry;
use parking_lot::Mutex;
use std::collections::HashMap;

/// Ordered-set store kept in process memory.
///
/// Each key maps to a vector kept sorted by order; all mutation happens under
/// one lock, which makes append and seed atomic.
#[derive(Debug, Default)]
pub struct InMemoryScoredSetStore {
    sets: Mutex<HashMap<String, Vec<HistoryEntry>>>,
}

impl InMemoryScoredSetStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys holding at least one entry
    pub fn key_count(&self) -> usize {
        self.sets.lock().len()
    }
}

#[async_trait::async_trait]
impl ScoredSetStore for InMemoryScoredSetStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn append(&self, key: &str, text: &str, floor: i64) -> ChatResult<i64> {
        let mut sets = self.sets.lock();
        let entries = sets.entry(key.to_string()).or_default();

        let order = match entries.last() {
            Some(last) if last.order >= floor => last.order + 1,
            _ => floor,
        };
        entries.push(HistoryEntry::new(text, order));

        Ok(order)
    }

    async fn insert_if_absent(&self, key: &str, entries: &[HistoryEntry]) -> ChatResult<bool> {
        if entries.is_empty() {
            return Ok(false);
        }

        let mut sets = self.sets.lock();
        if sets.get(key).is_some_and(|existing| !existing.is_empty()) {
            return Ok(false);
        }

        let mut seeded = entries.to_vec();
        seeded.sort_by_key(|entry| entry.order);
        sets.insert(key.to_string(), seeded);

        Ok(true)
    }

    async fn range_by_score(&self, key: &str, min: i64, max: i64) -> ChatResult<Vec<HistoryEntry>> {
        let sets = self.sets.lock();
        let entries = sets
            .get(key)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|entry| entry.order >= min && entry.order <= max)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        Ok(entries)
    }

    async fn tail(&self, key: &str, limit: usize) -> ChatResult<Vec<HistoryEntry>> {
        let sets = self.sets.lock();
        let entries = sets
            .get(key)
            .map(|entries| {
                let start = entries.len().saturating_sub(limit);
                entries[start..].to_vec()
            })
            .unwrap_or_default();

        Ok(entries)
    }

    async fn exists(&self, key: &str) -> ChatResult<bool> {
        Ok(self
            .sets
            .lock()
            .get(key)
            .is_some_and(|entries| !entries.is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_append_breaks_ties_past_floor() {
        let store = InMemoryScoredSetStore::new();

        assert_eq!(store.append("k", "a", 1_000).await.unwrap(), 1_000);
        // same millisecond
        assert_eq!(store.append("k", "b", 1_000).await.unwrap(), 1_001);
        // clock stepped backwards
        assert_eq!(store.append("k", "c", 900).await.unwrap(), 1_002);
        assert_eq!(store.append("k", "d", 5_000).await.unwrap(), 5_000);
    }

    #[tokio::test]
    async fn test_insert_if_absent_only_once() {
        let store = InMemoryScoredSetStore::new();
        let seed = vec![HistoryEntry::new("A", 0), HistoryEntry::new("B", 1)];

        assert!(store.insert_if_absent("k", &seed).await.unwrap());
        assert!(!store.insert_if_absent("k", &seed).await.unwrap());
        assert_eq!(store.tail("k", 10).await.unwrap(), seed);
    }

    #[tokio::test]
    async fn test_range_by_score_is_inclusive() {
        let store = InMemoryScoredSetStore::new();
        for (i, text) in ["a", "b", "c", "d"].iter().enumerate() {
            store.append("k", text, i as i64 * 10).await.unwrap();
        }

        let texts: Vec<String> = store
            .range_by_score("k", 10, 20)
            .await
            .unwrap()
            .into_iter()
            .map(|entry| entry.text)
            .collect();
        assert_eq!(texts, vec!["b", "c"]);
    }

    #[tokio::test]
    async fn test_unknown_key_is_empty() {
        let store = InMemoryScoredSetStore::new();

        assert!(!store.exists("missing").await.unwrap());
        assert!(store.tail("missing", 5).await.unwrap().is_empty());
        assert_eq!(store.key_count(), 0);
    }
}
