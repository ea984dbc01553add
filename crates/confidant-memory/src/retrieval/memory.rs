//! In-process vector index for development and tests

use super::embedding::Embedding;
use super::{IndexFilter, IndexMatch, VectorIndex, SOURCE_DOCUMENT_FIELD};
use crate::error::ChatResult;
use parking_lot::RwLock;

#[derive(Debug, Clone)]
struct IndexedExcerpt {
    id: String,
    embedding: Embedding,
    content: String,
    source_document: String,
}

/// Brute-force cosine-similarity index held in memory
#[derive(Debug, Default)]
pub struct InMemoryVectorIndex {
    excerpts: RwLock<Vec<IndexedExcerpt>>,
}

impl InMemoryVectorIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an excerpt
    pub fn upsert(
        &self,
        id: impl Into<String>,
        embedding: Embedding,
        content: impl Into<String>,
        source_document: impl Into<String>,
    ) {
        let excerpt = IndexedExcerpt {
            id: id.into(),
            embedding,
            content: content.into(),
            source_document: source_document.into(),
        };

        let mut excerpts = self.excerpts.write();
        match excerpts.iter_mut().find(|e| e.id == excerpt.id) {
            Some(existing) => *existing = excerpt,
            None => excerpts.push(excerpt),
        }
    }

    /// Number of indexed excerpts
    pub fn len(&self) -> usize {
        self.excerpts.read().len()
    }

    /// Whether the index is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait::async_trait]
impl VectorIndex for InMemoryVectorIndex {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn query(
        &self,
        vector: &[f32],
        filter: &IndexFilter,
        top_k: usize,
    ) -> ChatResult<Vec<IndexMatch>> {
        let excerpts = self.excerpts.read();

        let mut matches: Vec<IndexMatch> = excerpts
            .iter()
            .filter(|e| filter.field != SOURCE_DOCUMENT_FIELD || e.source_document == filter.value)
            .filter_map(|e| {
                // dimension mismatches cannot be compared
                let score = e.embedding.cosine_similarity(vector).ok()?;
                Some(IndexMatch {
                    id: e.id.clone(),
                    score,
                    content: Some(e.content.clone()),
                    source_document: Some(e.source_document.clone()),
                })
            })
            .collect();

        matches.sort_by(|a, b| b.score.total_cmp(&a.score));
        matches.truncate(top_k);

        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emb(v: &[f32]) -> Embedding {
        Embedding::new(v.to_vec(), "test")
    }

    #[tokio::test]
    async fn test_query_filters_by_source_and_ranks() {
        let index = InMemoryVectorIndex::new();
        index.upsert("1", emb(&[1.0, 0.0]), "close", "a.txt");
        index.upsert("2", emb(&[0.7, 0.7]), "middle", "a.txt");
        index.upsert("3", emb(&[1.0, 0.0]), "other persona", "b.txt");
        index.upsert("4", emb(&[0.0, 1.0]), "far", "a.txt");

        let matches = index
            .query(&[1.0, 0.0], &IndexFilter::source_document("a.txt"), 2)
            .await
            .unwrap();

        let ids: Vec<&str> = matches.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2"]);
    }

    #[tokio::test]
    async fn test_upsert_replaces_by_id() {
        let index = InMemoryVectorIndex::new();
        index.upsert("1", emb(&[1.0]), "old", "a.txt");
        index.upsert("1", emb(&[1.0]), "new", "a.txt");

        assert_eq!(index.len(), 1);
        let matches = index
            .query(&[1.0], &IndexFilter::source_document("a.txt"), 5)
            .await
            .unwrap();
        assert_eq!(matches[0].content.as_deref(), Some("new"));
    }
}
