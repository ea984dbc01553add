//! Relevance retrieval from a vector similarity index
//!
//! Retrieval only ever enhances a prompt. [`RetrievalClient::search`] never
//! fails: any embedding or index error is logged and turns into an empty
//! excerpt set.

mod embedding;
mod memory;

#[cfg(feature = "http")]
mod openai;
#[cfg(feature = "http")]
mod pinecone;

pub use embedding::{Embedding, EmbeddingProvider, HashEmbeddingProvider};
pub use memory::InMemoryVectorIndex;

#[cfg(feature = "http")]
pub use openai::{OpenAiEmbeddingConfig, OpenAiEmbeddingProvider};
#[cfg(feature = "http")]
pub use pinecone::{PineconeConfig, PineconeIndex};

use crate::error::ChatResult;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Metadata field holding the source document of an indexed excerpt
pub const SOURCE_DOCUMENT_FIELD: &str = "fileName";

/// A snippet judged relevant to the current conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedExcerpt {
    /// Excerpt text
    pub content: String,

    /// Document the excerpt was taken from
    pub source_document: String,

    /// Similarity score, higher is closer
    pub score: f32,
}

/// Equality filter on one metadata field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexFilter {
    /// Metadata field name
    pub field: String,

    /// Required value
    pub value: String,
}

impl IndexFilter {
    /// Restrict results to excerpts of one source document
    pub fn source_document(document: impl Into<String>) -> Self {
        Self {
            field: SOURCE_DOCUMENT_FIELD.to_string(),
            value: document.into(),
        }
    }
}

/// One raw match returned by a vector index
#[derive(Debug, Clone, PartialEq)]
pub struct IndexMatch {
    /// Vector identifier
    pub id: String,

    /// Similarity score
    pub score: f32,

    /// Stored excerpt text, when the index kept one
    pub content: Option<String>,

    /// Source document recorded for the vector
    pub source_document: Option<String>,
}

/// A vector similarity index
#[async_trait::async_trait]
pub trait VectorIndex: Send + Sync {
    /// Index name used in logs
    fn name(&self) -> &'static str;

    /// Up to `top_k` nearest vectors that satisfy `filter`
    async fn query(
        &self,
        vector: &[f32],
        filter: &IndexFilter,
        top_k: usize,
    ) -> ChatResult<Vec<IndexMatch>>;
}

/// Embeds a query and looks up relevant excerpts
#[derive(Clone)]
pub struct RetrievalClient {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
}

impl RetrievalClient {
    /// Create a retrieval client
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, index: Arc<dyn VectorIndex>) -> Self {
        Self { embedder, index }
    }

    /// Best-effort search: up to `top_k` excerpts of `source_document`,
    /// most similar first. Failures are logged and yield no excerpts.
    pub async fn search(
        &self,
        query_text: &str,
        source_document: &str,
        top_k: usize,
    ) -> Vec<RetrievedExcerpt> {
        if query_text.trim().is_empty() || top_k == 0 {
            return Vec::new();
        }

        match self.try_search(query_text, source_document, top_k).await {
            Ok(excerpts) => {
                debug!(
                    source_document,
                    index = self.index.name(),
                    found = excerpts.len(),
                    "Retrieved relevant excerpts"
                );
                excerpts
            }
            Err(err) => {
                warn!(
                    source_document,
                    index = self.index.name(),
                    error = %err,
                    "Failed to get vector search results"
                );
                Vec::new()
            }
        }
    }

    async fn try_search(
        &self,
        query_text: &str,
        source_document: &str,
        top_k: usize,
    ) -> ChatResult<Vec<RetrievedExcerpt>> {
        let embedding = self.embedder.embed(query_text).await?;
        let filter = IndexFilter::source_document(source_document);
        let matches = self.index.query(&embedding.vector, &filter, top_k).await?;

        let mut excerpts: Vec<RetrievedExcerpt> = matches
            .into_iter()
            .filter_map(|m| {
                let content = m.content?;
                Some(RetrievedExcerpt {
                    content,
                    source_document: m
                        .source_document
                        .unwrap_or_else(|| source_document.to_string()),
                    score: m.score,
                })
            })
            .collect();

        excerpts.sort_by(|a, b| b.score.total_cmp(&a.score));
        excerpts.truncate(top_k);

        Ok(excerpts)
    }
}
