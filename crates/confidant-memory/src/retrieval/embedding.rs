//! Vector embeddings for relevance retrieval

use crate::error::{ChatError, ChatResult};
use serde::{Deserialize, Serialize};

/// A vector embedding (dense float vector)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    /// The vector dimensions
    pub vector: Vec<f32>,

    /// Model used to generate the embedding
    pub model: String,
}

impl Embedding {
    /// Create a new embedding
    pub fn new(vector: Vec<f32>, model: impl Into<String>) -> Self {
        Self {
            vector,
            model: model.into(),
        }
    }

    /// Dimensionality of the embedding
    pub fn dimensions(&self) -> usize {
        self.vector.len()
    }

    /// Calculate cosine similarity with another vector
    pub fn cosine_similarity(&self, other: &[f32]) -> ChatResult<f32> {
        if self.vector.len() != other.len() {
            return Err(ChatError::retrieval(format!(
                "embedding dimensions must match: {} vs {}",
                self.vector.len(),
                other.len()
            )));
        }

        let dot_product: f32 = self
            .vector
            .iter()
            .zip(other.iter())
            .map(|(a, b)| a * b)
            .sum();

        let norm_a: f32 = self.vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = other.iter().map(|x| x * x).sum::<f32>().sqrt();

        if norm_a == 0.0 || norm_b == 0.0 {
            return Ok(0.0);
        }

        Ok(dot_product / (norm_a * norm_b))
    }
}

/// Trait for embedding generation backends
#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding for the given text
    async fn embed(&self, text: &str) -> ChatResult<Embedding>;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// Deterministic hash-based embeddings for development and tests.
///
/// Texts sharing words land close together; there is no semantic model behind it.
pub struct HashEmbeddingProvider {
    dimensions: usize,
}

impl HashEmbeddingProvider {
    /// Create a new hash-based embedding provider
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    fn hash_embed(&self, text: &str) -> Vec<f32> {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut vector = vec![0.0; self.dimensions];

        for word in text.split_whitespace() {
            let mut hasher = DefaultHasher::new();
            word.to_lowercase().hash(&mut hasher);
            let bucket = (hasher.finish() % self.dimensions as u64) as usize;
            vector[bucket] += 1.0;
        }

        vector
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for HashEmbeddingProvider {
    async fn embed(&self, text: &str) -> ChatResult<Embedding> {
        Ok(Embedding::new(self.hash_embed(text), "hash"))
    }

    fn model_name(&self) -> &str {
        "hash-embedding"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedding_cosine_similarity() {
        let emb = Embedding::new(vec![1.0, 0.0, 0.0], "test");

        // Identical vectors
        let sim = emb.cosine_similarity(&[1.0, 0.0, 0.0]).unwrap();
        assert!((sim - 1.0).abs() < 1e-6);

        // Orthogonal vectors
        let sim = emb.cosine_similarity(&[0.0, 1.0, 0.0]).unwrap();
        assert!(sim.abs() < 1e-6);

        assert!(emb.cosine_similarity(&[1.0, 0.0]).is_err());
        assert_eq!(emb.cosine_similarity(&[0.0, 0.0, 0.0]).unwrap(), 0.0);
    }

    #[tokio::test]
    async fn test_hash_embedding_provider() {
        let provider = HashEmbeddingProvider::new(128);

        let emb1 = provider.embed("Hello world").await.unwrap();
        let emb2 = provider.embed("hello WORLD").await.unwrap();
        let emb3 = provider.embed("Different text entirely").await.unwrap();

        assert_eq!(emb1.dimensions(), 128);

        // Same words produce the same embedding
        let sim = emb1.cosine_similarity(&emb2.vector).unwrap();
        assert!((sim - 1.0).abs() < 1e-6);

        let sim = emb1.cosine_similarity(&emb3.vector).unwrap();
        assert!(sim < 1.0);
    }
}
