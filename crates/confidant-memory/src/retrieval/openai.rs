//! OpenAI-compatible embeddings endpoint

use super::embedding::{Embedding, EmbeddingProvider};
use crate::error::{ChatError, ChatResult};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for [`OpenAiEmbeddingProvider`]
#[derive(Debug, Clone)]
pub struct OpenAiEmbeddingConfig {
    /// API key
    pub api_key: String,

    /// API base URL, without the `/v1` suffix
    pub base_url: String,

    /// Embedding model
    pub model: String,

    /// Request timeout
    pub timeout: Duration,
}

impl OpenAiEmbeddingConfig {
    /// Create a configuration with the default endpoint and model
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: "https://api.openai.com".to_string(),
            model: "text-embedding-ada-002".to_string(),
            timeout: Duration::from_secs(15),
        }
    }

    /// Override the base URL
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Override the model
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

/// Embeds text through `POST /v1/embeddings`
#[derive(Clone)]
pub struct OpenAiEmbeddingProvider {
    config: OpenAiEmbeddingConfig,
    client: Client,
}

impl OpenAiEmbeddingProvider {
    /// Create a new provider
    pub fn new(config: OpenAiEmbeddingConfig) -> ChatResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ChatError::internal(format!("failed to build http client: {}", e)))?;
        Ok(Self { config, client })
    }

    fn embeddings_url(&self) -> String {
        format!("{}/v1/embeddings", self.config.base_url.trim_end_matches('/'))
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for OpenAiEmbeddingProvider {
    async fn embed(&self, text: &str) -> ChatResult<Embedding> {
        let payload = EmbeddingsRequest {
            model: &self.config.model,
            input: text,
        };

        let res = self
            .client
            .post(self.embeddings_url())
            .bearer_auth(&self.config.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(ChatError::retrieval)?;

        if !res.status().is_success() {
            let status = res.status().as_u16();
            let body = res.text().await.unwrap_or_default();
            return Err(ChatError::retrieval(format!(
                "embeddings API error: status={}, body={}",
                status, body
            )));
        }

        let parsed: EmbeddingsResponse = res.json().await.map_err(ChatError::retrieval)?;
        let vector = parsed
            .data
            .into_iter()
            .next()
            .map(|item| item.embedding)
            .ok_or_else(|| ChatError::retrieval("embeddings API returned no vectors"))?;

        Ok(Embedding::new(vector, self.config.model.clone()))
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
    embedding: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_embed_reads_first_vector() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_json(json!({
                "model": "text-embedding-ada-002",
                "input": "User: hello"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{ "index": 0, "embedding": [0.1, 0.2, 0.3] }],
                "model": "text-embedding-ada-002"
            })))
            .mount(&server)
            .await;

        let config = OpenAiEmbeddingConfig::new("sk-test").with_base_url(server.uri());
        let provider = OpenAiEmbeddingProvider::new(config).unwrap();
        let embedding = provider.embed("User: hello").await.unwrap();

        assert_eq!(embedding.vector, vec![0.1, 0.2, 0.3]);
        assert_eq!(embedding.model, "text-embedding-ada-002");
    }

    #[tokio::test]
    async fn test_api_error_is_retrieval_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let config = OpenAiEmbeddingConfig::new("sk-test").with_base_url(server.uri());
        let provider = OpenAiEmbeddingProvider::new(config).unwrap();

        assert!(matches!(
            provider.embed("hi").await,
            Err(ChatError::RetrievalFailed { .. })
        ));
    }
}
