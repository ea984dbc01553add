//! Pinecone vector index

use super::{IndexFilter, IndexMatch, VectorIndex, SOURCE_DOCUMENT_FIELD};
use crate::error::{ChatError, ChatResult};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

/// Metadata field holding the excerpt text
const TEXT_FIELD: &str = "text";

/// Configuration for [`PineconeIndex`]
#[derive(Debug, Clone)]
pub struct PineconeConfig {
    /// API key
    pub api_key: String,

    /// Index host, e.g. `https://companions-abc123.svc.us-east1-gcp.pinecone.io`
    pub index_host: String,

    /// Optional namespace inside the index
    pub namespace: Option<String>,

    /// Optional `X-Pinecone-API-Version` header
    pub api_version: Option<String>,

    /// Request timeout
    pub timeout: Duration,
}

impl PineconeConfig {
    /// Create a configuration for one index host
    pub fn new(api_key: impl Into<String>, index_host: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            index_host: index_host.into(),
            namespace: None,
            api_version: None,
            timeout: Duration::from_secs(10),
        }
    }

    /// Query a namespace
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Pin the data-plane API version
    pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = Some(version.into());
        self
    }
}

/// Queries a Pinecone index over its data-plane REST API
#[derive(Clone)]
pub struct PineconeIndex {
    config: PineconeConfig,
    client: Client,
}

impl PineconeIndex {
    /// Create a new index client
    pub fn new(config: PineconeConfig) -> ChatResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ChatError::internal(format!("failed to build http client: {}", e)))?;
        Ok(Self { config, client })
    }

    fn query_url(&self) -> String {
        format!("{}/query", self.config.index_host.trim_end_matches('/'))
    }
}

#[async_trait::async_trait]
impl VectorIndex for PineconeIndex {
    fn name(&self) -> &'static str {
        "pinecone"
    }

    async fn query(
        &self,
        vector: &[f32],
        filter: &IndexFilter,
        top_k: usize,
    ) -> ChatResult<Vec<IndexMatch>> {
        let mut condition = serde_json::Map::new();
        condition.insert(
            filter.field.clone(),
            serde_json::json!({ "$eq": filter.value }),
        );

        let mut payload = serde_json::json!({
            "vector": vector,
            "topK": top_k,
            "filter": condition,
            "includeMetadata": true,
            "includeValues": false,
        });
        if let Some(namespace) = &self.config.namespace {
            payload["namespace"] = serde_json::Value::String(namespace.clone());
        }

        let mut req = self
            .client
            .post(self.query_url())
            .header("Api-Key", &self.config.api_key)
            .json(&payload);
        if let Some(version) = &self.config.api_version {
            req = req.header("X-Pinecone-API-Version", version);
        }

        let res = req.send().await.map_err(ChatError::retrieval)?;

        if !res.status().is_success() {
            let status = res.status().as_u16();
            let body = res.text().await.unwrap_or_default();
            return Err(ChatError::retrieval(format!(
                "pinecone API error: status={}, body={}",
                status, body
            )));
        }

        let parsed: PineconeQueryResponse = res.json().await.map_err(ChatError::retrieval)?;
        Ok(parsed.matches.into_iter().map(PineconeMatch::into_match).collect())
    }
}

#[derive(Debug, Deserialize)]
struct PineconeQueryResponse {
    #[serde(default)]
    matches: Vec<PineconeMatch>,
}

#[derive(Debug, Deserialize)]
struct PineconeMatch {
    id: String,
    #[serde(default)]
    score: f32,
    #[serde(default)]
    metadata: HashMap<String, serde_json::Value>,
}

impl PineconeMatch {
    fn into_match(mut self) -> IndexMatch {
        let mut take_string = |field: &str| match self.metadata.remove(field) {
            Some(serde_json::Value::String(value)) => Some(value),
            _ => None,
        };

        let content = take_string(TEXT_FIELD);
        let source_document = take_string(SOURCE_DOCUMENT_FIELD);

        IndexMatch {
            id: self.id,
            score: self.score,
            content,
            source_document,
        }
    }
}
