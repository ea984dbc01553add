//! Application state and backend selection

use crate::config::ServerConfig;
use crate::postgres::PgConversationRecords;
use anyhow::{bail, Context};
use confidant_llm::{ReplicateConfig, ReplicateProvider};
use confidant_memory::rate_limit::RedisRateLimiter;
use confidant_memory::retrieval::{
    EmbeddingProvider, HashEmbeddingProvider, InMemoryVectorIndex, OpenAiEmbeddingConfig,
    OpenAiEmbeddingProvider, PineconeConfig, PineconeIndex, VectorIndex,
};
use confidant_memory::storage::{InMemoryScoredSetStore, RedisScoredSetStore, ScoredSetStore};
use confidant_memory::{
    ChatOrchestrator, ConversationRecords, FixedWindowLimiter, HistoryStore,
    InMemoryConversationRecords, Persona, RateLimiter, RetrievalClient,
};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Dimensions of the development embeddings, matching ada-002
const DEV_EMBEDDING_DIMENSIONS: usize = 1536;

/// Shared by every request handler
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: ChatOrchestrator,

    /// The same record store the orchestrator writes to
    pub records: Arc<dyn ConversationRecords>,
}

impl AppState {
    /// Wrap a ready orchestrator and its record store
    pub fn new(orchestrator: ChatOrchestrator, records: Arc<dyn ConversationRecords>) -> Self {
        Self {
            orchestrator,
            records,
        }
    }

    /// Connect every backend named in `config`
    pub async fn from_config(config: &ServerConfig) -> anyhow::Result<Self> {
        let provider = completion_provider(config)?;
        let (store, limiter) = history_backends(config).await?;
        let records = record_store(config).await?;
        let retrieval = retrieval_client(config)?;

        let orchestrator = ChatOrchestrator::new(
            HistoryStore::new(store),
            retrieval,
            limiter,
            records.clone(),
            provider,
            config.chat_config(),
        );
        Ok(Self::new(orchestrator, records))
    }
}

fn completion_provider(config: &ServerConfig) -> anyhow::Result<Arc<ReplicateProvider>> {
    let Some(token) = config.replicate.api_token.as_deref() else {
        bail!("CONFIDANT__REPLICATE__API_TOKEN is not set");
    };

    let mut replicate = ReplicateConfig::new(token, &config.replicate.model);
    if let Some(base_url) = &config.replicate.base_url {
        replicate = replicate.with_base_url(base_url);
    }

    let provider = ReplicateProvider::new(replicate).context("invalid Replicate settings")?;
    info!(model = %config.replicate.model, "Using Replicate completions");
    Ok(Arc::new(provider))
}

async fn history_backends(
    config: &ServerConfig,
) -> anyhow::Result<(Arc<dyn ScoredSetStore>, Arc<dyn RateLimiter>)> {
    match &config.redis_url {
        Some(url) => {
            let store = RedisScoredSetStore::connect(url)
                .await
                .context("failed to connect to Redis")?;
            let limiter = RedisRateLimiter::new(store.connection(), config.rate_limit_config());
            info!("Using Redis for history and rate limits");
            Ok((Arc::new(store), Arc::new(limiter)))
        }
        None => {
            warn!("CONFIDANT__REDIS_URL not set, history and rate limits are kept in process memory");
            Ok((
                Arc::new(InMemoryScoredSetStore::new()),
                Arc::new(FixedWindowLimiter::new(config.rate_limit_config())),
            ))
        }
    }
}

async fn record_store(config: &ServerConfig) -> anyhow::Result<Arc<dyn ConversationRecords>> {
    if let Some(url) = &config.database_url {
        let records = PgConversationRecords::connect(url)
            .await
            .context("failed to connect to Postgres")?;
        info!("Using Postgres for conversation records");
        return Ok(Arc::new(records));
    }

    warn!("CONFIDANT__DATABASE_URL not set, conversation records are kept in process memory");
    let records = InMemoryConversationRecords::new();
    if let Some(path) = &config.personas_path {
        for persona in load_personas(path).await? {
            records.insert_persona(persona);
        }
    }
    Ok(Arc::new(records))
}

/// Read a JSON array of personas
pub async fn load_personas(path: &Path) -> anyhow::Result<Vec<Persona>> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read personas from {}", path.display()))?;
    let personas: Vec<Persona> = serde_json::from_str(&raw)
        .with_context(|| format!("invalid personas file {}", path.display()))?;
    info!(count = personas.len(), path = %path.display(), "Loaded personas");
    Ok(personas)
}

fn retrieval_client(config: &ServerConfig) -> anyhow::Result<RetrievalClient> {
    let embedder: Arc<dyn EmbeddingProvider> = match &config.openai {
        Some(openai) => {
            let mut settings = OpenAiEmbeddingConfig::new(&openai.api_key);
            if let Some(base_url) = &openai.base_url {
                settings = settings.with_base_url(base_url);
            }
            if let Some(model) = &openai.model {
                settings = settings.with_model(model);
            }
            Arc::new(OpenAiEmbeddingProvider::new(settings)?)
        }
        None => {
            if config.pinecone.is_some() {
                bail!("CONFIDANT__PINECONE__* requires CONFIDANT__OPENAI__API_KEY for query embeddings");
            }
            Arc::new(HashEmbeddingProvider::new(DEV_EMBEDDING_DIMENSIONS))
        }
    };

    let index: Arc<dyn VectorIndex> = match &config.pinecone {
        Some(pinecone) => {
            let mut settings = PineconeConfig::new(&pinecone.api_key, &pinecone.index_host);
            if let Some(namespace) = &pinecone.namespace {
                settings = settings.with_namespace(namespace);
            }
            info!(index_host = %pinecone.index_host, "Using Pinecone for retrieval");
            Arc::new(PineconeIndex::new(settings)?)
        }
        None => {
            warn!("CONFIDANT__PINECONE__* not set, retrieval uses an empty in-memory index");
            Arc::new(InMemoryVectorIndex::new())
        }
    };

    Ok(RetrievalClient::new(embedder, index))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_load_personas_file() {
        let path = std::env::temp_dir().join(format!("personas-{}.json", uuid::Uuid::new_v4()));
        tokio::fs::write(
            &path,
            r#"[{"id":"p1","name":"Ada","instructions":"Be Ada.","seed":"Ada: hi"}]"#,
        )
        .await
        .unwrap();

        let personas = load_personas(&path).await.unwrap();
        tokio::fs::remove_file(&path).await.unwrap();

        assert_eq!(personas, vec![Persona::new("p1", "Ada", "Be Ada.", "Ada: hi")]);
    }

    #[tokio::test]
    async fn test_missing_token_fails_startup() {
        let empty = config::Environment::with_prefix("CONFIDANT")
            .separator("__")
            .source(Some(std::collections::HashMap::new()));
        let settings = ServerConfig::from_source(empty).unwrap();

        let err = AppState::from_config(&settings).await.err().unwrap();
        assert!(err.to_string().contains("API_TOKEN"));
    }
}
