//! # Confidant - Persona chat for Rust
//!
//! **Confidant** brings together:
//!
//! - **Confidant LLM**: streaming completion client (Replicate)
//! - **Confidant Memory**: per-conversation history, relevance retrieval,
//!   rate limiting and the chat turn orchestrator
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use confidant::prelude::*;
//! use confidant::memory::retrieval::{HashEmbeddingProvider, InMemoryVectorIndex};
//! use confidant::memory::storage::InMemoryScoredSetStore;
//! use confidant::memory::{FixedWindowLimiter, InMemoryConversationRecords};
//! use futures::StreamExt;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let records = Arc::new(InMemoryConversationRecords::new());
//!     records.insert_persona(Persona::new("ada", "Ada", "You are Ada.", "Ada: hello"));
//!
//!     let provider = ReplicateProvider::new(ReplicateConfig::new(
//!         std::env::var("REPLICATE_API_TOKEN")?,
//!         "meta/llama-2-70b-chat",
//!     ))?;
//!
//!     let orchestrator = ChatOrchestrator::new(
//!         HistoryStore::new(Arc::new(InMemoryScoredSetStore::new())),
//!         RetrievalClient::new(
//!             Arc::new(HashEmbeddingProvider::new(256)),
//!             Arc::new(InMemoryVectorIndex::new()),
//!         ),
//!         Arc::new(FixedWindowLimiter::default()),
//!         records,
//!         Arc::new(provider),
//!         ChatConfig::default(),
//!     );
//!
//!     let request = ChatRequest::new("ada", "Who are you?")
//!         .with_identity(Identity::new("user-1", "Grace"));
//!     let (mut chunks, outcome) = orchestrator.chat(request).await?.into_parts();
//!
//!     while let Some(chunk) = chunks.next().await {
//!         print!("{}", chunk);
//!     }
//!     println!("\n{:?}", outcome.wait().await);
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//!        confidant (umbrella)
//!               |
//!      +--------+---------+
//!      |                  |
//!  confidant-llm   confidant-memory
//!                         |
//!                  confidant-server (axum)
//! ```

#![doc(html_root_url = "https://docs.rs/confidant/0.1.0")]
#![warn(missing_docs)]

// Re-export sub-crates
#[cfg(feature = "llm")]
pub use confidant_llm as llm;

#[cfg(feature = "memory")]
pub use confidant_memory as memory;

/// Commonly used types and traits
pub mod prelude {
    #[cfg(feature = "llm")]
    pub use crate::llm::{
        CompletionProvider, CompletionRequest, CompletionStream, LlmError, LlmResult,
        ReplicateConfig, ReplicateProvider,
    };

    #[cfg(feature = "memory")]
    pub use crate::memory::prelude::*;
}
