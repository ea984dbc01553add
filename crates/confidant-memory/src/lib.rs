//! # Confidant Memory
//!
//! Conversation memory and retrieval orchestration for persona chat.
//!
//! ## Components
//!
//! - **History**: append-only, strictly ordered log of dialogue lines per
//!   `(persona, user, model)` conversation, seeded once from the persona's
//!   canned backstory
//! - **Retrieval**: best-effort relevant excerpts from a vector similarity index
//! - **Rate limiting**: per-caller admission before any side effect
//! - **Orchestration**: one streamed completion per turn, persisted only once
//!   the stream has fully completed
//!
//! ## Example
//!
//! ```rust,no_run
//! use confidant_memory::prelude::*;
//! use confidant_memory::storage::InMemoryScoredSetStore;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let history = HistoryStore::new(Arc::new(InMemoryScoredSetStore::new()));
//! let key = ConversationKey::new("companion-1", "user-42", "llama2-13b")?;
//!
//! history.seed_if_empty(&key, "Human: hi\n\nCompanion: hello", "\n\n").await?;
//! history.append(&key, "User: how are you?").await?;
//!
//! let recent = history.read_recent(&key, 30).await?;
//! assert!(recent.ends_with("User: how are you?"));
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod history;
pub mod key;
pub mod orchestrator;
pub mod prompt;
pub mod rate_limit;
pub mod records;
pub mod retrieval;
pub mod storage;

pub use config::{ChatConfig, RateLimitConfig};
pub use error::{ChatError, ChatResult};
pub use history::{HistoryEntry, HistoryStore};
pub use key::{ConversationKey, Identity};
pub use orchestrator::{
    ChatOrchestrator, ChatReply, ChatRequest, ReplyChunks, TurnHandle, TurnOutcome,
};
pub use rate_limit::{FixedWindowLimiter, RateLimitDecision, RateLimiter};
pub use records::{
    ConversationMessage, ConversationRecords, InMemoryConversationRecords, MessageRole, NewMessage,
    Persona, PersonaDraft,
};
pub use retrieval::{RetrievalClient, RetrievedExcerpt};

/// Commonly used types and traits
pub mod prelude {
    pub use crate::{
        ChatConfig, ChatError, ChatOrchestrator, ChatReply, ChatRequest, ChatResult,
        ConversationKey, ConversationRecords, HistoryStore, Identity, Persona, RateLimiter,
        RetrievalClient, TurnOutcome,
    };
}
