//! # Confidant LLM
//!
//! Streaming completion client used by the persona chat core.
//!
//! A [`CompletionProvider`] turns a single prompt into a [`CompletionStream`]:
//! an ordered sequence of text chunks exactly as the model produced them.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use confidant_llm::{CompletionProvider, CompletionRequest, ReplicateConfig, ReplicateProvider};
//! use futures_util::StreamExt;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ReplicateConfig::new("r8_token", "meta/llama-2-70b-chat");
//! let provider = ReplicateProvider::new(config)?;
//!
//! let mut stream = provider
//!     .stream(CompletionRequest::new("Hello there").with_max_length(2040))
//!     .await?;
//!
//! while let Some(chunk) = stream.next().await {
//!     print!("{}", chunk?);
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod error;
pub mod provider;
pub mod sse;
pub mod types;

#[cfg(feature = "replicate")]
pub mod providers;

pub use error::{LlmError, LlmResult};
pub use provider::CompletionProvider;
pub use types::{ChunkStream, CompletionRequest, CompletionStream};

#[cfg(feature = "replicate")]
pub use providers::{ReplicateConfig, ReplicateProvider};
