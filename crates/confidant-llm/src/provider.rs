//! Provider abstraction for streamed completions

use crate::error::LlmResult;
use crate::types::{CompletionRequest, CompletionStream};

/// A remote model that can stream a completion for a prompt
#[async_trait::async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Short provider name used in logs
    fn name(&self) -> &'static str;

    /// Model identifier the provider talks to
    fn model(&self) -> &str;

    /// Start a streamed completion.
    ///
    /// Resolves once the provider has accepted the request; chunks are then
    /// pulled from the returned stream in the order the model produced them.
    /// Dropping the stream aborts the upstream call.
    async fn stream(&self, request: CompletionRequest) -> LlmResult<CompletionStream>;
}
