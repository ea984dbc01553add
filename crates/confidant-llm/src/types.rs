//! Request and stream types shared by all providers

use crate::error::{LlmError, LlmResult};
use futures_util::stream::{self, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::task::{Context, Poll};

/// Boxed stream of completion chunks
pub type ChunkStream = Pin<Box<dyn Stream<Item = LlmResult<String>> + Send + 'static>>;

/// A single completion request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Full prompt text
    pub prompt: String,

    /// Upper bound on generated tokens, if the provider supports one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u32>,
}

impl CompletionRequest {
    /// Create a new request for the given prompt
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            max_length: None,
        }
    }

    /// Set the maximum generation length
    pub fn with_max_length(mut self, max_length: u32) -> Self {
        self.max_length = Some(max_length);
        self
    }
}

/// Ordered stream of text chunks produced by a provider
pub struct CompletionStream {
    model: String,
    chunks: ChunkStream,
}

impl CompletionStream {
    /// Wrap a chunk stream
    pub fn new(model: impl Into<String>, chunks: ChunkStream) -> Self {
        Self {
            model: model.into(),
            chunks,
        }
    }

    /// Build a stream from already-known items
    pub fn from_items(model: impl Into<String>, items: Vec<LlmResult<String>>) -> Self {
        Self::new(model, Box::pin(stream::iter(items)))
    }

    /// Model that produced this stream
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Drain the stream and concatenate every chunk
    pub async fn collect_text(mut self) -> LlmResult<String> {
        let mut text = String::new();
        while let Some(chunk) = self.chunks.next().await {
            text.push_str(&chunk?);
        }
        Ok(text)
    }
}

impl Stream for CompletionStream {
    type Item = Result<String, LlmError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.chunks.as_mut().poll_next(cx)
    }
}

impl std::fmt::Debug for CompletionStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionStream")
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_collect_text_keeps_chunk_order() {
        let stream = CompletionStream::from_items(
            "test",
            vec![Ok("Hel".to_string()), Ok("lo".to_string()), Ok(" there".to_string())],
        );

        assert_eq!(stream.collect_text().await.unwrap(), "Hello there");
    }

    #[tokio::test]
    async fn test_collect_text_surfaces_stream_error() {
        let stream = CompletionStream::from_items(
            "test",
            vec![Ok("partial".to_string()), Err(LlmError::stream("connection reset"))],
        );

        let err = stream.collect_text().await.unwrap_err();
        assert!(err.is_mid_stream());
    }

    #[test]
    fn test_request_serializes_without_empty_max_length() {
        let json = serde_json::to_value(CompletionRequest::new("hi")).unwrap();
        assert_eq!(json, serde_json::json!({ "prompt": "hi" }));
    }
}
