//! Replicate streaming predictions
//!
//! A completion is a two-step exchange: create a prediction with
//! `stream: true`, then read the server-sent events published at the
//! prediction's `urls.stream` address.

use crate::error::{LlmError, LlmResult};
use crate::provider::CompletionProvider;
use crate::sse::{SseDecoder, SseEvent};
use crate::types::{ChunkStream, CompletionRequest, CompletionStream};
use async_stream::try_stream;
use futures_util::{Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Configuration for [`ReplicateProvider`]
#[derive(Debug, Clone)]
pub struct ReplicateConfig {
    /// API token (`REPLICATE_API_TOKEN`)
    pub api_token: String,

    /// Model in `owner/name` form
    pub model: String,

    /// API base URL
    pub base_url: String,

    /// Connect timeout for both requests
    pub connect_timeout: Duration,

    /// Timeout for the prediction-creation request only
    pub create_timeout: Duration,
}

impl ReplicateConfig {
    /// Create a configuration with default endpoint and timeouts
    pub fn new(api_token: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_token: api_token.into(),
            model: model.into(),
            base_url: "https://api.replicate.com".to_string(),
            connect_timeout: Duration::from_secs(10),
            create_timeout: Duration::from_secs(30),
        }
    }

    /// Override the API base URL
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Override the prediction-creation timeout
    pub fn with_create_timeout(mut self, timeout: Duration) -> Self {
        self.create_timeout = timeout;
        self
    }
}

/// Streams completions from a Replicate-hosted model
#[derive(Clone)]
pub struct ReplicateProvider {
    config: ReplicateConfig,
    client: Client,
}

impl ReplicateProvider {
    /// Create a new provider
    pub fn new(config: ReplicateConfig) -> LlmResult<Self> {
        if config.api_token.trim().is_empty() {
            return Err(LlmError::Config("replicate api token is empty".to_string()));
        }
        if !config.model.contains('/') {
            return Err(LlmError::Config(format!(
                "replicate model must be owner/name, got {}",
                config.model
            )));
        }

        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()?;
        Ok(Self { config, client })
    }

    fn predictions_url(&self) -> String {
        format!(
            "{}/v1/models/{}/predictions",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        )
    }

    async fn create_prediction(&self, request: &CompletionRequest) -> LlmResult<Prediction> {
        let payload = CreatePrediction {
            stream: true,
            input: PredictionInput {
                prompt: &request.prompt,
                max_new_tokens: request.max_length,
            },
        };

        let res = self
            .client
            .post(self.predictions_url())
            .bearer_auth(&self.config.api_token)
            .timeout(self.config.create_timeout)
            .json(&payload)
            .send()
            .await?;

        if !res.status().is_success() {
            let status = res.status().as_u16();
            let body = res.text().await.unwrap_or_default();
            return Err(LlmError::Api { status, body });
        }

        Ok(res.json().await?)
    }
}

#[async_trait::async_trait]
impl CompletionProvider for ReplicateProvider {
    fn name(&self) -> &'static str {
        "replicate"
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    async fn stream(&self, request: CompletionRequest) -> LlmResult<CompletionStream> {
        let prediction = self.create_prediction(&request).await?;
        let stream_url = prediction
            .urls
            .and_then(|urls| urls.stream)
            .ok_or_else(|| {
                LlmError::InvalidResponse(format!(
                    "prediction {} has no stream url",
                    prediction.id
                ))
            })?;

        debug!(
            prediction_id = %prediction.id,
            model = %self.config.model,
            prompt_length = request.prompt.len(),
            "Replicate prediction created"
        );

        let res = self
            .client
            .get(&stream_url)
            .bearer_auth(&self.config.api_token)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .header(reqwest::header::CACHE_CONTROL, "no-store")
            .send()
            .await?;

        if !res.status().is_success() {
            let status = res.status().as_u16();
            let body = res.text().await.unwrap_or_default();
            return Err(LlmError::Api { status, body });
        }

        Ok(CompletionStream::new(
            self.config.model.clone(),
            Box::pin(event_chunks(res, prediction.id)) as ChunkStream,
        ))
    }
}

/// Outcome of a single event for the chunk stream
enum EventAction {
    Emit(String),
    Skip,
    Done,
    Fail(LlmError),
}

fn classify(event: SseEvent) -> EventAction {
    match event.event.as_str() {
        "output" if event.data.is_empty() => EventAction::Skip,
        "output" => EventAction::Emit(event.data),
        "done" => EventAction::Done,
        "error" => {
            let detail = serde_json::from_str::<StreamErrorPayload>(&event.data)
                .map(|p| p.detail)
                .unwrap_or(event.data);
            EventAction::Fail(LlmError::stream(detail))
        }
        _ => EventAction::Skip,
    }
}

fn event_chunks(
    response: reqwest::Response,
    prediction_id: String,
) -> impl Stream<Item = LlmResult<String>> + Send + 'static {
    try_stream! {
        let mut body = response.bytes_stream();
        let mut decoder = SseDecoder::new();
        let mut finished = false;
        let mut closed = false;

        while !finished {
            let events = match body.next().await {
                Some(piece) => decoder.push(&piece.map_err(LlmError::from)?),
                None => {
                    closed = true;
                    decoder.finish().into_iter().collect()
                }
            };

            for event in events {
                match classify(event) {
                    EventAction::Emit(text) => yield text,
                    EventAction::Skip => {}
                    EventAction::Done => {
                        finished = true;
                        break;
                    }
                    EventAction::Fail(err) => Err::<(), LlmError>(err)?,
                }
            }

            if closed && !finished {
                warn!(prediction_id = %prediction_id, "Replicate stream closed before done event");
                Err::<(), LlmError>(LlmError::stream("stream closed before completion"))?;
            }
        }

        debug!(prediction_id = %prediction_id, "Replicate stream finished");
    }
}

#[derive(Debug, Serialize)]
struct CreatePrediction<'a> {
    stream: bool,
    input: PredictionInput<'a>,
}

#[derive(Debug, Serialize)]
struct PredictionInput<'a> {
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_new_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct Prediction {
    id: String,
    #[serde(default)]
    urls: Option<PredictionUrls>,
}

#[derive(Debug, Deserialize)]
struct PredictionUrls {
    #[serde(default)]
    stream: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamErrorPayload {
    detail: String,
}
