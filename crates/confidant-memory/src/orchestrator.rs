//! One chat turn, from admission to persisted completion
//!
//! A turn is admitted, the user's line is persisted, context is assembled from
//! recent history and retrieved excerpts, and the completion is streamed back
//! to the caller. The completion is written to history and to the durable
//! record only after the upstream stream has ended normally.

use crate::config::ChatConfig;
use crate::error::{ChatError, ChatResult};
use crate::history::HistoryStore;
use crate::key::{ConversationKey, Identity};
use crate::prompt::PromptBuilder;
use crate::rate_limit::RateLimiter;
use crate::records::{ConversationMessage, ConversationRecords, NewMessage, Persona};
use crate::retrieval::RetrievalClient;
use confidant_llm::{CompletionProvider, CompletionRequest, CompletionStream};
use futures::{Stream, StreamExt};
use serde::Serialize;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, timeout_at, Instant};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Prefix of the user's lines in conversation history
const USER_LINE_PREFIX: &str = "User: ";

/// Input of one chat turn
#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// Persona being addressed
    pub persona_id: String,

    /// The user's message
    pub prompt: String,

    /// Authenticated caller, `None` when the identity provider had none
    pub identity: Option<Identity>,

    /// Where the request came from, usually the request path
    pub origin: String,
}

impl ChatRequest {
    /// Create an anonymous request
    pub fn new(persona_id: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            persona_id: persona_id.into(),
            prompt: prompt.into(),
            identity: None,
            origin: String::new(),
        }
    }

    /// Attach the caller identity
    pub fn with_identity(mut self, identity: Identity) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Set the request origin used for rate limiting
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self
    }
}

/// How a streamed turn ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TurnOutcome {
    /// The model finished; `text` is the trimmed completion
    Completed {
        text: String,
        history_saved: bool,
        record_saved: bool,
    },

    /// The caller stopped reading before the model finished
    Cancelled,

    /// The upstream stream failed
    Failed { reason: String },

    /// The completion deadline passed
    TimedOut,
}

impl TurnOutcome {
    /// Whether the completion was fully persisted
    pub fn is_persisted(&self) -> bool {
        matches!(
            self,
            Self::Completed {
                history_saved: true,
                record_saved: true,
                ..
            }
        )
    }
}

/// Completion chunks in model order
#[derive(Debug)]
pub struct ReplyChunks {
    inner: ReceiverStream<String>,
}

impl Stream for ReplyChunks {
    type Item = String;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

/// Resolves once the turn has ended and its completion has been handled
#[derive(Debug)]
pub struct TurnHandle {
    task: JoinHandle<TurnOutcome>,
}

impl TurnHandle {
    /// Wait for the outcome
    pub async fn wait(self) -> TurnOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(err) => TurnOutcome::Failed {
                reason: format!("turn task aborted: {}", err),
            },
        }
    }
}

/// A streaming reply to one chat turn
#[derive(Debug)]
pub struct ChatReply {
    key: ConversationKey,
    chunks: ReplyChunks,
    outcome: TurnHandle,
}

impl ChatReply {
    /// Conversation this reply belongs to
    pub fn key(&self) -> &ConversationKey {
        &self.key
    }

    /// Split into the chunk stream and the outcome handle
    pub fn into_parts(self) -> (ReplyChunks, TurnHandle) {
        (self.chunks, self.outcome)
    }

    /// Drain the chunk stream and wait for the outcome
    pub async fn collect(self) -> (String, TurnOutcome) {
        let (chunks, outcome) = self.into_parts();
        let text: String = chunks.collect::<Vec<_>>().await.concat();
        (text, outcome.wait().await)
    }
}

/// Coordinates history, retrieval, rate limiting and the completion endpoint
#[derive(Clone)]
pub struct ChatOrchestrator {
    history: HistoryStore,
    retrieval: RetrievalClient,
    limiter: Arc<dyn RateLimiter>,
    records: Arc<dyn ConversationRecords>,
    provider: Arc<dyn CompletionProvider>,
    config: ChatConfig,
}

impl ChatOrchestrator {
    /// Create an orchestrator
    pub fn new(
        history: HistoryStore,
        retrieval: RetrievalClient,
        limiter: Arc<dyn RateLimiter>,
        records: Arc<dyn ConversationRecords>,
        provider: Arc<dyn CompletionProvider>,
        config: ChatConfig,
    ) -> Self {
        Self {
            history,
            retrieval,
            limiter,
            records,
            provider,
            config,
        }
    }

    /// Active configuration
    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    /// Run one chat turn.
    ///
    /// Returns once the completion has started streaming. Rejections
    /// (`Unauthenticated`, `InvalidRequest`, `RateLimited`, `NotFound`) happen
    /// before anything is written.
    pub async fn chat(&self, request: ChatRequest) -> ChatResult<ChatReply> {
        let deadline = Instant::now() + self.config.completion_timeout;

        let identity = authenticated(request.identity.as_ref())?;
        if request.prompt.trim().is_empty() {
            return Err(ChatError::invalid("prompt must not be empty"));
        }

        let identifier = format!("{}-{}", request.origin, identity.user_id);
        let decision = self.limiter.admit(&identifier).await?;
        if !decision.allowed {
            info!(
                user_id = %identity.user_id,
                origin = %request.origin,
                limit = decision.limit,
                "Rate limit exceeded"
            );
            return Err(ChatError::RateLimited);
        }

        let persona = self.lookup_persona(&request.persona_id).await?;
        let key = ConversationKey::new(&persona.id, &identity.user_id, &self.config.model_id)?;

        self.records
            .append_message(NewMessage::user(
                &persona.id,
                &identity.user_id,
                &request.prompt,
            ))
            .await?;

        if !self.history.exists(&key).await? {
            self.history
                .seed_if_empty(&key, &persona.seed, &self.config.seed_delimiter)
                .await?;
        }
        self.history
            .append(&key, &format!("{}{}", USER_LINE_PREFIX, request.prompt))
            .await?;

        let recent = self
            .history
            .read_recent(&key, self.config.history_window)
            .await?;
        let excerpts = self
            .retrieval
            .search(&recent, &persona.source_document(), self.config.top_k)
            .await;

        let prompt = PromptBuilder::new(&persona)
            .with_excerpts(&excerpts)
            .with_recent_history(&recent)
            .build();

        debug!(
            key = %key,
            excerpts = excerpts.len(),
            prompt_len = prompt.len(),
            "Assembled completion prompt"
        );

        let completion = CompletionRequest::new(prompt).with_max_length(self.config.max_length);
        let upstream = match timeout_at(deadline, self.provider.stream(completion)).await {
            Ok(Ok(upstream)) => upstream,
            Ok(Err(err)) => {
                error!(
                    key = %key,
                    provider = self.provider.name(),
                    error = %err,
                    "Failed to start completion"
                );
                return Err(err.into());
            }
            Err(_) => {
                error!(
                    key = %key,
                    provider = self.provider.name(),
                    "Completion did not start before the deadline"
                );
                return Err(ChatError::upstream_timeout(self.config.completion_timeout));
            }
        };

        let (tx, rx) = mpsc::channel(self.config.stream_buffer.max(1));
        let pump = TurnPump {
            key: key.clone(),
            history: self.history.clone(),
            records: self.records.clone(),
            deadline,
        };
        let span = info_span!("chat_turn", key = %key, model = %upstream.model());
        let task = tokio::spawn(pump.run(upstream, tx).instrument(span));

        Ok(ChatReply {
            key,
            chunks: ReplyChunks {
                inner: ReceiverStream::new(rx),
            },
            outcome: TurnHandle { task },
        })
    }

    /// The caller's transcript with one persona, oldest first
    pub async fn transcript(
        &self,
        persona_id: &str,
        identity: Option<&Identity>,
    ) -> ChatResult<(Persona, Vec<ConversationMessage>)> {
        let identity = authenticated(identity)?;
        let persona = self.lookup_persona(persona_id).await?;
        let messages = self.records.messages(&persona.id, &identity.user_id).await?;
        Ok((persona, messages))
    }

    async fn lookup_persona(&self, persona_id: &str) -> ChatResult<Persona> {
        if persona_id.trim().is_empty() {
            return Err(ChatError::NotFound {
                persona_id: persona_id.to_string(),
            });
        }
        self.records
            .persona(persona_id)
            .await?
            .ok_or_else(|| ChatError::NotFound {
                persona_id: persona_id.to_string(),
            })
    }
}

fn authenticated(identity: Option<&Identity>) -> ChatResult<&Identity> {
    identity
        .filter(|identity| identity.is_complete())
        .ok_or(ChatError::Unauthenticated)
}

/// Forwards upstream chunks to the caller and persists the finished completion
struct TurnPump {
    key: ConversationKey,
    history: HistoryStore,
    records: Arc<dyn ConversationRecords>,
    deadline: Instant,
}

impl TurnPump {
    async fn run(self, mut upstream: CompletionStream, tx: mpsc::Sender<String>) -> TurnOutcome {
        let mut text = String::new();

        loop {
            tokio::select! {
                biased;

                _ = tx.closed() => {
                    info!("Caller went away, discarding completion");
                    return TurnOutcome::Cancelled;
                }
                _ = sleep_until(self.deadline) => {
                    warn!("Completion deadline passed");
                    return TurnOutcome::TimedOut;
                }
                next = upstream.next() => match next {
                    Some(Ok(chunk)) => {
                        if chunk.is_empty() {
                            continue;
                        }
                        text.push_str(&chunk);
                        match timeout_at(self.deadline, tx.send(chunk)).await {
                            Ok(Ok(())) => {}
                            Ok(Err(_)) => {
                                info!("Caller went away, discarding completion");
                                return TurnOutcome::Cancelled;
                            }
                            Err(_) => {
                                warn!("Completion deadline passed while caller was not reading");
                                return TurnOutcome::TimedOut;
                            }
                        }
                    }
                    Some(Err(err)) => {
                        error!(error = %err, received = text.len(), "Completion stream failed");
                        return TurnOutcome::Failed { reason: err.to_string() };
                    }
                    None => break,
                },
            }
        }

        drop(upstream);

        // end-of-stream reaches the caller only after the reply is persisted
        let outcome = self.persist(text.trim().to_string()).await;
        drop(tx);
        outcome
    }

    async fn persist(&self, text: String) -> TurnOutcome {
        if text.is_empty() {
            warn!("Model returned an empty completion, nothing saved");
            return TurnOutcome::Completed {
                text,
                history_saved: false,
                record_saved: false,
            };
        }

        let history_saved = match self.history.append(&self.key, &text).await {
            Ok(_) => true,
            Err(err) => {
                error!(
                    key = %self.key,
                    reconcile = true,
                    error = %err,
                    "Failed to save completion to history"
                );
                false
            }
        };

        let record = NewMessage::system(self.key.persona_id(), self.key.user_id(), text.as_str());
        let record_saved = match self.records.append_message(record).await {
            Ok(_) => true,
            Err(err) => {
                error!(
                    key = %self.key,
                    reconcile = true,
                    error = %err,
                    "Failed to record completion"
                );
                false
            }
        };

        debug!(history_saved, record_saved, chars = text.len(), "Turn completed");

        TurnOutcome::Completed {
            text,
            history_saved,
            record_saved,
        }
    }
}
