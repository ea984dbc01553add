use confidant_llm::{
    ChunkStream, CompletionProvider, CompletionRequest, CompletionStream, LlmError, LlmResult,
};
use confidant_memory::history::HistoryEntry;
use confidant_memory::prelude::*;
use confidant_memory::retrieval::{
    Embedding, EmbeddingProvider, HashEmbeddingProvider, InMemoryVectorIndex,
};
use confidant_memory::storage::{InMemoryScoredSetStore, ScoredSetStore};
use confidant_memory::{
    FixedWindowLimiter, InMemoryConversationRecords, MessageRole, RateLimitConfig,
};
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const PERSONA_ID: &str = "p1";

/// How the scripted provider behaves once its chunks run out
#[derive(Clone, Copy)]
enum Tail {
    End,
    Hang,
    Fail,
}

struct ScriptedProvider {
    chunks: Vec<&'static str>,
    tail: Tail,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    fn new(chunks: Vec<&'static str>, tail: Tail) -> Self {
        Self {
            chunks,
            tail,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl CompletionProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn model(&self) -> &str {
        "scripted-model"
    }

    async fn stream(&self, request: CompletionRequest) -> LlmResult<CompletionStream> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().push(request.prompt);

        let head = stream::iter(
            self.chunks
                .iter()
                .map(|c| Ok::<_, LlmError>(c.to_string()))
                .collect::<Vec<_>>(),
        );
        let chunks: ChunkStream = match self.tail {
            Tail::End => Box::pin(head),
            Tail::Hang => Box::pin(head.chain(stream::pending())),
            Tail::Fail => Box::pin(head.chain(stream::iter(vec![Err(LlmError::stream(
                "connection reset",
            ))]))),
        };
        Ok(CompletionStream::new("scripted-model", chunks))
    }
}

struct UnavailableProvider;

#[async_trait::async_trait]
impl CompletionProvider for UnavailableProvider {
    fn name(&self) -> &'static str {
        "unavailable"
    }

    fn model(&self) -> &str {
        "none"
    }

    async fn stream(&self, _request: CompletionRequest) -> LlmResult<CompletionStream> {
        Err(LlmError::Api {
            status: 503,
            body: "overloaded".to_string(),
        })
    }
}

/// Records every text it embeds
struct RecordingEmbedder {
    inner: HashEmbeddingProvider,
    queries: Mutex<Vec<String>>,
}

#[async_trait::async_trait]
impl EmbeddingProvider for RecordingEmbedder {
    async fn embed(&self, text: &str) -> ChatResult<Embedding> {
        self.queries.lock().push(text.to_string());
        self.inner.embed(text).await
    }

    fn model_name(&self) -> &str {
        "recording"
    }
}

struct BrokenEmbedder;

#[async_trait::async_trait]
impl EmbeddingProvider for BrokenEmbedder {
    async fn embed(&self, _text: &str) -> ChatResult<Embedding> {
        Err(ChatError::retrieval("embedding service unreachable"))
    }

    fn model_name(&self) -> &str {
        "broken"
    }
}

/// Counts writes on top of the in-memory backend
#[derive(Default)]
struct CountingStore {
    inner: InMemoryScoredSetStore,
    writes: AtomicUsize,
}

#[async_trait::async_trait]
impl ScoredSetStore for CountingStore {
    fn backend_name(&self) -> &'static str {
        "counting"
    }

    async fn append(&self, key: &str, text: &str, floor: i64) -> ChatResult<i64> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.append(key, text, floor).await
    }

    async fn insert_if_absent(&self, key: &str, entries: &[HistoryEntry]) -> ChatResult<bool> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.insert_if_absent(key, entries).await
    }

    async fn range_by_score(&self, key: &str, min: i64, max: i64) -> ChatResult<Vec<HistoryEntry>> {
        self.inner.range_by_score(key, min, max).await
    }

    async fn tail(&self, key: &str, limit: usize) -> ChatResult<Vec<HistoryEntry>> {
        self.inner.tail(key, limit).await
    }

    async fn exists(&self, key: &str) -> ChatResult<bool> {
        self.inner.exists(key).await
    }
}

/// Delays every write that is not a user turn, like a slow network hop
#[derive(Default)]
struct SlowReplyStore {
    inner: InMemoryScoredSetStore,
}

#[async_trait::async_trait]
impl ScoredSetStore for SlowReplyStore {
    fn backend_name(&self) -> &'static str {
        "slow-reply"
    }

    async fn append(&self, key: &str, text: &str, floor: i64) -> ChatResult<i64> {
        if !text.starts_with("User: ") {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        self.inner.append(key, text, floor).await
    }

    async fn insert_if_absent(&self, key: &str, entries: &[HistoryEntry]) -> ChatResult<bool> {
        self.inner.insert_if_absent(key, entries).await
    }

    async fn range_by_score(&self, key: &str, min: i64, max: i64) -> ChatResult<Vec<HistoryEntry>> {
        self.inner.range_by_score(key, min, max).await
    }

    async fn tail(&self, key: &str, limit: usize) -> ChatResult<Vec<HistoryEntry>> {
        self.inner.tail(key, limit).await
    }

    async fn exists(&self, key: &str) -> ChatResult<bool> {
        self.inner.exists(key).await
    }
}

struct Harness {
    orchestrator: ChatOrchestrator,
    history: HistoryStore,
    store: Arc<CountingStore>,
    records: Arc<InMemoryConversationRecords>,
    embedder: Arc<RecordingEmbedder>,
    index: Arc<InMemoryVectorIndex>,
}

impl Harness {
    fn key(&self, user_id: &str) -> ConversationKey {
        ConversationKey::new(PERSONA_ID, user_id, &self.orchestrator.config().model_id).unwrap()
    }

    async fn lines(&self, user_id: &str) -> Vec<String> {
        self.history
            .read_recent_entries(&self.key(user_id), 100)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.text)
            .collect()
    }
}

fn harness(
    provider: Arc<dyn CompletionProvider>,
    limits: RateLimitConfig,
    config: ChatConfig,
) -> Harness {
    let store = Arc::new(CountingStore::default());
    let history = HistoryStore::new(store.clone());

    let records = Arc::new(InMemoryConversationRecords::new());
    records.insert_persona(Persona::new(
        PERSONA_ID,
        "Ada",
        "You are Ada Lovelace.",
        "A\n\nB",
    ));

    let embedder = Arc::new(RecordingEmbedder {
        inner: HashEmbeddingProvider::new(32),
        queries: Mutex::new(Vec::new()),
    });
    let index = Arc::new(InMemoryVectorIndex::new());

    let orchestrator = ChatOrchestrator::new(
        history.clone(),
        RetrievalClient::new(embedder.clone(), index.clone()),
        Arc::new(FixedWindowLimiter::new(limits)),
        records.clone(),
        provider,
        config,
    );

    Harness {
        orchestrator,
        history,
        store,
        records,
        embedder,
        index,
    }
}

fn request(prompt: &str) -> ChatRequest {
    ChatRequest::new(PERSONA_ID, prompt)
        .with_identity(Identity::new("u1", "Grace"))
        .with_origin("/api/chat/p1")
}

#[tokio::test]
async fn test_turn_seeds_streams_and_persists() {
    let provider = Arc::new(ScriptedProvider::new(vec!["Hi ", "Grace", "! "], Tail::End));
    let h = harness(provider.clone(), RateLimitConfig::default(), ChatConfig::default());

    let backstory = HashEmbeddingProvider::new(32)
        .embed("A B User: hello")
        .await
        .unwrap();
    h.index.upsert("v1", backstory, "Ada wrote the first program.", "p1.txt");

    let reply = h.orchestrator.chat(request("hello")).await.unwrap();
    let (streamed, outcome) = reply.collect().await;

    assert_eq!(streamed, "Hi Grace! ");
    assert_eq!(
        outcome,
        TurnOutcome::Completed {
            text: "Hi Grace!".to_string(),
            history_saved: true,
            record_saved: true,
        }
    );

    assert_eq!(h.lines("u1").await, vec!["A", "B", "User: hello", "Hi Grace!"]);

    let transcript = h.records.messages(PERSONA_ID, "u1").await.unwrap();
    let rows: Vec<(MessageRole, &str)> = transcript
        .iter()
        .map(|m| (m.role, m.content.as_str()))
        .collect();
    assert_eq!(
        rows,
        vec![(MessageRole::User, "hello"), (MessageRole::System, "Hi Grace!")]
    );

    assert_eq!(*h.embedder.queries.lock(), vec!["A\nB\nUser: hello".to_string()]);

    let prompts = provider.prompts.lock();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("You are Ada Lovelace."));
    assert!(prompts[0].contains("Ada wrote the first program."));
    assert!(prompts[0].ends_with("A\nB\nUser: hello\nAda:"));
}

#[tokio::test]
async fn test_second_turn_does_not_reseed() {
    let provider = Arc::new(ScriptedProvider::new(vec!["ok"], Tail::End));
    let h = harness(provider, RateLimitConfig::default(), ChatConfig::default());

    h.orchestrator.chat(request("one")).await.unwrap().collect().await;
    h.orchestrator.chat(request("two")).await.unwrap().collect().await;

    assert_eq!(
        h.lines("u1").await,
        vec!["A", "B", "User: one", "ok", "User: two", "ok"]
    );
}

#[tokio::test]
async fn test_rejections_have_no_side_effects() {
    let provider = Arc::new(ScriptedProvider::new(vec!["ok"], Tail::End));
    let h = harness(
        provider.clone(),
        RateLimitConfig::new(0, Duration::from_secs(10)),
        ChatConfig::default(),
    );

    let anonymous = ChatRequest::new(PERSONA_ID, "hello");
    assert!(matches!(
        h.orchestrator.chat(anonymous).await,
        Err(ChatError::Unauthenticated)
    ));
    assert!(matches!(
        h.orchestrator.chat(request("hello")).await,
        Err(ChatError::RateLimited)
    ));

    assert_eq!(provider.calls(), 0);
    assert_eq!(h.store.writes.load(Ordering::SeqCst), 0);
    assert_eq!(h.records.message_count(), 0);
}

#[tokio::test]
async fn test_unknown_persona_has_no_side_effects() {
    let provider = Arc::new(ScriptedProvider::new(vec!["ok"], Tail::End));
    let h = harness(provider.clone(), RateLimitConfig::default(), ChatConfig::default());

    let request = ChatRequest::new("nobody", "hello")
        .with_identity(Identity::new("u1", "Grace"))
        .with_origin("/api/chat/nobody");

    assert!(matches!(
        h.orchestrator.chat(request).await,
        Err(ChatError::NotFound { persona_id }) if persona_id == "nobody"
    ));
    assert_eq!(provider.calls(), 0);
    assert_eq!(h.store.writes.load(Ordering::SeqCst), 0);
    assert_eq!(h.records.message_count(), 0);
}

#[tokio::test]
async fn test_retrieval_failure_degrades_to_no_excerpts() {
    let provider = Arc::new(ScriptedProvider::new(vec!["still here"], Tail::End));
    let store = Arc::new(InMemoryScoredSetStore::new());
    let records = Arc::new(InMemoryConversationRecords::new());
    records.insert_persona(Persona::new(PERSONA_ID, "Ada", "You are Ada.", ""));

    let orchestrator = ChatOrchestrator::new(
        HistoryStore::new(store),
        RetrievalClient::new(Arc::new(BrokenEmbedder), Arc::new(InMemoryVectorIndex::new())),
        Arc::new(FixedWindowLimiter::default()),
        records,
        provider.clone(),
        ChatConfig::default(),
    );

    let (text, outcome) = orchestrator.chat(request("hello")).await.unwrap().collect().await;

    assert_eq!(text, "still here");
    assert!(outcome.is_persisted());
    assert!(provider.prompts.lock()[0]
        .contains("the conversation you are in.\n\n\n\nUser: hello\nAda:"));
}

#[tokio::test]
async fn test_caller_disconnect_skips_persistence() {
    let provider = Arc::new(ScriptedProvider::new(vec!["partial"], Tail::Hang));
    let h = harness(provider, RateLimitConfig::default(), ChatConfig::default());

    let reply = h.orchestrator.chat(request("hello")).await.unwrap();
    let (mut chunks, outcome) = reply.into_parts();

    assert_eq!(chunks.next().await.as_deref(), Some("partial"));
    drop(chunks);

    assert_eq!(outcome.wait().await, TurnOutcome::Cancelled);
    assert_eq!(h.lines("u1").await, vec!["A", "B", "User: hello"]);

    let roles: Vec<MessageRole> = h
        .records
        .messages(PERSONA_ID, "u1")
        .await
        .unwrap()
        .iter()
        .map(|m| m.role)
        .collect();
    assert_eq!(roles, vec![MessageRole::User]);
}

#[tokio::test]
async fn test_upstream_error_mid_stream_skips_persistence() {
    let provider = Arc::new(ScriptedProvider::new(vec!["Hel"], Tail::Fail));
    let h = harness(provider, RateLimitConfig::default(), ChatConfig::default());

    let (text, outcome) = h.orchestrator.chat(request("hello")).await.unwrap().collect().await;

    assert_eq!(text, "Hel");
    assert!(matches!(outcome, TurnOutcome::Failed { .. }));
    assert_eq!(h.lines("u1").await, vec!["A", "B", "User: hello"]);
}

#[tokio::test(start_paused = true)]
async fn test_deadline_ends_turn_without_persistence() {
    let provider = Arc::new(ScriptedProvider::new(vec!["slow"], Tail::Hang));
    let h = harness(
        provider,
        RateLimitConfig::default(),
        ChatConfig::default().with_completion_timeout(Duration::from_secs(5)),
    );

    let (text, outcome) = h.orchestrator.chat(request("hello")).await.unwrap().collect().await;

    assert_eq!(text, "slow");
    assert_eq!(outcome, TurnOutcome::TimedOut);
    assert_eq!(h.lines("u1").await, vec!["A", "B", "User: hello"]);
}

#[tokio::test]
async fn test_upstream_refusal_fails_before_streaming() {
    let h = harness(
        Arc::new(UnavailableProvider),
        RateLimitConfig::default(),
        ChatConfig::default(),
    );

    let result = h.orchestrator.chat(request("hello")).await;

    assert!(matches!(result, Err(ChatError::UpstreamModelFailure { .. })));
    assert_eq!(h.lines("u1").await, vec!["A", "B", "User: hello"]);
}

#[tokio::test]
async fn test_users_do_not_share_history() {
    let provider = Arc::new(ScriptedProvider::new(vec!["ok"], Tail::End));
    let h = harness(provider, RateLimitConfig::default(), ChatConfig::default());

    h.orchestrator.chat(request("from grace")).await.unwrap().collect().await;

    let alan = ChatRequest::new(PERSONA_ID, "from alan")
        .with_identity(Identity::new("u2", "Alan"))
        .with_origin("/api/chat/p1");
    h.orchestrator.chat(alan).await.unwrap().collect().await;

    assert_eq!(h.lines("u1").await, vec!["A", "B", "User: from grace", "ok"]);
    assert_eq!(h.lines("u2").await, vec!["A", "B", "User: from alan", "ok"]);
}

#[tokio::test]
async fn test_reply_is_in_history_before_stream_ends() {
    let provider = Arc::new(ScriptedProvider::new(vec!["answer"], Tail::End));
    let history = HistoryStore::new(Arc::new(SlowReplyStore::default()));
    let records = Arc::new(InMemoryConversationRecords::new());
    records.insert_persona(Persona::new(PERSONA_ID, "Ada", "You are Ada.", "A\n\nB"));

    let orchestrator = ChatOrchestrator::new(
        history.clone(),
        RetrievalClient::new(
            Arc::new(HashEmbeddingProvider::new(8)),
            Arc::new(InMemoryVectorIndex::new()),
        ),
        Arc::new(FixedWindowLimiter::default()),
        records.clone(),
        provider,
        ChatConfig::default(),
    );

    let (chunks, _outcome) = orchestrator.chat(request("one")).await.unwrap().into_parts();
    let streamed: Vec<String> = chunks.collect().await;
    assert_eq!(streamed, vec!["answer"]);

    let key = ConversationKey::new(PERSONA_ID, "u1", &orchestrator.config().model_id).unwrap();
    let lines: Vec<String> = history
        .read_recent_entries(&key, 100)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.text)
        .collect();
    assert_eq!(lines, vec!["A", "B", "User: one", "answer"]);

    orchestrator.chat(request("two")).await.unwrap().collect().await;
    let lines: Vec<String> = history
        .read_recent_entries(&key, 100)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.text)
        .collect();
    assert_eq!(lines, vec!["A", "B", "User: one", "answer", "User: two", "answer"]);

    let roles: Vec<MessageRole> = records
        .messages(PERSONA_ID, "u1")
        .await
        .unwrap()
        .iter()
        .map(|m| m.role)
        .collect();
    assert_eq!(
        roles,
        vec![MessageRole::User, MessageRole::System, MessageRole::User, MessageRole::System]
    );
}
