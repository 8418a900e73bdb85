//! Responder and session behaviour against in-process backends

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tripwise_common::errors::{AppError, Result};
use tripwise_common::llm::EchoChatCompleter;
use tripwise_common::models::{ChatMessage, ConversationHistory, Document, Role};
use tripwise_common::rag::{RelevanceDecision, SYSTEM_PROMPT};
use tripwise_common::vectorstore::{DistanceMetric, InMemoryVectorStore, VectorStore};
use tripwise_common::{ChatCompleter, Embedder, RagResponder, SessionRegistry};

/// Returns a fixed vector for every text
struct FixedEmbedder {
    vector: Vec<f32>,
    calls: AtomicUsize,
}

impl FixedEmbedder {
    fn new(vector: Vec<f32>) -> Arc<Self> {
        Arc::new(Self {
            vector,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Embedder for FixedEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.vector.clone())
    }

    fn model_name(&self) -> &str {
        "fixed"
    }

    fn dimension(&self) -> usize {
        self.vector.len()
    }
}

struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(AppError::EmbeddingService {
            message: "service unavailable".to_string(),
        })
    }

    fn model_name(&self) -> &str {
        "failing"
    }

    fn dimension(&self) -> usize {
        2
    }
}

/// Records the prompts it receives and answers with a canned reply
struct RecordingCompleter {
    reply: String,
    prompts: Mutex<Vec<Vec<ChatMessage>>>,
    max_tokens: Mutex<Vec<u32>>,
}

impl RecordingCompleter {
    fn new(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.to_string(),
            prompts: Mutex::new(Vec::new()),
            max_tokens: Mutex::new(Vec::new()),
        })
    }

    fn last_prompt(&self) -> Vec<ChatMessage> {
        self.prompts.lock().unwrap().last().cloned().unwrap()
    }
}

#[async_trait]
impl ChatCompleter for RecordingCompleter {
    async fn complete(&self, messages: &[ChatMessage], max_tokens: u32) -> Result<String> {
        self.prompts.lock().unwrap().push(messages.to_vec());
        self.max_tokens.lock().unwrap().push(max_tokens);
        Ok(self.reply.clone())
    }

    fn model_name(&self) -> &str {
        "recording"
    }
}

/// Holds each completion open for a while and tracks overlapping calls
struct SlowCompleter {
    delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    prompts: Mutex<Vec<Vec<ChatMessage>>>,
}

impl SlowCompleter {
    fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl ChatCompleter for SlowCompleter {
    async fn complete(&self, messages: &[ChatMessage], _max_tokens: u32) -> Result<String> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let answer = {
            let mut prompts = self.prompts.lock().unwrap();
            prompts.push(messages.to_vec());
            format!("answer {}", prompts.len())
        };

        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(answer)
    }

    fn model_name(&self) -> &str {
        "slow"
    }
}

struct FailingCompleter;

#[async_trait]
impl ChatCompleter for FailingCompleter {
    async fn complete(&self, _messages: &[ChatMessage], _max_tokens: u32) -> Result<String> {
        Err(AppError::ChatCompletion {
            message: "upstream returned 503".to_string(),
        })
    }

    fn model_name(&self) -> &str {
        "failing"
    }
}

/// Never answers within the responder's store timeout
struct StalledStore;

#[async_trait]
impl VectorStore for StalledStore {
    async fn ensure_collection(&self) -> Result<()> {
        Ok(())
    }

    async fn upsert(&self, _document: &Document) -> Result<()> {
        Ok(())
    }

    async fn query(&self, _embedding: &[f32], _k: usize) -> Result<tripwise_common::RetrievalResult> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(tripwise_common::RetrievalResult::empty())
    }

    async fn count(&self) -> Result<usize> {
        Ok(0)
    }

    fn collection(&self) -> &str {
        "stalled"
    }

    fn metric(&self) -> DistanceMetric {
        DistanceMetric::Cosine
    }
}

fn empty_store() -> Arc<InMemoryVectorStore> {
    Arc::new(InMemoryVectorStore::new("test", DistanceMetric::Cosine, 2))
}

/// Question vector at cosine distance ~0.3 from [1, 0]
fn faq_question_vector() -> Vec<f32> {
    vec![0.7, 0.71414]
}

#[tokio::test]
async fn empty_store_answers_without_context() {
    let completer = RecordingCompleter::new("Have a safe trip.");
    let responder = RagResponder::new(FixedEmbedder::new(vec![1.0, 0.0]), empty_store(), completer.clone());

    let reply = responder
        .respond("Is it safe to travel?", &ConversationHistory::new())
        .await
        .unwrap();

    assert_eq!(reply.answer, "Have a safe trip.");
    assert_eq!(reply.decision, RelevanceDecision::NoContext { nearest_distance: None });
    assert!(reply.sources.is_empty());

    let prompt = completer.last_prompt();
    assert_eq!(prompt.len(), 2);
    assert_eq!(prompt[0].role, Role::System);
    assert_eq!(prompt[0].content, SYSTEM_PROMPT);
    assert_eq!(prompt[1].content, "Context: \n\nQuestion: Is it safe to travel?");
    assert_eq!(*completer.max_tokens.lock().unwrap(), vec![150]);
}

#[tokio::test]
async fn relevant_document_reaches_the_prompt() {
    let store = empty_store();
    store
        .upsert(&Document::new("faq1.pdf", "Carry your passport.", vec![1.0, 0.0]))
        .await
        .unwrap();

    let responder = RagResponder::new(
        FixedEmbedder::new(faq_question_vector()),
        store,
        Arc::new(EchoChatCompleter),
    );

    let reply = responder
        .respond("What should I carry?", &ConversationHistory::new())
        .await
        .unwrap();

    assert!(reply.decision.uses_context());
    let distance = reply.decision.nearest_distance().unwrap();
    assert!((distance - 0.3).abs() < 0.01);
    assert!(reply.answer.contains("Carry your passport."));
    assert_eq!(reply.sources.len(), 1);
    assert_eq!(reply.sources[0].id, "faq1.pdf");
}

#[tokio::test]
async fn all_neighbours_joined_when_nearest_passes() {
    let store = empty_store();
    store.upsert(&Document::new("a", "Alpha.", vec![1.0, 0.0])).await.unwrap();
    store.upsert(&Document::new("b", "Beta.", vec![0.0, 1.0])).await.unwrap();
    store.upsert(&Document::new("c", "Gamma.", vec![-1.0, 0.0])).await.unwrap();

    let completer = RecordingCompleter::new("ok");
    let responder = RagResponder::new(FixedEmbedder::new(vec![1.0, 0.0]), store, completer.clone());

    responder.respond("q", &ConversationHistory::new()).await.unwrap();

    // Far neighbours are not filtered out individually
    let prompt = completer.last_prompt();
    assert_eq!(prompt[1].content, "Context: Alpha. Beta. Gamma.\n\nQuestion: q");
}

#[tokio::test]
async fn distant_neighbour_is_gated_out() {
    let store = empty_store();
    store.upsert(&Document::new("far", "Unrelated.", vec![-1.0, 0.0])).await.unwrap();

    let completer = RecordingCompleter::new("ok");
    let responder = RagResponder::new(FixedEmbedder::new(vec![1.0, 0.0]), store, completer.clone());

    let reply = responder.respond("q", &ConversationHistory::new()).await.unwrap();

    assert!(!reply.decision.uses_context());
    assert!(completer.last_prompt()[1].content.starts_with("Context: \n\n"));
}

#[tokio::test]
async fn history_grows_by_two_per_question() {
    let completer = RecordingCompleter::new("answer");
    let responder = RagResponder::new(FixedEmbedder::new(vec![1.0, 0.0]), empty_store(), completer.clone());

    let mut history = ConversationHistory::new();
    for n in 1..=3 {
        let reply = responder.respond(&format!("question {}", n), &history).await.unwrap();
        history = reply.history;
        assert_eq!(history.len(), 2 * n);
    }

    let roles: Vec<Role> = history.iter().map(|t| t.role).collect();
    assert_eq!(
        roles,
        vec![Role::User, Role::Assistant, Role::User, Role::Assistant, Role::User, Role::Assistant]
    );

    // Prior turns follow the context+question message in order
    let prompt = completer.last_prompt();
    assert_eq!(prompt.len(), 2 + 4);
    assert_eq!(prompt[2].content, "question 1");
    assert_eq!(prompt[3].content, "answer");
    assert_eq!(prompt[4].content, "question 2");
}

#[tokio::test]
async fn chat_failure_propagates() {
    let responder = RagResponder::new(
        FixedEmbedder::new(vec![1.0, 0.0]),
        empty_store(),
        Arc::new(FailingCompleter),
    );

    let history = ConversationHistory::new();
    let err = responder.respond("q", &history).await.unwrap_err();

    assert!(matches!(err, AppError::ChatCompletion { .. }));
    assert!(history.is_empty());
}

#[tokio::test]
async fn embedding_failure_skips_completion() {
    let completer = RecordingCompleter::new("unused");
    let responder = RagResponder::new(Arc::new(FailingEmbedder), empty_store(), completer.clone());

    let err = responder
        .respond("q", &ConversationHistory::new())
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::EmbeddingService { .. }));
    assert!(completer.prompts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn store_timeout_maps_to_vector_store_error() {
    let responder = RagResponder::new(
        FixedEmbedder::new(vec![1.0, 0.0]),
        Arc::new(StalledStore),
        RecordingCompleter::new("unused"),
    )
    .with_store_timeout(Duration::from_millis(20));

    let err = responder
        .respond("q", &ConversationHistory::new())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::VectorStore { .. }));
}

#[tokio::test]
async fn session_history_unchanged_after_failure() {
    let responder = Arc::new(RagResponder::new(
        FixedEmbedder::new(vec![1.0, 0.0]),
        empty_store(),
        Arc::new(FailingCompleter),
    ));
    let registry = SessionRegistry::new(responder, chrono::Duration::minutes(30));

    let session = registry.create().await;
    assert!(registry.ask(session.id, "q").await.is_err());
    assert!(registry.history(session.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn registry_tracks_sessions_independently() {
    let responder = Arc::new(RagResponder::new(
        FixedEmbedder::new(vec![1.0, 0.0]),
        empty_store(),
        RecordingCompleter::new("fine"),
    ));
    let registry = SessionRegistry::new(responder, chrono::Duration::minutes(30));

    let first = registry.create().await;
    let second = registry.create().await;

    registry.ask(first.id, "one").await.unwrap();
    registry.ask(first.id, "two").await.unwrap();
    registry.ask(second.id, "three").await.unwrap();

    assert_eq!(registry.history(first.id).await.unwrap().len(), 4);
    assert_eq!(registry.history(second.id).await.unwrap().len(), 2);

    registry.remove(first.id).await.unwrap();
    let err = registry.get(first.id).await.unwrap_err();
    assert!(matches!(err, AppError::SessionNotFound { .. }));
    assert!(registry.remove(first.id).await.is_err());
}

#[tokio::test]
async fn expired_sessions_are_purged() {
    let responder = Arc::new(RagResponder::new(
        FixedEmbedder::new(vec![1.0, 0.0]),
        empty_store(),
        RecordingCompleter::new("fine"),
    ));
    let registry = SessionRegistry::new(responder, chrono::Duration::zero());

    let session = registry.create().await;
    tokio::time::sleep(Duration::from_millis(5)).await;

    assert_eq!(registry.purge_expired().await, 1);
    assert!(registry.is_empty().await);
    assert!(matches!(
        registry.ask(session.id, "late").await.unwrap_err(),
        AppError::SessionNotFound { .. }
    ));
}

#[tokio::test]
async fn expired_session_not_found_on_access() {
    let responder = Arc::new(RagResponder::new(
        FixedEmbedder::new(vec![1.0, 0.0]),
        empty_store(),
        RecordingCompleter::new("fine"),
    ));
    let registry = SessionRegistry::new(responder, chrono::Duration::zero());

    let session = registry.create().await;
    tokio::time::sleep(Duration::from_millis(5)).await;

    assert!(registry.get(session.id).await.is_err());
    assert_eq!(registry.len().await, 0);
}

#[tokio::test]
async fn same_session_questions_are_serialized() {
    let completer = SlowCompleter::new(Duration::from_millis(50));
    let responder = Arc::new(RagResponder::new(
        FixedEmbedder::new(vec![1.0, 0.0]),
        empty_store(),
        completer.clone(),
    ));
    let registry = SessionRegistry::new(responder, chrono::Duration::minutes(30));
    let session = registry.create().await;

    let (first, second) = tokio::join!(
        registry.ask(session.id, "Do I need a visa?"),
        registry.ask(session.id, "How long is it valid?"),
    );
    first.unwrap();
    second.unwrap();

    assert_eq!(completer.max_in_flight.load(Ordering::SeqCst), 1);
    assert_eq!(registry.history(session.id).await.unwrap().len(), 4);

    let prompts = completer.prompts.lock().unwrap();
    assert_eq!(prompts.len(), 2);
    // system, current question, then the first exchange
    assert_eq!(prompts[1].len(), prompts[0].len() + 2);
    assert_eq!(prompts[1][2].role, Role::User);
    assert!(prompts[0][1].content.ends_with(&prompts[1][2].content));
    assert_eq!(prompts[1][3].role, Role::Assistant);
    assert_eq!(prompts[1][3].content, "answer 1");
}
