//! Retrieval-augmented responder
//!
//! One question in, one answer out:
//! 1. Embed the question
//! 2. Fetch the k nearest documents
//! 3. Gate the retrieved text on the nearest distance
//! 4. Ask the chat model with system prompt, context+question and prior turns
//! 5. Return the answer with a history extended by the new exchange

mod gate;
mod prompt;

pub use gate::{
    GatePolicy, RelevanceDecision, RelevanceGate, DEFAULT_RELEVANCE_THRESHOLD, GATE_ON_NEAREST_ONLY,
};
pub use prompt::{build_prompt, CONTEXT_SEPARATOR, SYSTEM_PROMPT};

use crate::config::AppConfig;
use crate::embeddings::Embedder;
use crate::errors::{AppError, Result};
use crate::llm::ChatCompleter;
use crate::metrics;
use crate::models::{ConversationHistory, ConversationTurn, Query, RetrievedDocument};
use crate::vectorstore::VectorStore;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Default number of neighbours per question
pub const DEFAULT_TOP_K: usize = 3;

/// Default response length cap
pub const DEFAULT_MAX_TOKENS: u32 = 150;

/// Answer plus the extended history and what retrieval decided
#[derive(Debug, Clone, Serialize)]
pub struct RagReply {
    pub answer: String,
    pub history: ConversationHistory,
    pub decision: RelevanceDecision,
    pub sources: Vec<RetrievedDocument>,
}

pub struct RagResponder {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    completer: Arc<dyn ChatCompleter>,
    gate: RelevanceGate,
    top_k: usize,
    max_tokens: u32,
    store_timeout: Duration,
}

impl RagResponder {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        completer: Arc<dyn ChatCompleter>,
    ) -> Self {
        Self {
            embedder,
            store,
            completer,
            gate: RelevanceGate::default(),
            top_k: DEFAULT_TOP_K,
            max_tokens: DEFAULT_MAX_TOKENS,
            store_timeout: Duration::from_secs(10),
        }
    }

    /// Responder with retrieval settings taken from configuration
    pub fn from_config(
        config: &AppConfig,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        completer: Arc<dyn ChatCompleter>,
    ) -> Self {
        Self::new(embedder, store, completer)
            .with_gate(RelevanceGate::new(config.retrieval.relevance_threshold))
            .with_top_k(config.retrieval.top_k)
            .with_max_tokens(config.retrieval.max_tokens)
            .with_store_timeout(config.store_timeout())
    }

    pub fn with_gate(mut self, gate: RelevanceGate) -> Self {
        self.gate = gate;
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    /// Answer `question` in the context of `history`.
    ///
    /// The caller's history is never touched; on success the reply carries a
    /// copy extended by the user question and the assistant answer. Any
    /// failure propagates and no turn is recorded.
    #[instrument(skip(self, history), fields(history_len = history.len()))]
    pub async fn respond(&self, question: &str, history: &ConversationHistory) -> Result<RagReply> {
        let query = Query {
            text: question.to_string(),
            embedding: self.embedder.embed(question).await?,
            k: self.top_k,
        };

        let result = tokio::time::timeout(self.store_timeout, self.store.query(&query.embedding, query.k))
            .await
            .map_err(|_| {
                AppError::vector_store(format!(
                    "query timed out after {}s",
                    self.store_timeout.as_secs()
                ))
            })??;

        let decision = self.gate.decide(&result);
        metrics::record_retrieval(decision.nearest_distance(), decision.uses_context());

        let context = if decision.uses_context() {
            result.joined_text(CONTEXT_SEPARATOR)
        } else {
            String::new()
        };

        debug!(
            retrieved = result.len(),
            nearest_distance = ?decision.nearest_distance(),
            context_used = decision.uses_context(),
            "Relevance gate applied"
        );

        let messages = build_prompt(&context, &query.text, history);
        let answer = self.completer.complete(&messages, self.max_tokens).await?;

        let mut history = history.clone();
        history.push(ConversationTurn::user(query.text));
        history.push(ConversationTurn::assistant(answer.clone()));

        info!(
            context_used = decision.uses_context(),
            history_len = history.len(),
            "Answered question"
        );

        Ok(RagReply {
            answer,
            history,
            decision,
            sources: result.into_documents(),
        })
    }
}
