//! Conversation sessions
//!
//! A session owns one conversation history. The registry hands each session
//! out behind its own mutex, so questions within a session are answered one
//! at a time while different sessions proceed concurrently.

use crate::errors::{AppError, Result};
use crate::metrics;
use crate::models::ConversationHistory;
use crate::rag::{RagReply, RagResponder};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub id: Uuid,
    pub history: ConversationHistory,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
}

impl Session {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            history: ConversationHistory::new(),
            created_at: now,
            last_active_at: now,
        }
    }

    /// Ask a question; history is replaced only when the answer succeeds.
    pub async fn ask(&mut self, responder: &RagResponder, question: &str) -> Result<RagReply> {
        self.last_active_at = Utc::now();
        let reply = responder.respond(question, &self.history).await?;
        self.history = reply.history.clone();
        Ok(reply)
    }

    pub fn is_expired(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        now - self.last_active_at > ttl
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

pub struct SessionRegistry {
    responder: Arc<RagResponder>,
    sessions: RwLock<HashMap<Uuid, Arc<Mutex<Session>>>>,
    ttl: Duration,
}

impl SessionRegistry {
    pub fn new(responder: Arc<RagResponder>, ttl: Duration) -> Self {
        Self {
            responder,
            sessions: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Start a new conversation
    pub async fn create(&self) -> Session {
        let session = Session::new();
        let snapshot = session.clone();

        let mut sessions = self.sessions.write().await;
        sessions.insert(session.id, Arc::new(Mutex::new(session)));
        metrics::record_sessions(sessions.len());

        info!(session_id = %snapshot.id, "Session created");
        snapshot
    }

    /// Snapshot of a live session
    pub async fn get(&self, id: Uuid) -> Result<Session> {
        let handle = self.handle(id).await?;
        let session = handle.lock().await;
        if session.is_expired(self.ttl, Utc::now()) {
            drop(session);
            self.evict(id).await;
            return Err(not_found(id));
        }
        Ok(session.clone())
    }

    pub async fn history(&self, id: Uuid) -> Result<ConversationHistory> {
        Ok(self.get(id).await?.history)
    }

    /// Answer a question within a session.
    ///
    /// Holds the session lock for the whole exchange.
    pub async fn ask(&self, id: Uuid, question: &str) -> Result<RagReply> {
        let handle = self.handle(id).await?;
        let mut session = handle.lock().await;
        if session.is_expired(self.ttl, Utc::now()) {
            drop(session);
            self.evict(id).await;
            return Err(not_found(id));
        }
        session.ask(&self.responder, question).await
    }

    pub async fn remove(&self, id: Uuid) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        match sessions.remove(&id) {
            Some(_) => {
                metrics::record_sessions(sessions.len());
                info!(session_id = %id, "Session removed");
                Ok(())
            }
            None => Err(not_found(id)),
        }
    }

    /// Drop sessions idle longer than the TTL. Returns how many were dropped.
    ///
    /// Sessions busy answering are skipped.
    pub async fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();

        sessions.retain(|_, handle| match handle.try_lock() {
            Ok(session) => !session.is_expired(self.ttl, now),
            Err(_) => true,
        });

        let purged = before - sessions.len();
        metrics::record_sessions(sessions.len());
        if purged > 0 {
            info!(purged = purged, remaining = sessions.len(), "Purged expired sessions");
        }
        purged
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    async fn handle(&self, id: Uuid) -> Result<Arc<Mutex<Session>>> {
        self.sessions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found(id))
    }

    async fn evict(&self, id: Uuid) {
        let mut sessions = self.sessions.write().await;
        sessions.remove(&id);
        metrics::record_sessions(sessions.len());
        debug!(session_id = %id, "Evicted expired session");
    }
}

fn not_found(id: Uuid) -> AppError {
    AppError::SessionNotFound { id: id.to_string() }
}
