//! Conversation session handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::AppState;
use tripwise_common::{errors::Result, models::ConversationTurn};

/// Create session response
#[derive(Serialize)]
pub struct CreateSessionResponse {
    pub session_id: Uuid,
    pub created_at: String,
    pub expires_in_minutes: i64,
}

/// Session state response
#[derive(Serialize)]
pub struct SessionResponse {
    pub session_id: Uuid,
    pub created_at: String,
    pub last_active_at: String,
    pub history: Vec<ConversationTurn>,
}

/// Ask request
#[derive(Debug, Deserialize, Validate)]
pub struct AskRequest {
    #[validate(length(min = 1, max = 4000), custom(function = "not_blank"))]
    pub question: String,
}

fn not_blank(value: &str) -> std::result::Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank"));
    }
    Ok(())
}

#[derive(Serialize)]
pub struct SourceResponse {
    pub id: String,
    pub distance: f32,
}

/// Ask response
#[derive(Serialize)]
pub struct AskResponse {
    pub answer: String,
    pub context_used: bool,
    pub nearest_distance: Option<f32>,
    pub sources: Vec<SourceResponse>,
    pub history_len: usize,
}

/// Create a new session
pub async fn create_session(State(state): State<AppState>) -> (StatusCode, Json<CreateSessionResponse>) {
    let session = state.sessions.create().await;

    (
        StatusCode::CREATED,
        Json(CreateSessionResponse {
            session_id: session.id,
            created_at: session.created_at.to_rfc3339(),
            expires_in_minutes: state.config.session.ttl_minutes,
        }),
    )
}

/// Get session state
pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<SessionResponse>> {
    let session = state.sessions.get(session_id).await?;

    Ok(Json(SessionResponse {
        session_id: session.id,
        created_at: session.created_at.to_rfc3339(),
        last_active_at: session.last_active_at.to_rfc3339(),
        history: session.history.turns().to_vec(),
    }))
}

/// End a session
pub async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<StatusCode> {
    state.sessions.remove(session_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Ask a question within a session
pub async fn ask(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(request): Json<AskRequest>,
) -> Result<Json<AskResponse>> {
    request.validate()?;

    let reply = state.sessions.ask(session_id, &request.question).await?;

    tracing::debug!(
        session_id = %session_id,
        context_used = reply.decision.uses_context(),
        "Question answered"
    );

    Ok(Json(AskResponse {
        answer: reply.answer,
        context_used: reply.decision.uses_context(),
        nearest_distance: reply.decision.nearest_distance(),
        sources: reply
            .sources
            .into_iter()
            .map(|s| SourceResponse {
                id: s.id,
                distance: s.distance,
            })
            .collect(),
        history_len: reply.history.len(),
    }))
}
