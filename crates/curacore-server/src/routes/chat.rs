//! Triage conversation endpoints.

use axum::{
    Json,
    extract::{Path, State},
};
use curacore_triage::TriageStep;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ServerError};
use crate::state::AppState;

// ─────────────────────────────────────────────────────────────────────────────
// Request/Response Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub session_id: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
    pub current_step: TriageStep,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetResponse {
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryResponse {
    pub session_id: String,
    pub current_step: TriageStep,
    pub summary: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/chat
pub async fn chat_handler(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>> {
    let reply = state
        .sessions
        .process(&request.session_id, &request.message)
        .await?;
    Ok(Json(ChatResponse {
        response: reply.response_text,
        current_step: reply.step,
    }))
}

/// POST /api/v1/sessions/{id}/reset
pub async fn reset_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ResetResponse>> {
    state.sessions.reset(&id).await?;
    Ok(Json(ResetResponse {
        status: "ok".to_string(),
    }))
}

/// GET /api/v1/sessions/{id}/summary
pub async fn summary_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SummaryResponse>> {
    let session = state
        .sessions
        .snapshot(&id)
        .await
        .ok_or_else(|| ServerError::NotFound(format!("session '{}'", id)))?;

    let summary = state.summarizer.summarize(&session).await;
    Ok(Json(SummaryResponse {
        session_id: session.id().to_string(),
        current_step: session.step(),
        summary,
    }))
}
