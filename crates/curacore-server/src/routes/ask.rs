//! Corpus question answering and raw search.

use axum::{
    Json,
    extract::{Query, State},
};
use curacore_triage::{GroundedAnswer, RetrievedChunk};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ServerError};
use crate::state::AppState;

/// Upper bound on `k` for raw searches.
const MAX_SEARCH_K: usize = 50;

#[derive(Debug, Clone, Deserialize)]
pub struct AskRequest {
    pub question: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchParams {
    pub q: String,
    pub k: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<RetrievedChunk>,
}

/// POST /api/v1/ask
pub async fn ask_handler(
    State(state): State<AppState>,
    Json(request): Json<AskRequest>,
) -> Result<Json<GroundedAnswer>> {
    Ok(Json(state.answerer.answer(&request.question).await?))
}

/// GET /api/v1/search?q=&k=
pub async fn search_handler(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>> {
    let query = params.q.trim();
    if query.is_empty() {
        return Err(ServerError::Validation("q must not be empty".to_string()));
    }
    let k = params.k.unwrap_or_else(|| state.retriever.k());
    if k == 0 || k > MAX_SEARCH_K {
        return Err(ServerError::Validation(format!(
            "k must be between 1 and {}",
            MAX_SEARCH_K
        )));
    }

    let results = state.retriever.search(query, k).await?;
    Ok(Json(SearchResponse {
        query: query.to_string(),
        results,
    }))
}
