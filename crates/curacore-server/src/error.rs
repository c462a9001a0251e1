//! Error types for the server.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use curacore_triage::TriageError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Triage(#[from] TriageError),
}

/// Result type for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;

/// Error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

impl ServerError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ServerError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            ServerError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            ServerError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
            ServerError::Triage(e) => {
                let status = match e {
                    TriageError::Validation(_) => StatusCode::BAD_REQUEST,
                    TriageError::RetrievalUnavailable(_) | TriageError::Invoke(_) => {
                        StatusCode::SERVICE_UNAVAILABLE
                    }
                    TriageError::Parse { .. } => StatusCode::BAD_GATEWAY,
                    TriageError::Embedding(_) | TriageError::Corpus(_) | TriageError::Io(_) => {
                        StatusCode::INTERNAL_SERVER_ERROR
                    }
                };
                (status, e.code())
            }
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let message = self.to_string();

        if status.is_server_error() {
            tracing::error!(status = %status, code, error = %message, "Server error");
        } else {
            tracing::warn!(status = %status, code, error = %message, "Client error");
        }

        let body = ErrorResponse {
            code: code.to_string(),
            message,
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (ServerError::NotFound("x".into()), StatusCode::NOT_FOUND, "not_found"),
            (
                ServerError::Triage(TriageError::validation("blank id")),
                StatusCode::BAD_REQUEST,
                "validation_error",
            ),
            (
                ServerError::Triage(TriageError::retrieval("no index")),
                StatusCode::SERVICE_UNAVAILABLE,
                "retrieval_unavailable",
            ),
            (
                ServerError::Triage(TriageError::parse("no json", "raw")),
                StatusCode::BAD_GATEWAY,
                "parse_error",
            ),
        ];
        for (error, status, code) in cases {
            assert_eq!(error.status_and_code(), (status, code));
        }
    }

    #[tokio::test]
    async fn test_error_body() {
        let response = ServerError::Validation("k must be at least 1".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let error: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(error.code, "validation_error");
        assert!(error.message.contains("k must be at least 1"));
    }
}
