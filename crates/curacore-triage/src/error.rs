//! Error types for the triage core.

use curacore_corpus::CorpusError;
use curacore_llm::LlmError;
use thiserror::Error;

/// Result type alias using the triage error type.
pub type Result<T> = std::result::Result<T, TriageError>;

/// Failures of the triage pipeline.
///
/// None of these reach a patient as-is: the engine turns each into an
/// advisory message recommending in-person care.
#[derive(Debug, Error)]
pub enum TriageError {
    /// Malformed caller input (e.g. a blank session id).
    #[error("Validation error: {0}")]
    Validation(String),

    /// The corpus could not be searched; reasoning proceeds ungrounded.
    #[error("Retrieval unavailable: {0}")]
    RetrievalUnavailable(String),

    /// The generation model failed or timed out.
    #[error("Reasoning model unavailable: {0}")]
    Invoke(#[from] LlmError),

    /// The generation model answered, but not in the expected structure.
    #[error("Unparseable model output: {reason}")]
    Parse { reason: String, raw: String },

    /// The embedding function failed during ingestion.
    #[error("Embedding failed: {0}")]
    Embedding(String),

    #[error("Corpus error: {0}")]
    Corpus(#[from] CorpusError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TriageError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn retrieval(msg: impl Into<String>) -> Self {
        Self::RetrievalUnavailable(msg.into())
    }

    pub fn parse(reason: impl Into<String>, raw: impl Into<String>) -> Self {
        Self::Parse {
            reason: reason.into(),
            raw: raw.into(),
        }
    }

    /// Stable machine-readable code, used in API error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::RetrievalUnavailable(_) => "retrieval_unavailable",
            Self::Invoke(_) => "invoke_error",
            Self::Parse { .. } => "parse_error",
            Self::Embedding(_) => "embedding_error",
            Self::Corpus(_) => "corpus_error",
            Self::Io(_) => "io_error",
        }
    }
}
