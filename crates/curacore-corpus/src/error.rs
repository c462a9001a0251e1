//! Error types for the corpus crate.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while storing, querying or extracting corpus text.
#[derive(Debug, Error)]
pub enum CorpusError {
    /// Database connection or operation failed.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The collection was indexed with a different embedding model.
    #[error(
        "Collection '{collection}' was indexed with {stored_embedder} ({stored_dims} dims) \
         but {requested_embedder} ({requested_dims} dims) was requested; re-ingest into a new collection"
    )]
    EmbeddingMismatch {
        collection: String,
        stored_embedder: String,
        stored_dims: usize,
        requested_embedder: String,
        requested_dims: usize,
    },

    /// A vector does not have the collection's dimensionality.
    #[error("Vector has {actual} dimensions, collection expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Collection names become table names, so they are restricted.
    #[error("Invalid collection name '{0}': use ASCII letters, digits and '_'")]
    InvalidCollection(String),

    /// Chunker settings are inconsistent.
    #[error("Invalid chunker configuration: {0}")]
    InvalidChunker(String),

    /// A document could not be read at all.
    #[error("Failed to extract text from {path}: {message}")]
    Extraction { path: PathBuf, message: String },

    /// No extractor for this file type.
    #[error("Unsupported document format: {0}")]
    UnsupportedFormat(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for corpus operations.
pub type Result<T> = std::result::Result<T, CorpusError>;
