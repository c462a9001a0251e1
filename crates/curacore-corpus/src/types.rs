//! Core types for the corpus index.

use std::path::Path;

/// A chunk ready to be written: text, provenance and its embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedChunk {
    /// Deterministic id, see [`chunk_id`].
    pub id: String,
    /// Originating document name.
    pub source: String,
    /// Position of the chunk within its document.
    pub index: usize,
    pub text: String,
    pub embedding: Vec<f32>,
}

impl IndexedChunk {
    pub fn new(source: impl Into<String>, index: usize, text: impl Into<String>, embedding: Vec<f32>) -> Self {
        let source = source.into();
        Self {
            id: chunk_id(&source, index),
            source,
            index,
            text: text.into(),
            embedding,
        }
    }
}

/// A chunk returned by a nearest-neighbour query.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexHit {
    pub id: String,
    pub source: String,
    pub text: String,
    /// L2 distance from the query vector (lower = more relevant).
    pub distance: f32,
}

/// Stable chunk id: `{source}_{index}`.
///
/// Re-ingesting the same document yields the same ids, so upserts overwrite
/// rather than duplicate.
pub fn chunk_id(source: &str, index: usize) -> String {
    format!("{}_{}", source, index)
}

/// Document identifier used as chunk provenance: the file name without directories.
pub fn source_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
