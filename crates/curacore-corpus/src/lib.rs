//! Reference corpus for CuraCore.
//!
//! - [`CorpusIndex`]: chunk text plus embeddings in SQLite, searched with sqlite-vec
//! - [`RecursiveChunker`]: boundary-aware overlapping chunking
//! - [`extract_document`]: per-section text extraction from PDF and plain text

pub mod chunker;
pub mod error;
pub mod extract;
pub mod index;
pub mod types;
mod vector;

pub use chunker::{ChunkerConfig, DEFAULT_SEPARATORS, RecursiveChunker};
pub use error::{CorpusError, Result};
pub use extract::{ExtractedDocument, SkippedSection, extract_document, is_supported};
pub use index::{CorpusIndex, CorpusStats};
pub use types::{IndexHit, IndexedChunk, chunk_id, source_name};
