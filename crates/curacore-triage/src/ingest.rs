//! Reference document ingestion: extract, chunk, embed, upsert.
//!
//! Chunk ids are `{source}_{index}`, so re-ingesting a document overwrites
//! its chunks in place and trims any tail left over from a longer version.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use curacore_config::CorpusConfig;
use curacore_corpus::{
    ChunkerConfig, CorpusIndex, ExtractedDocument, IndexedChunk, RecursiveChunker, extract_document,
    is_supported,
};
use curacore_llm::SharedEmbedder;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{Result, TriageError};
use crate::retrieval::check_embedding_space;

/// Outcome of ingesting one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub source: String,
    pub chunks: usize,
    pub batches: usize,
    /// Pages or sections that yielded no text.
    pub skipped_sections: usize,
}

/// Outcome of ingesting a directory tree.
#[derive(Debug, Default)]
pub struct DirectoryReport {
    pub documents: Vec<IngestReport>,
    pub failures: Vec<(PathBuf, TriageError)>,
}

impl DirectoryReport {
    pub fn total_chunks(&self) -> usize {
        self.documents.iter().map(|d| d.chunks).sum()
    }
}

/// Progress of one document, reported after each committed batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestProgress {
    pub done: usize,
    pub total: usize,
}

pub struct CorpusIngestor {
    embedder: SharedEmbedder,
    index: Arc<CorpusIndex>,
    chunker: RecursiveChunker,
    batch_size: usize,
}

impl CorpusIngestor {
    /// The embedder must match the one recorded for the index.
    pub fn new(
        embedder: SharedEmbedder,
        index: Arc<CorpusIndex>,
        chunker: RecursiveChunker,
        batch_size: usize,
    ) -> Result<Self> {
        check_embedding_space(&embedder, &index)?;
        if batch_size == 0 {
            return Err(TriageError::validation("batch size must be at least 1"));
        }
        Ok(Self {
            embedder,
            index,
            chunker,
            batch_size,
        })
    }

    pub fn from_config(
        embedder: SharedEmbedder,
        index: Arc<CorpusIndex>,
        config: &CorpusConfig,
    ) -> Result<Self> {
        let chunker = ChunkerConfig::new(config.chunk_size, config.chunk_overlap)?;
        Self::new(embedder, index, RecursiveChunker::new(chunker), config.batch_size)
    }

    pub fn index(&self) -> &Arc<CorpusIndex> {
        &self.index
    }

    pub async fn ingest(&self, path: &Path) -> Result<IngestReport> {
        self.ingest_with_progress(path, |_| {}).await
    }

    /// Ingest one document, calling `progress` after every batch.
    pub async fn ingest_with_progress<F>(&self, path: &Path, progress: F) -> Result<IngestReport>
    where
        F: FnMut(IngestProgress),
    {
        let owned = path.to_path_buf();
        let document = tokio::task::spawn_blocking(move || extract_document(&owned))
            .await
            .map_err(|e| TriageError::Io(std::io::Error::other(e)))??;
        self.store_document(document, progress).await
    }

    /// Chunk the document's text as one stream so chunks may span pages.
    async fn store_document<F>(
        &self,
        document: ExtractedDocument,
        progress: F,
    ) -> Result<IngestReport>
    where
        F: FnMut(IngestProgress),
    {
        let chunks = self.chunker.split(&document.text());

        // Nothing readable came out, so whatever is indexed stays.
        if chunks.is_empty() && !document.skipped.is_empty() {
            warn!(
                source = %document.source,
                skipped = document.skipped.len(),
                "No readable sections, keeping indexed chunks"
            );
            return Ok(IngestReport {
                source: document.source,
                chunks: 0,
                batches: 0,
                skipped_sections: document.skipped.len(),
            });
        }

        let mut report = self.store_chunks(&document.source, chunks, progress).await?;
        report.skipped_sections = document.skipped.len();
        Ok(report)
    }

    /// Ingest raw text under the given source name.
    pub async fn ingest_text(&self, source: &str, text: &str) -> Result<IngestReport> {
        let chunks = self.chunker.split(text);
        self.store_chunks(source, chunks, |_| {}).await
    }

    /// Ingest every supported document under `dir`, recursively.
    ///
    /// A document that fails is recorded and the rest still go in.
    pub async fn ingest_dir(&self, dir: &Path) -> Result<DirectoryReport> {
        let files = supported_files(dir)?;
        info!(dir = %dir.display(), documents = files.len(), "Ingesting directory");

        let mut report = DirectoryReport::default();
        for file in files {
            match self.ingest(&file).await {
                Ok(doc) => report.documents.push(doc),
                Err(e) => {
                    warn!(path = %file.display(), error = %e, "Document ingestion failed");
                    report.failures.push((file, e));
                }
            }
        }
        Ok(report)
    }

    async fn store_chunks<F>(
        &self,
        source: &str,
        chunks: Vec<String>,
        mut progress: F,
    ) -> Result<IngestReport>
    where
        F: FnMut(IngestProgress),
    {
        let total = chunks.len();
        let mut batches = 0;

        for (batch_no, batch) in chunks.chunks(self.batch_size).enumerate() {
            let offset = batch_no * self.batch_size;
            let texts: Vec<&str> = batch.iter().map(String::as_str).collect();
            let embeddings = self
                .embedder
                .embed_batch(&texts)
                .await
                .map_err(|e| TriageError::Embedding(e.to_string()))?;
            if embeddings.len() != batch.len() {
                return Err(TriageError::Embedding(format!(
                    "expected {} embeddings, got {}",
                    batch.len(),
                    embeddings.len()
                )));
            }

            let rows: Vec<IndexedChunk> = batch
                .iter()
                .zip(embeddings)
                .enumerate()
                .map(|(i, (text, embedding))| {
                    IndexedChunk::new(source, offset + i, text.as_str(), embedding)
                })
                .collect();

            let index = Arc::clone(&self.index);
            let written = tokio::task::spawn_blocking(move || index.upsert(&rows))
                .await
                .map_err(|e| TriageError::Io(std::io::Error::other(e)))??;

            batches += 1;
            info!(source, batch = batches, chunks = written, "Committed chunk batch");
            progress(IngestProgress {
                done: offset + written,
                total,
            });
        }

        let index = Arc::clone(&self.index);
        let owned_source = source.to_string();
        let stale = tokio::task::spawn_blocking(move || index.truncate_source(&owned_source, total))
            .await
            .map_err(|e| TriageError::Io(std::io::Error::other(e)))??;
        if stale > 0 {
            debug!(source, stale, "Removed stale chunks");
        }

        Ok(IngestReport {
            source: source.to_string(),
            chunks: total,
            batches,
            skipped_sections: 0,
        })
    }
}

/// Supported documents under `dir`, sorted for a stable ingestion order.
fn supported_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        for entry in std::fs::read_dir(&current)? {
            let path = entry?.path();
            if path.is_dir() {
                pending.push(path);
            } else if is_supported(&path) {
                files.push(path);
            }
        }
    }
    files.sort();
    Ok(files)
}
