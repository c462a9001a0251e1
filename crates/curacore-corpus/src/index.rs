//! SQLite-backed corpus index.
//!
//! Chunk text lives in `{collection}_chunks`, embeddings in a sqlite-vec
//! `{collection}_vectors` table keyed by chunk id. A `corpus_meta` table
//! records which embedder and dimensionality each collection was built with.
//!
//! File-backed indexes run in WAL mode with a small pool of read-only
//! connections, so retrievals proceed while an ingestion batch is being
//! written and only ever observe committed batches.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::{Mutex, MutexGuard};
use rusqlite::{Connection, OpenFlags, OptionalExtension, params};
use tracing::{debug, info};
use zerocopy::IntoBytes;

use crate::error::{CorpusError, Result};
use crate::types::{IndexHit, IndexedChunk};
use crate::vector::{create_vector_table, init_vector_extension, store_embedding};

/// Current schema version.
const SCHEMA_VERSION: i32 = 1;

/// Read-only connections opened alongside the writer for file-backed indexes.
const READER_POOL_SIZE: usize = 4;

/// Summary of a collection's contents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CorpusStats {
    pub collection: String,
    pub chunks: usize,
    /// `(source, chunk count)` sorted by source.
    pub sources: Vec<(String, usize)>,
    pub dimensions: usize,
    pub embedder: String,
}

/// Persistent store of chunk embeddings for one collection.
pub struct CorpusIndex {
    writer: Mutex<Connection>,
    readers: Vec<Mutex<Connection>>,
    next_reader: AtomicUsize,
    collection: String,
    dimensions: usize,
    embedder: String,
    path: Option<PathBuf>,
}

impl CorpusIndex {
    /// Open or create an index at `path` for `collection`.
    ///
    /// Fails with [`CorpusError::EmbeddingMismatch`] when the collection
    /// already exists with a different embedder or dimensionality.
    pub fn open(
        path: impl AsRef<Path>,
        collection: &str,
        dimensions: usize,
        embedder: &str,
    ) -> Result<Self> {
        validate_collection(collection)?;
        init_vector_extension();
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let writer = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_FULL_MUTEX,
        )?;
        initialize(&writer, collection, dimensions, embedder)?;

        let readers = (0..READER_POOL_SIZE)
            .map(|_| {
                let conn = Connection::open_with_flags(
                    path,
                    OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_FULL_MUTEX,
                )?;
                conn.busy_timeout(std::time::Duration::from_secs(5))?;
                Ok(Mutex::new(conn))
            })
            .collect::<Result<Vec<_>>>()?;

        info!(
            path = %path.display(),
            collection,
            dimensions,
            embedder,
            "Corpus index opened"
        );

        Ok(Self {
            writer: Mutex::new(writer),
            readers,
            next_reader: AtomicUsize::new(0),
            collection: collection.to_string(),
            dimensions,
            embedder: embedder.to_string(),
            path: Some(path.to_path_buf()),
        })
    }

    /// Open an in-memory index (useful for testing).
    ///
    /// Reads share the writer connection.
    pub fn open_in_memory(collection: &str, dimensions: usize, embedder: &str) -> Result<Self> {
        validate_collection(collection)?;
        init_vector_extension();
        let conn = Connection::open_in_memory()?;
        initialize(&conn, collection, dimensions, embedder)?;

        Ok(Self {
            writer: Mutex::new(conn),
            readers: Vec::new(),
            next_reader: AtomicUsize::new(0),
            collection: collection.to_string(),
            dimensions,
            embedder: embedder.to_string(),
            path: None,
        })
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn embedder(&self) -> &str {
        &self.embedder
    }

    /// Database file, `None` for in-memory indexes.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn chunks_table(&self) -> String {
        format!("{}_chunks", self.collection)
    }

    fn vectors_table(&self) -> String {
        format!("{}_vectors", self.collection)
    }

    /// A connection for read-only work.
    fn reader(&self) -> MutexGuard<'_, Connection> {
        if self.readers.is_empty() {
            return self.writer.lock();
        }
        for conn in &self.readers {
            if let Some(guard) = conn.try_lock() {
                return guard;
            }
        }
        let slot = self.next_reader.fetch_add(1, Ordering::Relaxed) % self.readers.len();
        self.readers[slot].lock()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Writes
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert or overwrite a batch of chunks.
    ///
    /// The batch commits atomically: readers see all of it or none of it.
    pub fn upsert(&self, chunks: &[IndexedChunk]) -> Result<usize> {
        for chunk in chunks {
            self.check_dimensions(chunk.embedding.len())?;
        }

        let chunks_table = self.chunks_table();
        let vectors_table = self.vectors_table();

        let mut conn = self.writer.lock();
        let tx = conn.transaction()?;
        {
            let mut insert = tx.prepare_cached(&format!(
                "INSERT OR REPLACE INTO {chunks_table} (id, source, chunk_index, text)
                 VALUES (?1, ?2, ?3, ?4)"
            ))?;
            for chunk in chunks {
                insert.execute(params![chunk.id, chunk.source, chunk.index as i64, chunk.text])?;
                store_embedding(&tx, &vectors_table, &chunk.id, &chunk.embedding)?;
            }
        }
        tx.commit()?;

        debug!(collection = %self.collection, count = chunks.len(), "Upserted chunk batch");
        Ok(chunks.len())
    }

    /// Drop chunks of `source` at positions `>= keep`.
    ///
    /// Used after re-ingesting a document that got shorter.
    pub fn truncate_source(&self, source: &str, keep: usize) -> Result<usize> {
        self.delete_where(
            "source = ?1 AND chunk_index >= ?2",
            params![source, keep as i64],
        )
    }

    /// Remove every chunk of a document.
    pub fn remove_source(&self, source: &str) -> Result<usize> {
        self.delete_where("source = ?1", params![source])
    }

    /// Remove every chunk in the collection.
    pub fn clear(&self) -> Result<usize> {
        self.delete_where("1 = 1", params![])
    }

    fn delete_where(&self, predicate: &str, params: impl rusqlite::Params + Clone) -> Result<usize> {
        let chunks_table = self.chunks_table();
        let vectors_table = self.vectors_table();

        let mut conn = self.writer.lock();
        let tx = conn.transaction()?;
        tx.execute(
            &format!(
                "DELETE FROM {vectors_table} WHERE chunk_id IN
                 (SELECT id FROM {chunks_table} WHERE {predicate})"
            ),
            params.clone(),
        )?;
        let removed = tx.execute(
            &format!("DELETE FROM {chunks_table} WHERE {predicate}"),
            params,
        )?;
        tx.commit()?;

        debug!(collection = %self.collection, removed, "Deleted chunks");
        Ok(removed)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────────

    /// The `k` chunks nearest to `embedding`, most relevant first.
    ///
    /// Hits farther than `max_distance` are dropped. An empty collection
    /// yields an empty result.
    pub fn query(
        &self,
        embedding: &[f32],
        k: usize,
        max_distance: Option<f32>,
    ) -> Result<Vec<IndexHit>> {
        self.check_dimensions(embedding.len())?;
        if k == 0 {
            return Ok(Vec::new());
        }

        let chunks_table = self.chunks_table();
        let vectors_table = self.vectors_table();

        let conn = self.reader();
        let mut stmt = conn.prepare_cached(&format!(
            "WITH knn AS (
                SELECT chunk_id, distance
                FROM {vectors_table}
                WHERE embedding MATCH ?1
                ORDER BY distance
                LIMIT ?2
             )
             SELECT c.id, c.source, c.text, knn.distance
             FROM knn JOIN {chunks_table} c ON c.id = knn.chunk_id
             ORDER BY knn.distance"
        ))?;

        let hits = stmt
            .query_map(params![embedding.as_bytes(), k as i64], |row| {
                Ok(IndexHit {
                    id: row.get(0)?,
                    source: row.get(1)?,
                    text: row.get(2)?,
                    distance: row.get(3)?,
                })
            })?
            .filter(|hit| match (hit, max_distance) {
                (Ok(hit), Some(max)) => hit.distance <= max,
                _ => true,
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;

        debug!(collection = %self.collection, k, found = hits.len(), "Corpus query");
        Ok(hits)
    }

    /// Number of chunks in the collection.
    pub fn count(&self) -> Result<usize> {
        let conn = self.reader();
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", self.chunks_table()),
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Indexed documents with their chunk counts.
    pub fn sources(&self) -> Result<Vec<(String, usize)>> {
        let conn = self.reader();
        let mut stmt = conn.prepare(&format!(
            "SELECT source, COUNT(*) FROM {} GROUP BY source ORDER BY source",
            self.chunks_table()
        ))?;
        let sources = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as usize))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(sources)
    }

    pub fn stats(&self) -> Result<CorpusStats> {
        let sources = self.sources()?;
        Ok(CorpusStats {
            collection: self.collection.clone(),
            chunks: sources.iter().map(|(_, n)| n).sum(),
            sources,
            dimensions: self.dimensions,
            embedder: self.embedder.clone(),
        })
    }

    fn check_dimensions(&self, actual: usize) -> Result<()> {
        if actual != self.dimensions {
            return Err(CorpusError::DimensionMismatch {
                expected: self.dimensions,
                actual,
            });
        }
        Ok(())
    }
}

/// Collection names are interpolated into table names.
fn validate_collection(collection: &str) -> Result<()> {
    let valid = !collection.is_empty()
        && collection
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(CorpusError::InvalidCollection(collection.to_string()))
    }
}

/// Pragmas, schema and the embedder consistency check.
fn initialize(conn: &Connection, collection: &str, dimensions: usize, embedder: &str) -> Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;",
    )?;

    let version: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if version < SCHEMA_VERSION {
        debug!(from = version, to = SCHEMA_VERSION, "Migrating corpus schema");
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS corpus_meta (
                collection TEXT PRIMARY KEY,
                dimensions INTEGER NOT NULL,
                embedder TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
             );
             PRAGMA user_version = {SCHEMA_VERSION};"
        ))?;
    }

    let stored: Option<(i64, String)> = conn
        .query_row(
            "SELECT dimensions, embedder FROM corpus_meta WHERE collection = ?1",
            params![collection],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    match stored {
        Some((stored_dims, stored_embedder))
            if stored_dims as usize != dimensions || stored_embedder != embedder =>
        {
            return Err(CorpusError::EmbeddingMismatch {
                collection: collection.to_string(),
                stored_embedder,
                stored_dims: stored_dims as usize,
                requested_embedder: embedder.to_string(),
                requested_dims: dimensions,
            });
        }
        Some(_) => {}
        None => {
            conn.execute(
                "INSERT INTO corpus_meta (collection, dimensions, embedder) VALUES (?1, ?2, ?3)",
                params![collection, dimensions as i64, embedder],
            )?;
        }
    }

    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {collection}_chunks (
            id TEXT PRIMARY KEY,
            source TEXT NOT NULL,
            chunk_index INTEGER NOT NULL,
            text TEXT NOT NULL
         );
         CREATE INDEX IF NOT EXISTS idx_{collection}_chunks_source ON {collection}_chunks(source);"
    ))?;
    create_vector_table(conn, &format!("{collection}_vectors"), dimensions)?;

    Ok(())
}
