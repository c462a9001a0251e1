//! sqlite-vec plumbing shared by the corpus index.

use std::sync::Once;

use rusqlite::{Connection, params};
use tracing::debug;
use zerocopy::IntoBytes;

use crate::error::Result;

static VEC_INIT: Once = Once::new();

/// Register sqlite-vec for every connection opened afterwards.
///
/// `sqlite3_auto_extension` is process-global; repeated calls are no-ops.
pub fn init_vector_extension() {
    VEC_INIT.call_once(|| {
        use rusqlite::ffi::sqlite3_auto_extension;
        use sqlite_vec::sqlite3_vec_init;

        // SAFETY: sqlite3_vec_init has the extension entry point signature
        // sqlite expects; registering it is idempotent per process.
        unsafe {
            #[allow(clippy::missing_transmute_annotations)]
            sqlite3_auto_extension(Some(std::mem::transmute(sqlite3_vec_init as *const ())));
        }
    });
}

/// Create the vec0 table holding one embedding per chunk id.
pub fn create_vector_table(conn: &Connection, table: &str, dims: usize) -> Result<()> {
    conn.execute_batch(&format!(
        "CREATE VIRTUAL TABLE IF NOT EXISTS {table} USING vec0(
            chunk_id TEXT PRIMARY KEY,
            embedding float[{dims}]
        )"
    ))?;
    debug!(table, dims, "Vector table ready");
    Ok(())
}

/// Store an embedding, replacing any previous one for the id.
pub fn store_embedding(conn: &Connection, table: &str, chunk_id: &str, embedding: &[f32]) -> Result<()> {
    // vec0 has no INSERT OR REPLACE
    conn.execute(&format!("DELETE FROM {table} WHERE chunk_id = ?1"), params![chunk_id])?;
    conn.execute(
        &format!("INSERT INTO {table} (chunk_id, embedding) VALUES (?1, ?2)"),
        params![chunk_id, embedding.as_bytes()],
    )?;
    Ok(())
}
