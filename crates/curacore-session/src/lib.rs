//! In-memory session store with LRU eviction and idle TTL.
//!
//! Each entry is handed out as an `Arc<tokio::sync::Mutex<V>>`. Holding the
//! mutex for the length of a request serializes work on one session while
//! other sessions proceed in parallel.
//!
//! ```rust,ignore
//! use curacore_session::{CacheConfig, SessionCache};
//!
//! let cache = SessionCache::new(
//!     CacheConfig::new()
//!         .with_max_sessions(1000)
//!         .with_ttl(Duration::from_secs(3600)),
//! );
//! let handle = cache.get_or_insert_with("abc", || Session::new("abc")).await;
//! let mut session = handle.lock().await;
//! ```

mod cache;
mod config;
mod ttl;

pub use cache::{CacheStats, SessionCache, SessionHandle};
pub use config::{CacheConfig, DEFAULT_CLEANUP_INTERVAL, DEFAULT_MAX_SESSIONS};
pub use ttl::TtlTracker;
