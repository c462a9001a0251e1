//! Session API: routes messages to per-id sessions.
//!
//! Each call holds the session's own mutex for its whole duration, so
//! messages for one id are processed strictly in arrival order while other
//! ids proceed in parallel.
//!
//! Sessions that finish their analysis are moved into a completed archive
//! unless the manager retains them, so the id is free for a new consultation
//! while the finished one can still be summarized.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use curacore_config::SessionConfig;
use curacore_session::{CacheConfig, SessionCache, SessionHandle};
use tracing::{debug, info};

use crate::engine::{TriageEngine, TriageReply};
use crate::error::{Result, TriageError};
use crate::session::{Session, TriageStep};

// ─────────────────────────────────────────────────────────────────────────────
// Session Store
// ─────────────────────────────────────────────────────────────────────────────

/// Where live sessions are kept.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// The live session for `id`, created fresh if absent.
    async fn open(&self, id: &str) -> SessionHandle<Session>;

    /// The live session for `id`, if any.
    async fn find(&self, id: &str) -> Option<SessionHandle<Session>>;

    /// Drop the session. Returns whether it existed.
    async fn discard(&self, id: &str) -> bool;

    /// Drop the session only if `id` still maps to `handle`.
    async fn release(&self, id: &str, handle: &SessionHandle<Session>) -> bool;

    async fn live_sessions(&self) -> usize;
}

#[async_trait]
impl SessionStore for SessionCache<Session> {
    async fn open(&self, id: &str) -> SessionHandle<Session> {
        self.get_or_insert_with(id, || Session::new(id)).await
    }

    async fn find(&self, id: &str) -> Option<SessionHandle<Session>> {
        self.get(id).await
    }

    async fn discard(&self, id: &str) -> bool {
        self.remove(id).await.is_some()
    }

    async fn release(&self, id: &str, handle: &SessionHandle<Session>) -> bool {
        self.remove_if_same(id, handle).await
    }

    async fn live_sessions(&self) -> usize {
        self.len().await
    }
}

/// Cache settings from the `[session]` config section.
pub fn cache_config(config: &SessionConfig) -> CacheConfig {
    let cache = CacheConfig::new()
        .with_max_sessions(config.max_sessions)
        .with_cleanup_interval(Duration::from_secs(config.cleanup_interval_secs.max(1)));
    match config.ttl_secs {
        Some(secs) => cache.with_ttl(Duration::from_secs(secs)),
        None => cache.without_ttl().with_cleanup_task(false),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Session Manager
// ─────────────────────────────────────────────────────────────────────────────

pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    engine: Arc<TriageEngine>,
    retain_completed: bool,
    completed: SessionCache<Session>,
}

impl SessionManager {
    pub fn new(store: Arc<dyn SessionStore>, engine: Arc<TriageEngine>) -> Self {
        Self {
            store,
            engine,
            retain_completed: false,
            completed: SessionCache::new(CacheConfig::new().with_cleanup_task(false)),
        }
    }

    /// Where finished consultations are kept once their id is released.
    pub fn with_completed_archive(mut self, archive: SessionCache<Session>) -> Self {
        self.completed = archive;
        self
    }

    pub fn completed_archive(&self) -> &SessionCache<Session> {
        &self.completed
    }

    /// Keep sessions that reached ANALYSIS instead of evicting them.
    pub fn with_retain_completed(mut self, retain: bool) -> Self {
        self.retain_completed = retain;
        self
    }

    pub fn engine(&self) -> &Arc<TriageEngine> {
        &self.engine
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Feed one message to the session `session_id`, creating it on first use.
    pub async fn process(&self, session_id: &str, text: &str) -> Result<TriageReply> {
        let session_id = session_id.trim();
        if session_id.is_empty() {
            return Err(TriageError::validation("session id must not be empty"));
        }

        let handle = self.store.open(session_id).await;
        let mut session = handle.lock().await;
        let before = session.step();
        let reply = self.engine.process(&mut session, text).await;
        if before != reply.step {
            debug!(session_id, from = %before, to = %reply.step, "Session step changed");
        }

        // Only the message that produced the analysis closes the session, and
        // only while this handle is still the one registered under the id.
        let analyzed = before != TriageStep::Analysis && reply.step == TriageStep::Analysis;
        if analyzed && !self.retain_completed && self.store.release(session_id, &handle).await {
            self.completed.insert(session_id, session.clone()).await;
            info!(session_id, "Analysis delivered, session closed");
        }

        Ok(reply)
    }

    /// Forget the session. Unknown ids are fine.
    pub async fn reset(&self, session_id: &str) -> Result<bool> {
        let session_id = session_id.trim();
        if session_id.is_empty() {
            return Err(TriageError::validation("session id must not be empty"));
        }
        let existed = self.store.discard(session_id).await;
        let archived = self.completed.remove(session_id).await.is_some();
        debug!(session_id, existed, archived, "Session reset");
        Ok(existed || archived)
    }

    /// A copy of the live session, else of the last completed one.
    pub async fn snapshot(&self, session_id: &str) -> Option<Session> {
        let session_id = session_id.trim();
        let handle = match self.store.find(session_id).await {
            Some(handle) => handle,
            None => self.completed.get(session_id).await?,
        };
        let session = handle.lock().await;
        Some(session.clone())
    }

    pub async fn live_sessions(&self) -> usize {
        self.store.live_sessions().await
    }
}
