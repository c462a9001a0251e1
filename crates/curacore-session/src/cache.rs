//! Session cache with LRU eviction and TTL support.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace};

use crate::config::CacheConfig;
use crate::ttl::TtlTracker;

/// Shared, individually locked session value.
pub type SessionHandle<V> = Arc<Mutex<V>>;

struct CacheInner<V> {
    lru: LruCache<String, SessionHandle<V>>,
    ttl: TtlTracker,
    hits: u64,
    misses: u64,
    evictions: u64,
    expirations: u64,
}

impl<V> CacheInner<V> {
    /// Drop `session_id` if its TTL ran out. Returns true if it was dropped.
    fn expire_if_stale(&mut self, session_id: &str) -> bool {
        if self.lru.contains(session_id) && self.ttl.is_expired(session_id) {
            debug!(session_id, "Session expired, removing from cache");
            self.lru.pop(session_id);
            self.ttl.remove(session_id);
            self.expirations += 1;
            return true;
        }
        false
    }

    fn put(&mut self, session_id: &str, handle: SessionHandle<V>) {
        if let Some((evicted_id, _)) = self.lru.push(session_id.to_string(), handle) {
            if evicted_id != session_id {
                debug!(session_id = %evicted_id, "Evicting LRU session to make room");
                self.ttl.remove(&evicted_id);
                self.evictions += 1;
            }
        }
        self.ttl.touch(session_id);
    }
}

/// Session cache with LRU eviction and optional idle TTL.
///
/// Clones share the same underlying map.
pub struct SessionCache<V> {
    inner: Arc<RwLock<CacheInner<V>>>,
    config: CacheConfig,
}

impl<V> SessionCache<V> {
    pub fn new(config: CacheConfig) -> Self {
        let cap = NonZeroUsize::new(config.max_sessions).unwrap_or(NonZeroUsize::MIN);
        let inner = CacheInner {
            lru: LruCache::new(cap),
            ttl: TtlTracker::new(config.ttl),
            hits: 0,
            misses: 0,
            evictions: 0,
            expirations: 0,
        };
        Self {
            inner: Arc::new(RwLock::new(inner)),
            config,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Number of cached sessions, expired ones not yet swept included.
    pub async fn len(&self) -> usize {
        self.inner.read().await.lru.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.lru.is_empty()
    }

    /// Look up a live session, marking it recently used.
    pub async fn get(&self, session_id: &str) -> Option<SessionHandle<V>> {
        let mut inner = self.inner.write().await;
        inner.expire_if_stale(session_id);
        match inner.lru.get(session_id).cloned() {
            Some(handle) => {
                inner.ttl.touch(session_id);
                inner.hits += 1;
                trace!(session_id, "Session found in cache");
                Some(handle)
            }
            None => {
                inner.misses += 1;
                None
            }
        }
    }

    /// Look up a live session or create it with `init`.
    pub async fn get_or_insert_with<F>(&self, session_id: &str, init: F) -> SessionHandle<V>
    where
        F: FnOnce() -> V,
    {
        let mut inner = self.inner.write().await;
        inner.expire_if_stale(session_id);
        if let Some(handle) = inner.lru.get(session_id).cloned() {
            inner.ttl.touch(session_id);
            inner.hits += 1;
            return handle;
        }

        inner.misses += 1;
        let handle = Arc::new(Mutex::new(init()));
        inner.put(session_id, Arc::clone(&handle));
        debug!(session_id, cache_size = inner.lru.len(), "Session created");
        handle
    }

    /// Insert or replace a session.
    pub async fn insert(&self, session_id: &str, value: V) -> SessionHandle<V> {
        let handle = Arc::new(Mutex::new(value));
        self.inner
            .write()
            .await
            .put(session_id, Arc::clone(&handle));
        handle
    }

    /// Remove a session. Returns its handle if it was live.
    pub async fn remove(&self, session_id: &str) -> Option<SessionHandle<V>> {
        let mut inner = self.inner.write().await;
        let expired = inner.ttl.is_expired(session_id);
        inner.ttl.remove(session_id);
        let handle = inner.lru.pop(session_id);
        if handle.is_some() {
            debug!(session_id, "Session removed");
        }
        handle.filter(|_| !expired)
    }

    /// Remove `session_id` only while it still maps to `handle`.
    ///
    /// A caller holding a handle that was replaced in the meantime (expired,
    /// evicted or removed and then recreated) leaves the newer entry alone.
    pub async fn remove_if_same(&self, session_id: &str, handle: &SessionHandle<V>) -> bool {
        let mut inner = self.inner.write().await;
        let same = inner
            .lru
            .peek(session_id)
            .is_some_and(|current| Arc::ptr_eq(current, handle));
        if same {
            inner.lru.pop(session_id);
            inner.ttl.remove(session_id);
            debug!(session_id, "Session released");
        }
        same
    }

    /// Whether a live session exists (does not touch it).
    pub async fn contains(&self, session_id: &str) -> bool {
        let inner = self.inner.read().await;
        inner.lru.contains(session_id) && !inner.ttl.is_expired(session_id)
    }

    /// Ids of all live sessions, most recently used first.
    pub async fn ids(&self) -> Vec<String> {
        let inner = self.inner.read().await;
        inner
            .lru
            .iter()
            .filter(|(id, _)| !inner.ttl.is_expired(id))
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Drop every expired session. Returns how many were dropped.
    pub async fn cleanup_expired(&self) -> usize {
        let mut inner = self.inner.write().await;
        let expired = inner.ttl.drain_expired();
        let mut count = 0;
        for session_id in expired {
            if inner.lru.pop(&session_id).is_some() {
                count += 1;
            }
        }
        inner.expirations += count as u64;

        if count > 0 {
            debug!(count, "Cleaned up expired sessions");
        }
        count
    }

    pub async fn stats(&self) -> CacheStats {
        let inner = self.inner.read().await;
        CacheStats {
            size: inner.lru.len(),
            capacity: self.config.max_sessions,
            ttl_tracked: inner.ttl.len(),
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
            expirations: inner.expirations,
        }
    }
}

impl<V: Send + Sync + 'static> SessionCache<V> {
    /// Start the periodic expiry sweep.
    ///
    /// Returns `None` when there is nothing to sweep: no TTL, the task is
    /// disabled, or the interval is zero.
    pub fn spawn_cleanup_task(&self) -> Option<JoinHandle<()>> {
        let interval = self.config.cleanup_interval;
        if !self.config.enable_cleanup_task || self.config.ttl.is_none() || interval.is_zero() {
            return None;
        }

        let cache = self.clone();
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                cache.cleanup_expired().await;
            }
        }))
    }
}

impl<V> Clone for SessionCache<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            config: self.config.clone(),
        }
    }
}

/// Cache statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub size: usize,
    pub capacity: usize,
    pub ttl_tracked: usize,
    pub hits: u64,
    pub misses: u64,
    /// Sessions dropped to stay within capacity.
    pub evictions: u64,
    /// Sessions dropped for idling past the TTL.
    pub expirations: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn cache(max: usize) -> SessionCache<Vec<String>> {
        SessionCache::new(CacheConfig::new().with_max_sessions(max))
    }

    #[tokio::test]
    async fn test_get_or_insert_and_mutate() {
        let cache = cache(10);
        let handle = cache.get_or_insert_with("s1", Vec::new).await;
        handle.lock().await.push("fever".to_string());

        let again = cache
            .get_or_insert_with("s1", || vec!["unused".to_string()])
            .await;
        assert_eq!(*again.lock().await, vec!["fever".to_string()]);
        assert_eq!(cache.len().await, 1);

        let stats = cache.stats().await;
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
    }

    #[tokio::test]
    async fn test_get_missing() {
        let cache = cache(10);
        assert!(cache.get("nope").await.is_none());
        assert!(!cache.contains("nope").await);
    }

    #[tokio::test]
    async fn test_lru_eviction() {
        let cache = cache(3);
        for i in 1..=3 {
            cache.insert(&format!("s{}", i), Vec::new()).await;
        }
        // s1 becomes most recently used
        assert!(cache.get("s1").await.is_some());

        cache.insert("s4", Vec::new()).await;

        assert_eq!(cache.len().await, 3);
        assert!(cache.contains("s1").await);
        assert!(!cache.contains("s2").await);
        assert!(cache.contains("s3").await);
        assert!(cache.contains("s4").await);
        assert_eq!(cache.stats().await.evictions, 1);
    }

    #[tokio::test]
    async fn test_replace_is_not_eviction() {
        let cache = cache(2);
        cache.insert("s1", vec!["a".to_string()]).await;
        cache.insert("s1", vec!["b".to_string()]).await;
        assert_eq!(cache.stats().await.evictions, 0);
        let handle = cache.get("s1").await.unwrap();
        assert_eq!(*handle.lock().await, vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn test_remove() {
        let cache = cache(10);
        cache.insert("s1", Vec::new()).await;
        assert!(cache.remove("s1").await.is_some());
        assert!(cache.remove("s1").await.is_none());
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_remove_if_same_spares_replacement() {
        let cache = cache(10);
        let old = cache.get_or_insert_with("s1", Vec::new).await;
        cache.remove("s1").await;
        let fresh = cache.get_or_insert_with("s1", || vec!["new".to_string()]).await;

        assert!(!cache.remove_if_same("s1", &old).await);
        assert!(cache.contains("s1").await);

        assert!(cache.remove_if_same("s1", &fresh).await);
        assert!(!cache.contains("s1").await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_expiry_is_lazy_and_recreates() {
        let cache: SessionCache<Vec<String>> = SessionCache::new(
            CacheConfig::new().with_ttl(Duration::from_secs(60)),
        );
        let handle = cache.get_or_insert_with("s1", Vec::new).await;
        handle.lock().await.push("old".to_string());

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(!cache.contains("s1").await);
        assert!(cache.get("s1").await.is_none());

        let fresh = cache.get_or_insert_with("s1", Vec::new).await;
        assert!(fresh.lock().await.is_empty());
        assert_eq!(cache.stats().await.expirations, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_access_resets_ttl() {
        let cache: SessionCache<u32> =
            SessionCache::new(CacheConfig::new().with_ttl(Duration::from_secs(60)));
        cache.insert("s1", 0).await;

        tokio::time::advance(Duration::from_secs(40)).await;
        assert!(cache.get("s1").await.is_some());
        tokio::time::advance(Duration::from_secs(40)).await;

        assert!(cache.contains("s1").await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_expired() {
        let cache: SessionCache<u32> =
            SessionCache::new(CacheConfig::new().with_ttl(Duration::from_secs(10)));
        for i in 0..3 {
            cache.insert(&format!("s{}", i), i).await;
        }
        tokio::time::advance(Duration::from_secs(11)).await;
        cache.insert("live", 9).await;

        assert_eq!(cache.cleanup_expired().await, 3);
        assert_eq!(cache.ids().await, vec!["live".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_task_sweeps() {
        let cache: SessionCache<u32> = SessionCache::new(
            CacheConfig::new()
                .with_ttl(Duration::from_secs(10))
                .with_cleanup_interval(Duration::from_secs(5)),
        );
        cache.insert("s1", 1).await;
        let task = cache.spawn_cleanup_task().unwrap();

        tokio::time::sleep(Duration::from_secs(16)).await;
        assert_eq!(cache.len().await, 0);
        task.abort();
    }

    #[tokio::test]
    async fn test_no_cleanup_task_without_ttl() {
        let cache = cache(10);
        assert!(cache.spawn_cleanup_task().is_none());
    }

    #[tokio::test]
    async fn test_per_session_serialization() {
        let cache: SessionCache<Vec<u32>> = SessionCache::new(CacheConfig::new());
        let mut tasks = Vec::new();
        for i in 0..20 {
            let cache = cache.clone();
            tasks.push(tokio::spawn(async move {
                let handle = cache.get_or_insert_with("shared", Vec::new).await;
                let mut guard = handle.lock().await;
                let before = guard.len();
                tokio::task::yield_now().await;
                guard.push(i);
                assert_eq!(guard.len(), before + 1);
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        let handle = cache.get("shared").await.unwrap();
        assert_eq!(handle.lock().await.len(), 20);
    }
}
