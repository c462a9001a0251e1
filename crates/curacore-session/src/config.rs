//! Configuration for the session cache.

use std::time::Duration;

/// Default maximum number of sessions to cache.
pub const DEFAULT_MAX_SESSIONS: usize = 10_000;

/// Default interval of the background expiry sweep.
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of sessions before LRU eviction.
    pub max_sessions: usize,

    /// Idle time after which a session is dropped. `None` keeps sessions
    /// until they are evicted or removed.
    pub ttl: Option<Duration>,

    /// Whether [`SessionCache::spawn_cleanup_task`](crate::SessionCache::spawn_cleanup_task)
    /// starts a sweep. If false, expired sessions are only dropped on access.
    pub enable_cleanup_task: bool,

    pub cleanup_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_sessions: DEFAULT_MAX_SESSIONS,
            ttl: None,
            enable_cleanup_task: true,
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_sessions(mut self, max: usize) -> Self {
        self.max_sessions = max;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn without_ttl(mut self) -> Self {
        self.ttl = None;
        self
    }

    pub fn with_cleanup_task(mut self, enabled: bool) -> Self {
        self.enable_cleanup_task = enabled;
        self
    }

    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }
}
