//! Idle-time tracking for session expiry.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

/// Last access time per session.
#[derive(Debug)]
pub struct TtlTracker {
    access_times: HashMap<String, Instant>,
    ttl: Option<Duration>,
}

impl TtlTracker {
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            access_times: HashMap::new(),
            ttl,
        }
    }

    /// Record an access (resets the idle timer).
    pub fn touch(&mut self, session_id: &str) {
        self.access_times
            .insert(session_id.to_string(), Instant::now());
    }

    pub fn is_expired(&self, session_id: &str) -> bool {
        match (self.ttl, self.access_times.get(session_id)) {
            (None, _) => false,
            // No access record = expired
            (Some(_), None) => true,
            (Some(ttl), Some(last_access)) => last_access.elapsed() > ttl,
        }
    }

    pub fn remove(&mut self, session_id: &str) {
        self.access_times.remove(session_id);
    }

    /// Remove all expired entries and return their ids.
    pub fn drain_expired(&mut self) -> Vec<String> {
        let Some(ttl) = self.ttl else {
            return Vec::new();
        };
        let now = Instant::now();
        let expired: Vec<String> = self
            .access_times
            .iter()
            .filter(|(_, last)| now.duration_since(**last) > ttl)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            self.access_times.remove(id);
        }
        expired
    }

    pub fn len(&self) -> usize {
        self.access_times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.access_times.is_empty()
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_no_ttl_never_expires() {
        let mut tracker = TtlTracker::new(None);
        tracker.touch("s1");
        tokio::time::advance(Duration::from_secs(86_400)).await;

        assert!(!tracker.is_expired("s1"));
        assert!(!tracker.is_expired("unknown"));
        assert!(tracker.drain_expired().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_touch_resets_timer() {
        let mut tracker = TtlTracker::new(Some(Duration::from_secs(60)));
        tracker.touch("s1");
        tokio::time::advance(Duration::from_secs(40)).await;
        tracker.touch("s1");
        tokio::time::advance(Duration::from_secs(40)).await;

        assert!(!tracker.is_expired("s1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_expired() {
        let mut tracker = TtlTracker::new(Some(Duration::from_secs(10)));
        tracker.touch("old");
        tokio::time::advance(Duration::from_secs(8)).await;
        tracker.touch("fresh");
        tokio::time::advance(Duration::from_secs(5)).await;

        assert!(tracker.is_expired("old"));
        assert_eq!(tracker.drain_expired(), vec!["old".to_string()]);
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_removed_counts_as_expired() {
        let mut tracker = TtlTracker::new(Some(Duration::from_secs(60)));
        tracker.touch("s1");
        tracker.remove("s1");
        assert!(tracker.is_expired("s1"));
        assert!(tracker.is_empty());
    }
}
