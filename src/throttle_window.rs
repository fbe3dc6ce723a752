use crate::request_key::RequestKey;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

/// Remembers when each key last dispatched to the backend
#[derive(Debug, Default)]
pub struct ThrottleWindowTracker {
    last_dispatch: HashMap<RequestKey, Instant>,
}

impl ThrottleWindowTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a fresh dispatch is required for `key`: forced refreshes,
    /// keys never dispatched, and keys whose window has elapsed all qualify
    pub fn should_dispatch(
        &self,
        key: &RequestKey,
        now: Instant,
        window: Duration,
        force_refresh: bool,
    ) -> bool {
        if force_refresh {
            return true;
        }
        match self.last_dispatch.get(key) {
            Some(last) => now.saturating_duration_since(*last) >= window,
            None => true,
        }
    }

    /// Record a dispatch that actually reached the backend
    pub fn record_dispatch(&mut self, key: &RequestKey, now: Instant) {
        self.last_dispatch.insert(key.clone(), now);
    }

    pub fn last_dispatch(&self, key: &RequestKey) -> Option<Instant> {
        self.last_dispatch.get(key).copied()
    }

    pub fn forget(&mut self, key: &RequestKey) -> Option<Instant> {
        self.last_dispatch.remove(key)
    }

    pub fn clear(&mut self) {
        self.last_dispatch.clear();
    }

    pub fn len(&self) -> usize {
        self.last_dispatch.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_dispatch.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_millis(1000);

    #[test]
    fn test_unknown_key_dispatches() {
        let tracker = ThrottleWindowTracker::new();
        let key = RequestKey::new("getProducts");
        assert!(tracker.should_dispatch(&key, Instant::now(), WINDOW, false));
    }

    #[test]
    fn test_within_window_is_throttled() {
        let mut tracker = ThrottleWindowTracker::new();
        let key = RequestKey::new("getProducts");
        let start = Instant::now();
        tracker.record_dispatch(&key, start);

        assert!(!tracker.should_dispatch(&key, start + Duration::from_millis(999), WINDOW, false));
        assert!(tracker.should_dispatch(&key, start + WINDOW, WINDOW, false));
        assert!(tracker.should_dispatch(&key, start + Duration::from_millis(1500), WINDOW, false));
    }

    #[test]
    fn test_force_refresh_bypasses_window() {
        let mut tracker = ThrottleWindowTracker::new();
        let key = RequestKey::new("getUsers");
        let start = Instant::now();
        tracker.record_dispatch(&key, start);

        assert!(tracker.should_dispatch(&key, start, WINDOW, true));
    }

    #[test]
    fn test_clock_behind_record_counts_as_within_window() {
        let mut tracker = ThrottleWindowTracker::new();
        let key = RequestKey::new("getUsers");
        let start = Instant::now();
        tracker.record_dispatch(&key, start + Duration::from_millis(10));

        assert!(!tracker.should_dispatch(&key, start, WINDOW, false));
    }

    #[test]
    fn test_keys_are_independent_and_clearable() {
        let mut tracker = ThrottleWindowTracker::new();
        let a = RequestKey::with_param("getProduct", 1);
        let b = RequestKey::with_param("getProduct", 2);
        let now = Instant::now();
        tracker.record_dispatch(&a, now);

        assert!(!tracker.should_dispatch(&a, now, WINDOW, false));
        assert!(tracker.should_dispatch(&b, now, WINDOW, false));
        assert_eq!(tracker.last_dispatch(&a), Some(now));

        tracker.clear();
        assert!(tracker.is_empty());
        assert!(tracker.should_dispatch(&a, now, WINDOW, false));
    }
}
