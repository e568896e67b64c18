//! Debounce timer keyed by camera and plate text

use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DebounceKey {
    pub camera_id: String,
    pub plate_text: String,
}

impl DebounceKey {
    pub fn new(camera_id: impl Into<String>, plate_text: impl Into<String>) -> Self {
        Self {
            camera_id: camera_id.into(),
            plate_text: plate_text.into(),
        }
    }
}

/// Single-slot debounce.
///
/// Arming with the key already armed keeps the original deadline, so
/// repeated identical reads do not postpone the request. A different key
/// replaces the pending one and restarts the delay.
#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    armed: Option<(DebounceKey, Instant)>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self { delay, armed: None }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Returns true if the timer was (re)started.
    pub fn arm(&mut self, key: DebounceKey, now: Instant) -> bool {
        if matches!(&self.armed, Some((armed, _)) if *armed == key) {
            return false;
        }
        self.armed = Some((key, now + self.delay));
        true
    }

    pub fn cancel(&mut self) -> Option<DebounceKey> {
        self.armed.take().map(|(key, _)| key)
    }

    pub fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    pub fn key(&self) -> Option<&DebounceKey> {
        self.armed.as_ref().map(|(key, _)| key)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.armed.as_ref().map(|(_, at)| *at)
    }

    /// Take the key if its deadline has passed.
    pub fn poll(&mut self, now: Instant) -> Option<DebounceKey> {
        if self.deadline().is_some_and(|at| now >= at) {
            self.cancel()
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DELAY: Duration = Duration::from_millis(500);

    #[test]
    fn test_identical_key_keeps_deadline() {
        let mut d = Debouncer::new(DELAY);
        let t0 = Instant::now();
        assert!(d.arm(DebounceKey::new("1", "30A12345"), t0));
        assert!(!d.arm(DebounceKey::new("1", "30A12345"), t0 + Duration::from_millis(200)));
        assert_eq!(d.deadline(), Some(t0 + DELAY));
    }

    #[test]
    fn test_distinct_key_restarts_delay() {
        let mut d = Debouncer::new(DELAY);
        let t0 = Instant::now();
        d.arm(DebounceKey::new("1", "30A12345"), t0);
        let t1 = t0 + Duration::from_millis(300);
        assert!(d.arm(DebounceKey::new("1", "30A12346"), t1));
        assert_eq!(d.deadline(), Some(t1 + DELAY));
        assert_eq!(d.key().map(|k| k.plate_text.as_str()), Some("30A12346"));
    }

    #[test]
    fn test_poll_fires_once_at_deadline() {
        let mut d = Debouncer::new(DELAY);
        let t0 = Instant::now();
        d.arm(DebounceKey::new("1", "30A12345"), t0);
        assert_eq!(d.poll(t0 + Duration::from_millis(499)), None);
        assert_eq!(d.poll(t0 + DELAY), Some(DebounceKey::new("1", "30A12345")));
        assert_eq!(d.poll(t0 + DELAY), None);
        assert!(!d.is_armed());
    }

    #[test]
    fn test_cancel_disarms() {
        let mut d = Debouncer::new(DELAY);
        d.arm(DebounceKey::new("1", "30A12345"), Instant::now());
        assert!(d.cancel().is_some());
        assert_eq!(d.deadline(), None);
    }
}
