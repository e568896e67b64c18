//! Reconnect timer shared by the video session and the detection feed

use std::pin::Pin;
use std::time::Duration;

use tokio::time::Sleep;

/// At most one pending reconnect per connection.
///
/// Scheduling while a timer is pending replaces it, so a burst of failure
/// signals yields exactly one attempt.
#[derive(Debug, Default)]
pub enum ReconnectSlot {
    #[default]
    Idle,
    Scheduled(Pin<Box<Sleep>>),
    /// An attempt is in progress
    Running,
}

impl ReconnectSlot {
    pub fn schedule(&mut self, delay: Duration) {
        *self = ReconnectSlot::Scheduled(Box::pin(tokio::time::sleep(delay)));
    }

    pub fn cancel(&mut self) {
        *self = ReconnectSlot::Idle;
    }

    pub fn mark_running(&mut self) {
        *self = ReconnectSlot::Running;
    }

    pub fn is_scheduled(&self) -> bool {
        matches!(self, ReconnectSlot::Scheduled(_))
    }

    pub fn is_running(&self) -> bool {
        matches!(self, ReconnectSlot::Running)
    }

    /// Wait for the scheduled attempt, then mark it running.
    ///
    /// Pending forever when nothing is scheduled. Cancel-safe: dropping the
    /// future keeps the timer.
    pub async fn ready(&mut self) {
        match self {
            ReconnectSlot::Scheduled(sleep) => {
                sleep.as_mut().await;
                *self = ReconnectSlot::Running;
            }
            _ => std::future::pending().await,
        }
    }

    /// Wait for a scheduled attempt, or start one at once if none is.
    pub async fn ready_or_now(&mut self) {
        if self.is_scheduled() {
            self.ready().await;
        } else {
            self.mark_running();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_reschedule_replaces_pending_timer() {
        let start = Instant::now();
        let mut slot = ReconnectSlot::default();
        slot.schedule(Duration::from_secs(4));
        tokio::time::sleep(Duration::from_secs(3)).await;
        slot.schedule(Duration::from_secs(4));

        slot.ready().await;
        assert!(slot.is_running());
        assert_eq!(start.elapsed(), Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_slot_never_fires() {
        let mut slot = ReconnectSlot::Idle;
        let fired = tokio::time::timeout(Duration::from_secs(60), slot.ready()).await;
        assert!(fired.is_err());

        slot.schedule(Duration::from_secs(1));
        slot.cancel();
        assert!(!slot.is_scheduled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_wait_keeps_timer() {
        let start = Instant::now();
        let mut slot = ReconnectSlot::default();
        slot.schedule(Duration::from_secs(1));
        {
            let mut wait = tokio_test::task::spawn(slot.ready());
            tokio_test::assert_pending!(wait.poll());
        }
        assert!(slot.is_scheduled());

        slot.ready_or_now().await;
        assert!(slot.is_running());
        assert_eq!(start.elapsed(), Duration::from_secs(1));
    }
}
