//! Single-shot reconnect timer for the relay connection

use std::time::{Duration, Instant};

/// Fixed delay before reopening a dropped relay socket
pub const RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// At most one pending reconnect deadline.
///
/// Scheduling while a deadline is pending replaces it, so there is never more
/// than one outstanding reconnect.
#[derive(Debug, Default)]
pub struct ReconnectTimer {
    deadline: Option<Instant>,
}

impl ReconnectTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel any pending deadline and schedule a new one at `now + RECONNECT_DELAY`
    pub fn schedule(&mut self, now: Instant) -> Instant {
        self.cancel();
        let deadline = now + RECONNECT_DELAY;
        self.deadline = Some(deadline);
        deadline
    }

    /// Drop the pending deadline, if any. Returns whether one was pending.
    pub fn cancel(&mut self) -> bool {
        self.deadline.take().is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    /// Consume the deadline if it has passed
    pub fn fire(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schedule_within_delay() {
        let mut timer = ReconnectTimer::new();
        let now = Instant::now();
        let deadline = timer.schedule(now);
        assert_eq!(deadline - now, RECONNECT_DELAY);
        assert!(!timer.fire(now + Duration::from_millis(1_999)));
        assert!(timer.fire(now + RECONNECT_DELAY));
        assert!(!timer.is_pending());
    }

    #[test]
    fn test_reschedule_replaces_pending() {
        let mut timer = ReconnectTimer::new();
        let now = Instant::now();
        timer.schedule(now);
        let later = timer.schedule(now + Duration::from_millis(500));
        assert_eq!(timer.deadline(), Some(later));

        // Only one deadline ever fires
        assert!(timer.fire(later));
        assert!(!timer.fire(later + Duration::from_secs(10)));
    }

    #[test]
    fn test_cancel() {
        let mut timer = ReconnectTimer::new();
        assert!(!timer.cancel());
        timer.schedule(Instant::now());
        assert!(timer.cancel());
        assert!(!timer.is_pending());
    }
}
