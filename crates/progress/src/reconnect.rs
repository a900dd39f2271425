//! Bounded, single-shot reconnection for progress sockets.
//!
//! Each abnormal close of a non-terminal job schedules at most one
//! reconnect after a fixed delay (no backoff). While that attempt is
//! pending, further closes are absorbed. If the attempts allowed since the
//! last successful open are used up, reconnection stops and the caller is
//! expected to offer a manual retry.

use std::time::Duration;

use cvflow_core::channel::{CHAT_RECONNECT_DELAY, UPLOAD_RECONNECT_DELAY};

/// Tunable parameters for the reconnect strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Fixed delay between a close and the reconnect attempt.
    pub delay: Duration,
    /// Attempts allowed between two successful opens.
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::upload()
    }
}

impl ReconnectPolicy {
    /// File-upload flow: one attempt after 3 seconds.
    pub fn upload() -> Self {
        Self {
            delay: UPLOAD_RECONNECT_DELAY,
            max_attempts: 1,
        }
    }

    /// Chat generation flow: one attempt after 2 seconds.
    pub fn chat() -> Self {
        Self {
            delay: CHAT_RECONNECT_DELAY,
            max_attempts: 1,
        }
    }
}

/// What to do after a close event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseDecision {
    /// Arm one timer for this delay.
    Schedule(Duration),
    /// A reconnect is already pending; do not arm another timer.
    AlreadyPending,
    /// The job is finished or the close was deliberate.
    NotNeeded,
    /// Attempts are used up; fall back to a manual retry.
    Exhausted,
}

/// Tracks pending reconnects and attempts for one subscription.
#[derive(Debug, Clone)]
pub struct ReconnectTracker {
    policy: ReconnectPolicy,
    pending: bool,
    attempts: u32,
}

impl ReconnectTracker {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            pending: false,
            attempts: 0,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// A connection opened; the attempt budget is restored.
    pub fn on_open(&mut self) {
        self.attempts = 0;
    }

    /// Decide how to react to a close.
    pub fn on_close(&mut self, terminal: bool, intentional: bool) -> CloseDecision {
        if terminal || intentional {
            return CloseDecision::NotNeeded;
        }
        if self.pending {
            return CloseDecision::AlreadyPending;
        }
        if self.attempts >= self.policy.max_attempts {
            return CloseDecision::Exhausted;
        }
        self.pending = true;
        CloseDecision::Schedule(self.policy.delay)
    }

    /// The pending timer fired. Returns `false` if nothing was pending.
    pub fn on_fire(&mut self) -> bool {
        if !self.pending {
            return false;
        }
        self.pending = false;
        self.attempts += 1;
        true
    }

    /// Drop any pending attempt (teardown, terminal state).
    pub fn cancel(&mut self) {
        self.pending = false;
    }

    /// Manual retry: forget previous attempts.
    pub fn reset(&mut self) {
        self.pending = false;
        self.attempts = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_use_fixed_delays() {
        assert_eq!(ReconnectPolicy::upload().delay, Duration::from_secs(3));
        assert_eq!(ReconnectPolicy::chat().delay, Duration::from_secs(2));
        assert_eq!(ReconnectPolicy::default(), ReconnectPolicy::upload());
    }

    #[test]
    fn non_terminal_close_schedules_once() {
        let mut tracker = ReconnectTracker::new(ReconnectPolicy::upload());
        assert_eq!(
            tracker.on_close(false, false),
            CloseDecision::Schedule(Duration::from_secs(3))
        );
        assert!(tracker.is_pending());
        assert_eq!(tracker.on_close(false, false), CloseDecision::AlreadyPending);
    }

    #[test]
    fn terminal_or_intentional_close_schedules_nothing() {
        let mut tracker = ReconnectTracker::new(ReconnectPolicy::upload());
        assert_eq!(tracker.on_close(true, false), CloseDecision::NotNeeded);
        assert_eq!(tracker.on_close(false, true), CloseDecision::NotNeeded);
        assert!(!tracker.is_pending());
    }

    #[test]
    fn failed_attempt_exhausts_budget_until_open() {
        let mut tracker = ReconnectTracker::new(ReconnectPolicy::chat());
        tracker.on_close(false, false);
        assert!(tracker.on_fire());
        assert_eq!(tracker.attempts(), 1);

        // The reconnect attempt itself closed without opening.
        assert_eq!(tracker.on_close(false, false), CloseDecision::Exhausted);

        tracker.on_open();
        assert!(matches!(
            tracker.on_close(false, false),
            CloseDecision::Schedule(_)
        ));
    }

    #[test]
    fn fire_without_pending_is_noop() {
        let mut tracker = ReconnectTracker::new(ReconnectPolicy::upload());
        assert!(!tracker.on_fire());
        tracker.on_close(false, false);
        tracker.cancel();
        assert!(!tracker.on_fire());
        assert_eq!(tracker.attempts(), 0);
    }

    #[test]
    fn reset_restores_budget() {
        let mut tracker = ReconnectTracker::new(ReconnectPolicy {
            delay: Duration::from_millis(10),
            max_attempts: 2,
        });
        for _ in 0..2 {
            tracker.on_close(false, false);
            tracker.on_fire();
        }
        assert_eq!(tracker.on_close(false, false), CloseDecision::Exhausted);
        tracker.reset();
        assert!(matches!(
            tracker.on_close(false, false),
            CloseDecision::Schedule(_)
        ));
    }
}
