//! Scan debounce state
//!
//! Decides whether a decoded text should become a check-in. Two policies:
//! - Window: forward immediately, then ignore the same text until the window
//!   elapses or the display cycle releases it.
//! - Trailing: a new text becomes the pending candidate and is forwarded only
//!   after the delay passes without another *different* text replacing it.
//!
//! All time is passed in, so the state machine runs without a runtime.

use crate::infra::config::DebouncePolicy;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Candidate waiting for the trailing delay to elapse
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingScan {
    pub text: String,
    pub fire_at: Instant,
}

/// Outcome of observing one decode
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanDecision {
    /// Send it now
    Forward(String),
    /// Became (or replaced) the trailing candidate
    Scheduled { fire_at: Instant },
    /// Duplicate of the accepted or pending text
    Suppressed,
}

/// Process-local debounce state, owned by the coordinator
#[derive(Debug, Clone)]
pub struct ScanState {
    policy: DebouncePolicy,
    trailing_delay: Duration,
    window: Duration,
    last_accepted_text: Option<String>,
    last_accepted_at: Option<Instant>,
    pending: Option<PendingScan>,
}

impl ScanState {
    pub fn new(policy: DebouncePolicy, trailing_delay: Duration, window: Duration) -> Self {
        Self {
            policy,
            trailing_delay,
            window,
            last_accepted_text: None,
            last_accepted_at: None,
            pending: None,
        }
    }

    pub fn policy(&self) -> DebouncePolicy {
        self.policy
    }

    /// Apply one successful decode
    pub fn observe(&mut self, text: &str, now: Instant) -> ScanDecision {
        match self.policy {
            DebouncePolicy::Window => self.observe_window(text, now),
            DebouncePolicy::Trailing => self.observe_trailing(text, now),
        }
    }

    fn observe_window(&mut self, text: &str, now: Instant) -> ScanDecision {
        if self.last_accepted_text.as_deref() == Some(text) {
            if let Some(at) = self.last_accepted_at {
                if now.saturating_duration_since(at) < self.window {
                    return ScanDecision::Suppressed;
                }
            }
        }
        self.accept(text, now);
        ScanDecision::Forward(text.to_string())
    }

    fn observe_trailing(&mut self, text: &str, now: Instant) -> ScanDecision {
        let is_pending = self.pending.as_ref().is_some_and(|p| p.text == text);
        if is_pending || self.last_accepted_text.as_deref() == Some(text) {
            return ScanDecision::Suppressed;
        }

        let fire_at = now + self.trailing_delay;
        if let Some(prev) = self.pending.replace(PendingScan { text: text.to_string(), fire_at }) {
            debug!(replaced = %prev.text, candidate = %text, "debounce_candidate_replaced");
        }
        ScanDecision::Scheduled { fire_at }
    }

    /// Fire the trailing timer if due, returning the text to forward
    pub fn poll_pending(&mut self, now: Instant) -> Option<String> {
        let due = self.pending.as_ref().is_some_and(|p| p.fire_at <= now);
        if !due {
            return None;
        }
        let pending = self.pending.take()?;
        self.accept(&pending.text, now);
        Some(pending.text)
    }

    /// Drop the trailing candidate without forwarding it
    pub fn cancel_pending(&mut self) -> Option<String> {
        self.pending.take().map(|p| p.text)
    }

    /// Earliest instant at which `poll_pending` can yield
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|p| p.fire_at)
    }

    /// End of a display cycle: the accepted text may be scanned again.
    /// A trailing candidate for another code stays scheduled.
    pub fn release(&mut self) {
        self.last_accepted_text = None;
        self.last_accepted_at = None;
        if let Some(pending) = &self.pending {
            debug!(candidate = %pending.text, "debounce_candidate_kept_on_release");
        }
    }

    fn accept(&mut self, text: &str, now: Instant) {
        self.last_accepted_text = Some(text.to_string());
        self.last_accepted_at = Some(now);
    }

    pub fn last_accepted_text(&self) -> Option<&str> {
        self.last_accepted_text.as_deref()
    }

    pub fn last_accepted_at(&self) -> Option<Instant> {
        self.last_accepted_at
    }

    pub fn pending(&self) -> Option<&PendingScan> {
        self.pending.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn millis(ms: u64) -> Duration {
        Duration::from_millis(ms)
    }

    fn window_state() -> ScanState {
        ScanState::new(DebouncePolicy::Window, millis(2000), millis(5000))
    }

    fn trailing_state() -> ScanState {
        ScanState::new(DebouncePolicy::Trailing, millis(2000), millis(5000))
    }

    #[test]
    fn test_window_forwards_first_scan() {
        let mut state = window_state();
        let t0 = Instant::now();
        assert_eq!(state.observe("5551234567", t0), ScanDecision::Forward("5551234567".into()));
        assert_eq!(state.last_accepted_text(), Some("5551234567"));
        assert_eq!(state.last_accepted_at(), Some(t0));
    }

    #[test]
    fn test_window_suppresses_repeat_inside_window() {
        let mut state = window_state();
        let t0 = Instant::now();
        state.observe("A", t0);

        // 10 reads per second for just under the window
        for i in 1..50 {
            assert_eq!(state.observe("A", t0 + millis(i * 100)), ScanDecision::Suppressed);
        }
        // Suppressed reads do not extend the window
        assert_eq!(state.last_accepted_at(), Some(t0));
    }

    #[test]
    fn test_window_forwards_again_after_window() {
        let mut state = window_state();
        let t0 = Instant::now();
        state.observe("A", t0);
        assert_eq!(state.observe("A", t0 + millis(5000)), ScanDecision::Forward("A".into()));
    }

    #[test]
    fn test_window_different_code_not_blocked() {
        let mut state = window_state();
        let t0 = Instant::now();
        state.observe("A", t0);
        assert_eq!(state.observe("B", t0 + millis(10)), ScanDecision::Forward("B".into()));
        // A is no longer the last accepted text, so it passes again too
        assert_eq!(state.observe("A", t0 + millis(20)), ScanDecision::Forward("A".into()));
    }

    #[test]
    fn test_window_release_unlocks_same_code() {
        let mut state = window_state();
        let t0 = Instant::now();
        state.observe("A", t0);
        state.release();
        assert_eq!(state.last_accepted_text(), None);
        assert_eq!(state.observe("A", t0 + millis(100)), ScanDecision::Forward("A".into()));
    }

    #[test]
    fn test_trailing_schedules_and_fires() {
        let mut state = trailing_state();
        let t0 = Instant::now();
        assert_eq!(
            state.observe("A", t0),
            ScanDecision::Scheduled { fire_at: t0 + millis(2000) }
        );
        assert_eq!(state.poll_pending(t0 + millis(1999)), None);
        assert_eq!(state.poll_pending(t0 + millis(2000)), Some("A".to_string()));
        assert_eq!(state.last_accepted_text(), Some("A"));
        assert_eq!(state.next_deadline(), None);
    }

    #[test]
    fn test_trailing_repeat_does_not_reset_timer() {
        let mut state = trailing_state();
        let t0 = Instant::now();
        state.observe("A", t0);
        assert_eq!(state.observe("A", t0 + millis(1500)), ScanDecision::Suppressed);
        assert_eq!(state.next_deadline(), Some(t0 + millis(2000)));
    }

    #[test]
    fn test_trailing_different_code_replaces_candidate() {
        let mut state = trailing_state();
        let t0 = Instant::now();
        state.observe("A", t0);
        assert_eq!(
            state.observe("B", t0 + millis(1000)),
            ScanDecision::Scheduled { fire_at: t0 + millis(3000) }
        );
        assert_eq!(state.poll_pending(t0 + millis(2000)), None);
        assert_eq!(state.poll_pending(t0 + millis(3000)), Some("B".to_string()));
    }

    #[test]
    fn test_trailing_accepted_code_ignored_until_release() {
        let mut state = trailing_state();
        let t0 = Instant::now();
        state.observe("A", t0);
        state.poll_pending(t0 + millis(2000));

        assert_eq!(state.observe("A", t0 + millis(60_000)), ScanDecision::Suppressed);
        state.release();
        assert!(matches!(state.observe("A", t0 + millis(60_100)), ScanDecision::Scheduled { .. }));
    }

    #[test]
    fn test_release_keeps_pending_candidate() {
        let mut state = trailing_state();
        let t0 = Instant::now();
        state.observe("A", t0);
        state.poll_pending(t0 + millis(2000));
        state.observe("B", t0 + millis(2500));

        state.release();
        assert_eq!(state.last_accepted_at(), None);
        assert_eq!(state.pending().map(|p| p.text.as_str()), Some("B"));
        assert_eq!(state.next_deadline(), Some(t0 + millis(4500)));
        assert_eq!(state.poll_pending(t0 + millis(4500)).as_deref(), Some("B"));
        assert_eq!(state.last_accepted_text(), Some("B"));
    }

    #[test]
    fn test_cancel_pending() {
        let mut state = trailing_state();
        let t0 = Instant::now();
        state.observe("A", t0);
        assert_eq!(state.cancel_pending(), Some("A".to_string()));
        assert_eq!(state.poll_pending(t0 + millis(5000)), None);
        assert_eq!(state.last_accepted_text(), None);
    }
}
