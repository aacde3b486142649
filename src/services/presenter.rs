//! Result presenter - shows a styled message for a fixed dwell time
//!
//! Last write wins: every `show` replaces the message and restarts the dwell
//! deadline, so an older deadline can never clear a newer message.

use crate::domain::types::{ResultStyle, ResultView};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug)]
pub struct ResultPresenter {
    dwell: Duration,
    current: Option<ResultView>,
    hide_at: Option<Instant>,
}

impl ResultPresenter {
    pub fn new(dwell: Duration) -> Self {
        Self { dwell, current: None, hide_at: None }
    }

    /// Display a message, replacing whatever is visible
    pub fn show(&mut self, message: impl Into<String>, style: ResultStyle, now: Instant) {
        let view = ResultView::new(message, style);
        debug!(style = %style.as_str(), message = %view.message, "result_shown");
        self.current = Some(view);
        self.hide_at = Some(now + self.dwell);
    }

    /// Clear the display if the dwell deadline has passed.
    ///
    /// Returns true exactly once per uninterrupted dwell window.
    pub fn poll_expired(&mut self, now: Instant) -> bool {
        match self.hide_at {
            Some(deadline) if deadline <= now => {
                self.current = None;
                self.hide_at = None;
                debug!("result_hidden");
                true
            }
            _ => false,
        }
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.hide_at
    }

    pub fn current(&self) -> Option<&ResultView> {
        self.current.as_ref()
    }

    pub fn is_visible(&self) -> bool {
        self.current.is_some()
    }
}
