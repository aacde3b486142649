//! Console renderer for headless kiosks
//!
//! Follows the screen state and logs each visible change. The full-screen
//! renderer lives in the `kiosk-tui` binary.

use crate::domain::types::{ScannerStatus, ScreenState};
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Log the difference between two screen states
pub fn render_change(prev: &ScreenState, next: &ScreenState) {
    if prev.scanner != next.scanner {
        match &next.scanner {
            ScannerStatus::Loading => info!("screen_scanner_loading"),
            ScannerStatus::Ready => info!("screen_scanner_ready"),
            ScannerStatus::Failed(message) => error!(message = %message, "screen_scanner_failed"),
        }
    }

    if prev.result != next.result {
        match &next.result {
            Some(view) => {
                info!(style = %view.style.as_str(), message = %view.message, "screen_result")
            }
            None => info!("screen_result_cleared"),
        }
    }

    if prev.notice != next.notice {
        if let Some(notice) = &next.notice {
            warn!(notice = %notice, "screen_notice");
        }
    }

    if prev.session != next.session {
        info!(session = ?next.session, "screen_session");
    }
}

/// Render until the coordinator drops its sender
pub async fn run_console(mut screen: watch::Receiver<ScreenState>) {
    let mut prev = ScreenState::default();
    loop {
        let next = screen.borrow_and_update().clone();
        render_change(&prev, &next);
        prev = next;

        if screen.changed().await.is_err() {
            return;
        }
    }
}
