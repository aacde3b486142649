//! Scan coordinator - the kiosk's single event loop
//!
//! Owns the debounce state and the result presenter; nothing else writes to
//! either. The loop multiplexes:
//! - decoder events (scans, misses, scanner status)
//! - check-in completions from spawned request tasks
//! - the trailing-debounce and dwell deadlines
//! - session changes and shutdown
//!
//! Requests are numbered. A completion older than the one already on screen
//! is discarded, so the display always follows issue order.

use crate::domain::error::{KioskError, Result};
use crate::domain::types::{
    CheckinRequest, CheckinResponse, DecoderEvent, ResultStyle, ScannerStatus, ScreenState,
    CHECKIN_FAILURE_MESSAGE, NO_SESSION_NOTICE,
};
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::io::backend::CheckinService;
use crate::services::debounce::{ScanDecision, ScanState};
use crate::services::presenter::ResultPresenter;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, trace, warn};

/// Minimum spacing between "no session" warnings in the log
const NO_SESSION_WARN_INTERVAL: Duration = Duration::from_secs(1);

/// Result of one check-in request, sent back to the loop
#[derive(Debug)]
pub struct CheckinOutcome {
    pub seq: u64,
    pub request: CheckinRequest,
    pub result: Result<CheckinResponse>,
    pub latency_ms: u64,
}

pub struct ScanCoordinator<C: CheckinService + 'static> {
    state: ScanState,
    presenter: ResultPresenter,
    client: Arc<C>,
    metrics: Arc<Metrics>,
    session_required: bool,
    session_rx: watch::Receiver<Option<String>>,
    screen_tx: watch::Sender<ScreenState>,
    scanner_status: ScannerStatus,
    notice: Option<String>,
    outcome_tx: mpsc::Sender<CheckinOutcome>,
    outcome_rx: mpsc::Receiver<CheckinOutcome>,
    /// Sequence number of the most recently issued request
    next_seq: u64,
    /// Sequence number of the response currently (or last) on screen
    shown_seq: u64,
    in_flight: usize,
    last_no_session_warn: Option<Instant>,
}

impl<C: CheckinService + 'static> ScanCoordinator<C> {
    pub fn new(
        config: &Config,
        client: Arc<C>,
        session_rx: watch::Receiver<Option<String>>,
        metrics: Arc<Metrics>,
    ) -> Self {
        let (screen_tx, _rx) = watch::channel(ScreenState {
            session: session_rx.borrow().clone(),
            ..ScreenState::default()
        });
        let (outcome_tx, outcome_rx) = mpsc::channel(64);

        info!(
            policy = %config.debounce_policy().as_str(),
            trailing_delay_ms = %config.trailing_delay().as_millis(),
            window_ms = %config.window().as_millis(),
            dwell_ms = %config.dwell().as_millis(),
            session_required = %config.session_required(),
            "coordinator_created"
        );

        Self {
            state: ScanState::new(config.debounce_policy(), config.trailing_delay(), config.window()),
            presenter: ResultPresenter::new(config.dwell()),
            client,
            metrics,
            session_required: config.session_required(),
            session_rx,
            screen_tx,
            scanner_status: ScannerStatus::Loading,
            notice: None,
            outcome_tx,
            outcome_rx,
            next_seq: 0,
            shown_seq: 0,
            in_flight: 0,
            last_no_session_warn: None,
        }
    }

    /// Receive every screen change
    pub fn subscribe(&self) -> watch::Receiver<ScreenState> {
        self.screen_tx.subscribe()
    }

    /// Run until shutdown, or until the decoder is gone and nothing is left to show
    pub async fn run(
        mut self,
        mut events: mpsc::Receiver<DecoderEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!("coordinator_started");
        let mut decoder_open = true;
        let mut session_open = true;

        loop {
            let deadline = self.next_deadline();
            if !decoder_open && self.in_flight == 0 && deadline.is_none() {
                info!("coordinator_idle_after_input_closed");
                return;
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("coordinator_shutdown");
                        return;
                    }
                }
                event = events.recv(), if decoder_open => match event {
                    Some(event) => self.handle_event(event, Instant::now()),
                    None => {
                        info!("decoder_channel_closed");
                        decoder_open = false;
                    }
                },
                Some(outcome) = self.outcome_rx.recv() => {
                    self.handle_outcome(outcome, Instant::now());
                }
                changed = self.session_rx.changed(), if session_open => {
                    if changed.is_err() {
                        session_open = false;
                    } else {
                        self.handle_session_change();
                    }
                }
                _ = sleep_until_opt(deadline) => {
                    self.handle_timer(Instant::now());
                }
            }
        }
    }

    /// Earliest pending timer: trailing debounce or dwell expiry
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.state.next_deadline(), self.presenter.next_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    pub fn handle_event(&mut self, event: DecoderEvent, now: Instant) {
        match event {
            DecoderEvent::Started => {
                info!("scanner_ready");
                self.scanner_status = ScannerStatus::Ready;
                self.publish();
            }
            DecoderEvent::Decoded(scan) => {
                // Events may sit in the channel briefly; never let time run backwards
                let observed_at = scan.observed_at.min(now);
                self.on_decoded(&scan.text, observed_at);
            }
            DecoderEvent::Failed(e) => {
                self.metrics.record_decode_failure();
                trace!(reason = %e.reason, "scan_miss");
            }
            DecoderEvent::Unavailable(reason) => {
                error!(reason = %reason, "scanner_unavailable");
                self.scanner_status = ScannerStatus::Failed(format!(
                    "Error starting scanner: {}. Please check the scanner connection and restart.",
                    reason
                ));
                self.publish();
            }
        }
    }

    /// One successful decode
    pub fn on_decoded(&mut self, text: &str, now: Instant) {
        self.metrics.record_scan_observed();

        if let Err(e) = self.session_class() {
            self.reject_no_session(text, &e, now);
            return;
        }

        match self.state.observe(text, now) {
            ScanDecision::Forward(text) => self.dispatch(text),
            ScanDecision::Scheduled { fire_at } => {
                debug!(
                    phone_number = %text,
                    delay_ms = %fire_at.saturating_duration_since(now).as_millis(),
                    "scan_scheduled"
                );
            }
            ScanDecision::Suppressed => {
                self.metrics.record_scan_suppressed();
                trace!(phone_number = %text, "scan_duplicate_ignored");
            }
        }
    }

    pub fn handle_timer(&mut self, now: Instant) {
        let trailing_due = self.state.next_deadline().is_some_and(|d| d <= now);
        if trailing_due {
            if let Err(e) = self.session_class() {
                if let Some(text) = self.state.cancel_pending() {
                    self.reject_no_session(&text, &e, now);
                }
            } else if let Some(text) = self.state.poll_pending(now) {
                self.dispatch(text);
            }
        }

        if self.presenter.poll_expired(now) {
            // The lock belongs to the latest request; a newer one still in
            // flight keeps it until its own result has been shown.
            if self.shown_seq == self.next_seq {
                self.state.release();
                info!("display_cycle_complete");
            } else {
                debug!(
                    shown_seq = %self.shown_seq,
                    latest_seq = %self.next_seq,
                    "display_cycle_complete_lock_kept"
                );
            }
            self.publish();
        }
    }

    pub fn handle_outcome(&mut self, outcome: CheckinOutcome, now: Instant) {
        self.in_flight = self.in_flight.saturating_sub(1);

        let (message, style) = match outcome.result {
            Ok(response) => {
                let style = response.style();
                self.metrics
                    .record_checkin_completed(style == ResultStyle::Success, outcome.latency_ms);
                info!(
                    seq = %outcome.seq,
                    phone_number = %outcome.request.phone_number,
                    style = %style.as_str(),
                    status = ?response.status,
                    latency_ms = %outcome.latency_ms,
                    "checkin_completed"
                );
                (response.message, style)
            }
            Err(e) => {
                self.metrics.record_checkin_failed(outcome.latency_ms);
                warn!(
                    seq = %outcome.seq,
                    phone_number = %outcome.request.phone_number,
                    error = %e,
                    latency_ms = %outcome.latency_ms,
                    "checkin_failed"
                );
                (CHECKIN_FAILURE_MESSAGE.to_string(), ResultStyle::Failure)
            }
        };

        if outcome.seq <= self.shown_seq {
            self.metrics.record_stale_response();
            debug!(seq = %outcome.seq, shown_seq = %self.shown_seq, "checkin_response_stale");
            return;
        }

        self.shown_seq = outcome.seq;
        self.presenter.show(message, style, now);
        self.publish();
    }

    fn handle_session_change(&mut self) {
        let session = self.session_rx.borrow_and_update().clone();
        if session.is_some() {
            self.notice = None;
        }
        self.publish();
    }

    /// Session class for the next request
    fn session_class(&self) -> Result<Option<String>> {
        let session = self.session_rx.borrow().clone();
        if self.session_required && session.is_none() {
            return Err(KioskError::NoSession);
        }
        Ok(session)
    }

    fn reject_no_session(&mut self, text: &str, reason: &KioskError, now: Instant) {
        self.metrics.record_scan_rejected_no_session();

        let warn_due = self
            .last_no_session_warn
            .map_or(true, |at| now.saturating_duration_since(at) >= NO_SESSION_WARN_INTERVAL);
        if warn_due {
            warn!(phone_number = %text, reason = %reason, "scan_rejected_no_session");
            self.last_no_session_warn = Some(now);
        }

        if self.notice.as_deref() != Some(NO_SESSION_NOTICE) {
            self.notice = Some(NO_SESSION_NOTICE.to_string());
            self.publish();
        }
    }

    /// Issue one check-in request on its own task
    fn dispatch(&mut self, phone_number: String) {
        self.next_seq += 1;
        let seq = self.next_seq;
        let session_class = self.session_class().unwrap_or_default();
        let request = CheckinRequest { phone_number, session_class };

        info!(
            seq = %seq,
            phone_number = %request.phone_number,
            session = ?request.session_class,
            "scan_forwarded"
        );
        self.metrics.record_checkin_sent();
        self.in_flight += 1;

        let client = self.client.clone();
        let outcome_tx = self.outcome_tx.clone();
        tokio::spawn(async move {
            let start = std::time::Instant::now();
            let result = client.checkin(&request).await;
            let latency_ms = start.elapsed().as_millis() as u64;
            let _ = outcome_tx.send(CheckinOutcome { seq, request, result, latency_ms }).await;
        });
    }

    fn publish(&self) {
        let next = ScreenState {
            scanner: self.scanner_status.clone(),
            result: self.presenter.current().cloned(),
            notice: self.notice.clone(),
            session: self.session_rx.borrow().clone(),
        };
        self.screen_tx.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }

    pub fn scan_state(&self) -> &ScanState {
        &self.state
    }

    pub fn presenter(&self) -> &ResultPresenter {
        &self.presenter
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::KioskError;
    use crate::infra::config::DebouncePolicy;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingService {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CheckinService for CountingService {
        async fn checkin(&self, _request: &CheckinRequest) -> Result<CheckinResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(KioskError::Decode("unused".into()))
        }
    }

    fn coordinator(
        config: Config,
        session: Option<&str>,
    ) -> (ScanCoordinator<CountingService>, watch::Sender<Option<String>>) {
        let (session_tx, session_rx) = watch::channel(session.map(str::to_string));
        let client = Arc::new(CountingService { calls: AtomicUsize::new(0) });
        let coordinator = ScanCoordinator::new(&config, client, session_rx, Arc::new(Metrics::new()));
        (coordinator, session_tx)
    }

    fn outcome(seq: u64, message: &str, color: &str) -> CheckinOutcome {
        CheckinOutcome {
            seq,
            request: CheckinRequest { phone_number: "5551234567".into(), session_class: None },
            result: Ok(CheckinResponse {
                message: message.into(),
                screen_color: color.into(),
                status: None,
            }),
            latency_ms: 5,
        }
    }

    #[tokio::test]
    async fn test_missing_session_blocks_and_notifies() {
        let (mut c, _session_tx) = coordinator(Config::default(), None);
        let screen = c.subscribe();

        c.on_decoded("5551234567", Instant::now());

        assert_eq!(c.next_seq, 0);
        assert_eq!(c.in_flight, 0);
        assert_eq!(c.scan_state().last_accepted_text(), None);
        assert_eq!(screen.borrow().notice.as_deref(), Some(NO_SESSION_NOTICE));
    }

    #[tokio::test]
    async fn test_session_not_required_forwards() {
        let config = Config::default().with_sessions(false, &[]);
        let (mut c, _session_tx) = coordinator(config, None);

        c.on_decoded("5551234567", Instant::now());
        assert_eq!(c.next_seq, 1);
        assert_eq!(c.in_flight, 1);
    }

    #[tokio::test]
    async fn test_stale_outcome_discarded() {
        let (mut c, _session_tx) = coordinator(Config::default(), Some("Adults"));
        let now = Instant::now();
        c.next_seq = 2;
        c.in_flight = 2;

        c.handle_outcome(outcome(2, "Second", "green"), now);
        c.handle_outcome(outcome(1, "First", "red"), now);

        let view = c.presenter().current().unwrap();
        assert_eq!(view.message, "Second");
        assert_eq!(view.style, ResultStyle::Success);
        assert_eq!(c.in_flight, 0);
    }

    #[tokio::test]
    async fn test_dwell_expiry_releases_lock() {
        let config = Config::default().with_debounce_policy(DebouncePolicy::Window);
        let (mut c, _session_tx) = coordinator(config, Some("Adults"));
        let t0 = Instant::now();

        c.on_decoded("A", t0);
        c.handle_outcome(outcome(1, "Welcome", "green"), t0);
        assert_eq!(c.scan_state().last_accepted_text(), Some("A"));

        c.handle_timer(t0 + Duration::from_millis(5000));
        assert!(c.presenter().current().is_none());
        assert_eq!(c.scan_state().last_accepted_text(), None);
    }

    #[tokio::test]
    async fn test_dwell_expiry_keeps_lock_of_newer_request() {
        let config = Config::default().with_debounce_policy(DebouncePolicy::Window);
        let (mut c, _session_tx) = coordinator(config, Some("Adults"));
        let t0 = Instant::now();

        c.on_decoded("A", t0);
        c.handle_outcome(outcome(1, "Welcome A", "green"), t0);
        c.on_decoded("B", t0 + Duration::from_millis(4900));
        assert_eq!(c.next_seq, 2);

        // A hides while B is still in flight
        c.handle_timer(t0 + Duration::from_millis(5000));
        assert!(c.presenter().current().is_none());
        assert_eq!(c.scan_state().last_accepted_text(), Some("B"));
        c.on_decoded("B", t0 + Duration::from_millis(5100));
        assert_eq!(c.next_seq, 2);

        c.handle_outcome(outcome(2, "Welcome B", "green"), t0 + Duration::from_millis(5400));
        c.handle_timer(t0 + Duration::from_millis(10_400));
        assert!(c.presenter().current().is_none());
        assert_eq!(c.scan_state().last_accepted_text(), None);
    }

    #[tokio::test]
    async fn test_unavailable_scanner_sets_persistent_status() {
        let (mut c, _session_tx) = coordinator(Config::default(), Some("Adults"));
        let screen = c.subscribe();

        c.handle_event(DecoderEvent::Unavailable("/dev/ttyACM0: not found".into()), Instant::now());
        assert!(matches!(screen.borrow().scanner, ScannerStatus::Failed(ref m) if m.contains("/dev/ttyACM0")));

        c.handle_timer(Instant::now() + Duration::from_secs(60));
        assert!(matches!(screen.borrow().scanner, ScannerStatus::Failed(_)));
    }
}
