//! Password-gated roster sync
//!
//! One request per trigger, never retried. The status line reads a pending
//! indicator while the request is in flight.

use crate::domain::types::{
    ResultStyle, ResultView, SyncRequest, SYNC_FAILURE_MESSAGE, SYNC_PENDING_MESSAGE,
};
use crate::infra::metrics::Metrics;
use crate::io::backend::SyncService;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

/// What the sync status line shows
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SyncStatus {
    #[default]
    Idle,
    Pending,
    Done(ResultView),
}

impl SyncStatus {
    pub fn text(&self) -> &str {
        match self {
            SyncStatus::Idle => "",
            SyncStatus::Pending => SYNC_PENDING_MESSAGE,
            SyncStatus::Done(view) => &view.message,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Empty or cancelled password, nothing sent
    Skipped,
    Completed(ResultView),
}

pub struct SyncTrigger<S: SyncService> {
    service: Arc<S>,
    metrics: Arc<Metrics>,
    status_tx: watch::Sender<SyncStatus>,
}

impl<S: SyncService> SyncTrigger<S> {
    pub fn new(service: Arc<S>, metrics: Arc<Metrics>) -> Self {
        let (status_tx, _rx) = watch::channel(SyncStatus::Idle);
        Self { service, metrics, status_tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.status_tx.subscribe()
    }

    /// Run a sync with the password collected from the operator.
    ///
    /// `None` means the prompt was cancelled.
    pub async fn trigger(&self, password: Option<&str>) -> SyncOutcome {
        let password = match password {
            Some(p) if !p.is_empty() => p,
            _ => {
                info!("sync_skipped_no_password");
                return SyncOutcome::Skipped;
            }
        };

        self.status_tx.send_replace(SyncStatus::Pending);
        self.metrics.record_sync_sent();

        let request = SyncRequest { password: password.to_string() };
        let view = match self.service.sync(&request).await {
            Ok(response) => {
                info!(status = %response.status, message = %response.message, "sync_completed");
                let style = response.style();
                ResultView::new(response.message, style)
            }
            Err(e) => {
                warn!(error = %e, "sync_failed");
                ResultView::new(SYNC_FAILURE_MESSAGE, ResultStyle::Failure)
            }
        };

        self.status_tx.send_replace(SyncStatus::Done(view.clone()));
        SyncOutcome::Completed(view)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::{KioskError, Result};
    use crate::domain::types::SyncResponse;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    struct FakeSync {
        calls: AtomicUsize,
        response: Option<SyncResponse>,
    }

    impl FakeSync {
        fn replying(status: &str, message: &str) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                response: Some(SyncResponse { status: status.into(), message: message.into() }),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self { calls: AtomicUsize::new(0), response: None })
        }
    }

    #[async_trait]
    impl SyncService for FakeSync {
        async fn sync(&self, _request: &SyncRequest) -> Result<SyncResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.response.clone().ok_or_else(|| KioskError::Decode("connection reset".into()))
        }
    }

    /// Holds the request open until the test releases it
    #[derive(Default)]
    struct GatedSync {
        gate: Notify,
    }

    #[async_trait]
    impl SyncService for GatedSync {
        async fn sync(&self, _request: &SyncRequest) -> Result<SyncResponse> {
            self.gate.notified().await;
            Ok(SyncResponse {
                status: "success".into(),
                message: "Successfully synced 3 members.".into(),
            })
        }
    }

    #[tokio::test]
    async fn test_status_pending_while_request_in_flight() {
        let service = Arc::new(GatedSync::default());
        let trigger = Arc::new(SyncTrigger::new(service.clone(), Arc::new(Metrics::new())));
        let mut status = trigger.subscribe();

        let task = {
            let trigger = trigger.clone();
            tokio::spawn(async move { trigger.trigger(Some("hunter2")).await })
        };

        status.changed().await.unwrap();
        assert_eq!(*status.borrow_and_update(), SyncStatus::Pending);
        assert_eq!(status.borrow().text(), SYNC_PENDING_MESSAGE);
        assert!(!task.is_finished());

        service.gate.notify_one();
        let outcome = task.await.unwrap();
        let expected = ResultView::new("Successfully synced 3 members.", ResultStyle::Success);
        assert_eq!(outcome, SyncOutcome::Completed(expected.clone()));
        assert_eq!(*status.borrow(), SyncStatus::Done(expected));
    }

    #[tokio::test]
    async fn test_empty_password_sends_nothing() {
        let service = FakeSync::replying("success", "ok");
        let trigger = SyncTrigger::new(service.clone(), Arc::new(Metrics::new()));

        assert_eq!(trigger.trigger(None).await, SyncOutcome::Skipped);
        assert_eq!(trigger.trigger(Some("")).await, SyncOutcome::Skipped);
        assert_eq!(service.calls.load(Ordering::SeqCst), 0);
        assert_eq!(*trigger.subscribe().borrow(), SyncStatus::Idle);
    }

    #[tokio::test]
    async fn test_success_is_green() {
        let service = FakeSync::replying("success", "Successfully synced 12 members.");
        let trigger = SyncTrigger::new(service.clone(), Arc::new(Metrics::new()));

        let outcome = trigger.trigger(Some("hunter2")).await;
        assert_eq!(
            outcome,
            SyncOutcome::Completed(ResultView::new(
                "Successfully synced 12 members.",
                ResultStyle::Success
            ))
        );
        assert_eq!(service.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_error_status_is_red() {
        let service = FakeSync::replying("error", "Unauthorized");
        let trigger = SyncTrigger::new(service, Arc::new(Metrics::new()));

        let outcome = trigger.trigger(Some("wrong")).await;
        assert_eq!(
            outcome,
            SyncOutcome::Completed(ResultView::new("Unauthorized", ResultStyle::Failure))
        );
    }

    #[tokio::test]
    async fn test_transport_failure_is_generic_red_without_retry() {
        let service = FakeSync::failing();
        let trigger = SyncTrigger::new(service.clone(), Arc::new(Metrics::new()));
        let status = trigger.subscribe();

        let outcome = trigger.trigger(Some("hunter2")).await;
        let expected = ResultView::new(SYNC_FAILURE_MESSAGE, ResultStyle::Failure);
        assert_eq!(outcome, SyncOutcome::Completed(expected.clone()));
        assert_eq!(service.calls.load(Ordering::SeqCst), 1);
        assert_eq!(*status.borrow(), SyncStatus::Done(expected));
    }
}
