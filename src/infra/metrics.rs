//! Lock-free metrics collection and periodic reporting
//!
//! Uses atomics so the coordinator loop and the HTTP tasks can record without
//! contention. Reporting swaps the periodic counters; monotonic totals are
//! never reset.
//!
//! NOTE: All atomics use Relaxed ordering. These are statistical
//! counters only. Do NOT use these atomics for coordination or logic decisions.

use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

/// Check-in latency bucket boundaries (milliseconds)
/// Buckets: ≤25, ≤50, ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, >12800
const BUCKET_BOUNDS: [u64; 10] = [25, 50, 100, 200, 400, 800, 1600, 3200, 6400, 12800];
const NUM_BUCKETS: usize = 11;

/// Compute bucket index for a latency value using binary search
#[inline]
fn bucket_index(latency_ms: u64) -> usize {
    BUCKET_BOUNDS.partition_point(|&bound| bound < latency_ms)
}

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

/// Load all bucket values without resetting
#[inline]
fn load_buckets(buckets: &[AtomicU64; NUM_BUCKETS]) -> [u64; NUM_BUCKETS] {
    let mut result = [0u64; NUM_BUCKETS];
    for (i, bucket) in buckets.iter().enumerate() {
        result[i] = bucket.load(Ordering::Relaxed);
    }
    result
}

/// Lock-free metrics collector
pub struct Metrics {
    /// Successful decodes seen by the coordinator (monotonic)
    scans_observed: AtomicU64,
    /// Decode misses reported by the scanner (monotonic)
    decode_failures: AtomicU64,
    /// Decodes dropped as duplicates (monotonic)
    scans_suppressed: AtomicU64,
    /// Scans refused because no session was selected (monotonic)
    scans_rejected_no_session: AtomicU64,
    /// Check-in requests issued (monotonic)
    checkins_sent: AtomicU64,
    /// Responses with success styling (monotonic)
    checkins_succeeded: AtomicU64,
    /// Responses with failure styling (monotonic)
    checkins_denied: AtomicU64,
    /// Transport or decode failures (monotonic)
    checkins_failed: AtomicU64,
    /// Responses overtaken by a newer request (monotonic)
    stale_responses: AtomicU64,
    /// Sync requests issued (monotonic)
    syncs_sent: AtomicU64,
    /// Check-in latency histogram (monotonic)
    checkin_latency_buckets: [AtomicU64; NUM_BUCKETS],
    checkin_latency_sum_ms: AtomicU64,
    /// Max latency since last report (reset on report)
    checkin_latency_max_ms: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            scans_observed: AtomicU64::new(0),
            decode_failures: AtomicU64::new(0),
            scans_suppressed: AtomicU64::new(0),
            scans_rejected_no_session: AtomicU64::new(0),
            checkins_sent: AtomicU64::new(0),
            checkins_succeeded: AtomicU64::new(0),
            checkins_denied: AtomicU64::new(0),
            checkins_failed: AtomicU64::new(0),
            stale_responses: AtomicU64::new(0),
            syncs_sent: AtomicU64::new(0),
            checkin_latency_buckets: Default::default(),
            checkin_latency_sum_ms: AtomicU64::new(0),
            checkin_latency_max_ms: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn record_scan_observed(&self) {
        self.scans_observed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_decode_failure(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_scan_suppressed(&self) {
        self.scans_suppressed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_scan_rejected_no_session(&self) {
        self.scans_rejected_no_session.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_checkin_sent(&self) {
        self.checkins_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a completed check-in round trip
    #[inline]
    pub fn record_checkin_completed(&self, success: bool, latency_ms: u64) {
        if success {
            self.checkins_succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.checkins_denied.fetch_add(1, Ordering::Relaxed);
        }
        self.record_checkin_latency(latency_ms);
    }

    #[inline]
    pub fn record_checkin_failed(&self, latency_ms: u64) {
        self.checkins_failed.fetch_add(1, Ordering::Relaxed);
        self.record_checkin_latency(latency_ms);
    }

    #[inline]
    fn record_checkin_latency(&self, latency_ms: u64) {
        self.checkin_latency_buckets[bucket_index(latency_ms)].fetch_add(1, Ordering::Relaxed);
        self.checkin_latency_sum_ms.fetch_add(latency_ms, Ordering::Relaxed);
        update_atomic_max(&self.checkin_latency_max_ms, latency_ms);
    }

    #[inline]
    pub fn record_stale_response(&self) {
        self.stale_responses.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_sync_sent(&self) {
        self.syncs_sent.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn checkins_sent(&self) -> u64 {
        self.checkins_sent.load(Ordering::Relaxed)
    }

    /// Snapshot all counters; resets only the periodic max
    pub fn report(&self) -> MetricsSummary {
        let latency_buckets = load_buckets(&self.checkin_latency_buckets);
        let latency_count: u64 = latency_buckets.iter().sum();
        let latency_sum = self.checkin_latency_sum_ms.load(Ordering::Relaxed);
        let latency_avg_ms = if latency_count > 0 { latency_sum / latency_count } else { 0 };

        MetricsSummary {
            scans_observed: self.scans_observed.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            scans_suppressed: self.scans_suppressed.load(Ordering::Relaxed),
            scans_rejected_no_session: self.scans_rejected_no_session.load(Ordering::Relaxed),
            checkins_sent: self.checkins_sent.load(Ordering::Relaxed),
            checkins_succeeded: self.checkins_succeeded.load(Ordering::Relaxed),
            checkins_denied: self.checkins_denied.load(Ordering::Relaxed),
            checkins_failed: self.checkins_failed.load(Ordering::Relaxed),
            stale_responses: self.stale_responses.load(Ordering::Relaxed),
            syncs_sent: self.syncs_sent.load(Ordering::Relaxed),
            latency_buckets,
            latency_sum_ms: latency_sum,
            latency_avg_ms,
            latency_max_ms: self.checkin_latency_max_ms.swap(0, Ordering::Relaxed),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Number of histogram buckets (exported for Prometheus formatting)
pub const METRICS_NUM_BUCKETS: usize = NUM_BUCKETS;

/// Exported bucket bounds for Prometheus formatting
pub const METRICS_BUCKET_BOUNDS: [u64; 10] = BUCKET_BOUNDS;

#[derive(Debug, Clone)]
pub struct MetricsSummary {
    pub scans_observed: u64,
    pub decode_failures: u64,
    pub scans_suppressed: u64,
    pub scans_rejected_no_session: u64,
    pub checkins_sent: u64,
    pub checkins_succeeded: u64,
    pub checkins_denied: u64,
    pub checkins_failed: u64,
    pub stale_responses: u64,
    pub syncs_sent: u64,
    /// Check-in latency histogram, bounds in `METRICS_BUCKET_BOUNDS` (ms)
    pub latency_buckets: [u64; NUM_BUCKETS],
    pub latency_sum_ms: u64,
    pub latency_avg_ms: u64,
    /// Max since the previous report
    pub latency_max_ms: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            scans = %self.scans_observed,
            decode_failures = %self.decode_failures,
            suppressed = %self.scans_suppressed,
            no_session = %self.scans_rejected_no_session,
            checkins = %self.checkins_sent,
            succeeded = %self.checkins_succeeded,
            denied = %self.checkins_denied,
            failed = %self.checkins_failed,
            stale = %self.stale_responses,
            avg_latency_ms = %self.latency_avg_ms,
            max_latency_ms = %self.latency_max_ms,
            "metrics"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_new() {
        let metrics = Metrics::new();
        assert_eq!(metrics.checkins_sent(), 0);
        assert_eq!(metrics.scans_observed.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_bucket_index() {
        assert_eq!(bucket_index(0), 0);
        assert_eq!(bucket_index(25), 0);
        assert_eq!(bucket_index(26), 1);
        assert_eq!(bucket_index(12800), 9);
        assert_eq!(bucket_index(60000), 10);
    }

    #[test]
    fn test_report() {
        let metrics = Metrics::new();

        metrics.record_scan_observed();
        metrics.record_scan_observed();
        metrics.record_scan_suppressed();
        metrics.record_checkin_sent();
        metrics.record_checkin_completed(true, 100);
        metrics.record_checkin_sent();
        metrics.record_checkin_failed(300);

        let summary = metrics.report();
        assert_eq!(summary.scans_observed, 2);
        assert_eq!(summary.scans_suppressed, 1);
        assert_eq!(summary.checkins_sent, 2);
        assert_eq!(summary.checkins_succeeded, 1);
        assert_eq!(summary.checkins_failed, 1);
        assert_eq!(summary.latency_avg_ms, 200);
        assert_eq!(summary.latency_max_ms, 300);

        // Max is periodic, totals are not
        let again = metrics.report();
        assert_eq!(again.latency_max_ms, 0);
        assert_eq!(again.checkins_sent, 2);
    }

    #[test]
    fn test_concurrent_recording() {
        use std::sync::Arc;
        use std::thread;

        let metrics = Arc::new(Metrics::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let m = metrics.clone();
                thread::spawn(move || {
                    for _ in 0..1000 {
                        m.record_scan_observed();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(metrics.report().scans_observed, 4000);
    }
}
