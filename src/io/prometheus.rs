//! Prometheus metrics HTTP endpoint
//!
//! Exposes kiosk metrics in Prometheus text format at /metrics and a liveness
//! probe at /health. Uses hyper for the HTTP server.

use crate::infra::metrics::{Metrics, MetricsSummary, METRICS_BUCKET_BOUNDS, METRICS_NUM_BUCKETS};
use bytes::Bytes;
use http_body_util::Full;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::fmt::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};

/// Write a monotonic counter with site label
fn write_counter(output: &mut String, name: &str, help: &str, site: &str, val: u64) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} counter");
    let _ = writeln!(output, "{name}{{site=\"{site}\"}} {val}");
}

/// Write a histogram metric with buckets, sum, and count
fn write_histogram(
    output: &mut String,
    name: &str,
    help: &str,
    site: &str,
    buckets: &[u64; METRICS_NUM_BUCKETS],
    sum: u64,
) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} histogram");

    let mut cumulative = 0u64;
    for (i, &bound) in METRICS_BUCKET_BOUNDS.iter().enumerate() {
        cumulative += buckets[i];
        let _ = writeln!(output, "{name}_bucket{{site=\"{site}\",le=\"{bound}\"}} {cumulative}");
    }
    cumulative += buckets[METRICS_NUM_BUCKETS - 1];
    let _ = writeln!(output, "{name}_bucket{{site=\"{site}\",le=\"+Inf\"}} {cumulative}");
    let _ = writeln!(output, "{name}_sum{{site=\"{site}\"}} {sum}");
    let _ = writeln!(output, "{name}_count{{site=\"{site}\"}} {cumulative}");
}

/// Format metrics in Prometheus text exposition format
fn format_prometheus_metrics(summary: &MetricsSummary, site: &str) -> String {
    let mut output = String::with_capacity(4096);

    let counters: [(&str, &str, u64); 10] = [
        ("kiosk_scans_total", "Successful decodes observed", summary.scans_observed),
        ("kiosk_decode_failures_total", "Decode misses reported by the scanner", summary.decode_failures),
        ("kiosk_scans_suppressed_total", "Decodes dropped as duplicates", summary.scans_suppressed),
        (
            "kiosk_scans_rejected_no_session_total",
            "Scans refused because no session was selected",
            summary.scans_rejected_no_session,
        ),
        ("kiosk_checkins_total", "Check-in requests issued", summary.checkins_sent),
        ("kiosk_checkins_succeeded_total", "Check-ins answered with success styling", summary.checkins_succeeded),
        ("kiosk_checkins_denied_total", "Check-ins answered with failure styling", summary.checkins_denied),
        ("kiosk_checkins_failed_total", "Check-ins that failed in transport", summary.checkins_failed),
        ("kiosk_stale_responses_total", "Responses overtaken by a newer request", summary.stale_responses),
        ("kiosk_syncs_total", "Sync requests issued", summary.syncs_sent),
    ];
    for (name, help, val) in counters {
        write_counter(&mut output, name, help, site, val);
    }

    write_histogram(
        &mut output,
        "kiosk_checkin_latency_ms",
        "Check-in round trip latency in milliseconds",
        site,
        &summary.latency_buckets,
        summary.latency_sum_ms,
    );

    output
}

/// Handle HTTP requests
async fn handle_request(
    req: Request<hyper::body::Incoming>,
    metrics: Arc<Metrics>,
    site_id: Arc<String>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let response = match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") => {
            let body = format_prometheus_metrics(&metrics.report(), &site_id);
            Response::builder()
                .status(StatusCode::OK)
                .header("Content-Type", "text/plain; version=0.0.4; charset=utf-8")
                .body(Full::new(Bytes::from(body)))
        }
        (&Method::GET, "/health") => {
            Response::builder().status(StatusCode::OK).body(Full::new(Bytes::from("ok")))
        }
        _ => Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Full::new(Bytes::from("Not Found"))),
    };
    Ok(response.unwrap_or_else(|_| Response::new(Full::new(Bytes::new()))))
}

/// Start the Prometheus metrics HTTP server
pub async fn start_metrics_server(
    port: u16,
    metrics: Arc<Metrics>,
    site_id: String,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    let site_id = Arc::new(site_id);

    info!(port = %port, site = %site_id, "prometheus_metrics_server_started");

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let io = TokioIo::new(stream);
                        let metrics = metrics.clone();
                        let site_id = site_id.clone();

                        tokio::spawn(async move {
                            let service = service_fn(move |req| {
                                handle_request(req, metrics.clone(), site_id.clone())
                            });

                            if let Err(e) = http1::Builder::new()
                                .serve_connection(io, service)
                                .await
                            {
                                error!(error = %e, "prometheus_http_error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "prometheus_accept_error");
                    }
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!("prometheus_metrics_server_shutdown");
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_prometheus_metrics() {
        let metrics = Metrics::new();
        metrics.record_scan_observed();
        metrics.record_checkin_sent();
        metrics.record_checkin_completed(true, 30);
        metrics.record_checkin_failed(20_000);

        let output = format_prometheus_metrics(&metrics.report(), "front-desk");

        assert!(output.contains("kiosk_scans_total{site=\"front-desk\"} 1"));
        assert!(output.contains("kiosk_checkins_total{site=\"front-desk\"} 1"));
        assert!(output.contains("kiosk_checkins_failed_total{site=\"front-desk\"} 1"));
        assert!(output.contains("kiosk_checkin_latency_ms_bucket{site=\"front-desk\",le=\"25\"} 0"));
        assert!(output.contains("kiosk_checkin_latency_ms_bucket{site=\"front-desk\",le=\"50\"} 1"));
        assert!(output.contains("kiosk_checkin_latency_ms_bucket{site=\"front-desk\",le=\"+Inf\"} 2"));
        assert!(output.contains("kiosk_checkin_latency_ms_count{site=\"front-desk\"} 2"));
    }
}
