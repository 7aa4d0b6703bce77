use std::net::SocketAddr;
use std::time::Duration;

use crate::engine::Operation;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total API requests. Labels: operation, status.
pub const REQUESTS_TOTAL: &str = "homestay_requests_total";

/// Histogram: request latency in seconds. Labels: operation.
pub const REQUEST_DURATION_SECONDS: &str = "homestay_request_duration_seconds";

/// Counter: booking requests refused because the dates were taken.
pub const BOOKING_CONFLICTS_TOTAL: &str = "homestay_booking_conflicts_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: listings currently loaded.
pub const LISTINGS_ACTIVE: &str = "homestay_listings_active";

/// Histogram: journal group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "homestay_wal_flush_duration_seconds";

/// Histogram: journal group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "homestay_wal_flush_batch_size";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
/// A failed install is logged and the service carries on without metrics.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    match metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
    {
        Ok(()) => tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics"),
        Err(e) => tracing::error!("failed to install Prometheus exporter on {addr}: {e}"),
    }
}

/// Record one finished API call.
pub fn record_request(op: Operation, status: u16, elapsed: Duration) {
    let operation = op.label();
    metrics::counter!(REQUESTS_TOTAL, "operation" => operation, "status" => status.to_string()).increment(1);
    metrics::histogram!(REQUEST_DURATION_SECONDS, "operation" => operation).record(elapsed.as_secs_f64());
}
