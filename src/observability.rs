use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: bookings committed by create.
pub const BOOKINGS_CREATED_TOTAL: &str = "roomcore_bookings_created_total";

/// Counter: bookings transitioned to CANCELLED.
pub const BOOKINGS_CANCELLED_TOTAL: &str = "roomcore_bookings_cancelled_total";

/// Counter: pending bookings approved into ACTIVE.
pub const BOOKINGS_APPROVED_TOTAL: &str = "roomcore_bookings_approved_total";

/// Counter: creates rejected because the slot was taken.
pub const BOOKING_CONFLICTS_TOTAL: &str = "roomcore_booking_conflicts_total";

/// Counter: mutations rejected for lack of ownership/role.
pub const AUTH_FAILURES_TOTAL: &str = "roomcore_auth_failures_total";

/// Counter: create attempts retried after a transient store failure.
pub const CREATE_RETRIES_TOTAL: &str = "roomcore_create_retries_total";

/// Histogram: create latency in seconds, retries included.
pub const CREATE_DURATION_SECONDS: &str = "roomcore_create_duration_seconds";

// ── USE metrics (resource utilization) ──────────────────────────

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "roomcore_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "roomcore_wal_flush_batch_size";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus metrics exporter");
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
}

/// Install the fmt tracing subscriber. For embedders that don't bring their own.
pub fn init_tracing() {
    tracing_subscriber::fmt::init();
}
