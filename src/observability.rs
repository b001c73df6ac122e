use std::net::SocketAddr;

use tracing_subscriber::EnvFilter;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: reservations created.
pub const RESERVATIONS_CREATED_TOTAL: &str = "hallpass_reservations_created_total";

/// Counter: create/update attempts rejected because of an overlap.
pub const RESERVATION_CONFLICTS_TOTAL: &str = "hallpass_reservation_conflicts_total";

/// Counter: reservations soft-cancelled.
pub const RESERVATIONS_CANCELLED_TOTAL: &str = "hallpass_reservations_cancelled_total";

// ── Session metrics ─────────────────────────────────────────────

/// Counter: session tokens issued.
pub const TOKENS_ISSUED_TOTAL: &str = "hallpass_tokens_issued_total";

/// Counter: tokens blacklisted at logout.
pub const TOKENS_REVOKED_TOTAL: &str = "hallpass_tokens_revoked_total";

/// Counter: requests whose token failed validation at the filter.
pub const AUTH_REJECTED_TOTAL: &str = "hallpass_auth_rejected_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "hallpass_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "hallpass_wal_flush_batch_size";

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

/// Install the fmt tracing subscriber, honouring `RUST_LOG` and
/// defaulting to `info`. Safe to call more than once.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
