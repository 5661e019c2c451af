use std::net::SocketAddr;

// ── Booking-path metrics ────────────────────────────────────────

/// Counter: bookings successfully created.
pub const BOOKINGS_CREATED_TOTAL: &str = "innkeep_bookings_created_total";

/// Counter: booking attempts refused for an occupied or blocked window.
pub const BOOKING_CONFLICTS_TOTAL: &str = "innkeep_booking_conflicts_total";

/// Counter: rate-rule writes refused by the authoring-time conflict check.
pub const RULE_CONFLICTS_TOTAL: &str = "innkeep_rule_conflicts_total";

/// Counter: pending bookings cancelled after their payment hold lapsed.
pub const PENDING_EXPIRED_TOTAL: &str = "innkeep_pending_expired_total";

// ── Resource metrics ────────────────────────────────────────────

/// Gauge: number of active hotels (loaded engines).
pub const HOTELS_ACTIVE: &str = "innkeep_hotels_active";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "innkeep_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "innkeep_wal_flush_batch_size";

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
