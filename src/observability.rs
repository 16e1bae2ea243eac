use std::net::SocketAddr;

// ── Request metrics ─────────────────────────────────────────────

/// Counter: booking attempts. Labels: outcome (`booked` or an error code).
pub const BOOKINGS_TOTAL: &str = "meetslot_bookings_total";

/// Histogram: booking latency in seconds, commit included.
pub const BOOKING_DURATION_SECONDS: &str = "meetslot_booking_duration_seconds";

/// Counter: slot listings served.
pub const SLOT_QUERIES_TOTAL: &str = "meetslot_slot_queries_total";

// ── Storage metrics ─────────────────────────────────────────────

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "meetslot_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "meetslot_wal_flush_batch_size";

/// Counter: completed WAL compactions.
pub const WAL_COMPACTIONS_TOTAL: &str = "meetslot_wal_compactions_total";

/// Install the Prometheus exporter on `port`. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}
