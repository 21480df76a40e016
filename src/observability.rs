use std::net::SocketAddr;

use metrics_exporter_prometheus::BuildError;

// ── RED metrics (cycle-driven) ───────────────────────────────────

/// Counter: check cycles run. Labels: status (ok, error).
pub const CYCLES_TOTAL: &str = "courtwatch_cycles_total";

/// Histogram: cycle wall time in seconds.
pub const CYCLE_DURATION_SECONDS: &str = "courtwatch_cycle_duration_seconds";

/// Counter: slot snapshot fetches. Labels: status (ok, http, status, empty, malformed, timeout).
pub const FETCH_TOTAL: &str = "courtwatch_fetch_total";

/// Histogram: slot snapshot fetch latency in seconds.
pub const FETCH_DURATION_SECONDS: &str = "courtwatch_fetch_duration_seconds";

/// Counter: slots newly claimed for notification.
pub const SLOTS_NOTIFIED_TOTAL: &str = "courtwatch_slots_notified_total";

/// Counter: message deliveries. Labels: status (ok, error).
pub const DELIVERIES_TOTAL: &str = "courtwatch_deliveries_total";

// ── USE metrics (state size) ─────────────────────────────────────

/// Gauge: slots in the notification ledger.
pub const LEDGER_SIZE: &str = "courtwatch_ledger_size";

/// Gauge: active alerts seen by the last cycle.
pub const ALERTS_ACTIVE: &str = "courtwatch_alerts_active";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// `ok` or `error`, for status labels.
pub fn status_label<T, E>(result: &Result<T, E>) -> &'static str {
    if result.is_ok() { "ok" } else { "error" }
}
