use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Duration;

pub static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Installs the Prometheus recorder once per process.
pub fn init_metrics() -> Result<(), BuildError> {
    if METRICS_HANDLE.get().is_some() {
        return Ok(());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    let _ = METRICS_HANDLE.set(handle);
    Ok(())
}

pub fn get_metrics() -> String {
    METRICS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_else(|| "# Metrics recorder not initialized\n".to_string())
}

pub fn record_booking_created(booking_type: &str) {
    counter!("bookings_created_total", "booking_type" => booking_type.to_string()).increment(1);
}

pub fn record_status_change(booking_type: &str, status: &str) {
    counter!(
        "booking_status_changes_total",
        "booking_type" => booking_type.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

pub fn record_gateway_order(outcome: &str, elapsed: Duration) {
    counter!("gateway_orders_total", "outcome" => outcome.to_string()).increment(1);
    histogram!("gateway_order_duration_seconds").record(elapsed.as_secs_f64());
}

/// Outcome of a reconciliation attempt (settled, replayed, partial, duplicate, failed, mismatch).
pub fn record_reconciliation(outcome: &str) {
    counter!("payment_reconciliations_total", "outcome" => outcome.to_string()).increment(1);
}

/// Captured amount in the smallest currency unit.
pub fn record_amount(currency: &str, amount_minor: u64) {
    counter!("payment_amount_total", "currency" => currency.to_string()).increment(amount_minor);
}
