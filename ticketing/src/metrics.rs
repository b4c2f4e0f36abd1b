//! Prometheus exporter setup.
//!
//! # Exported Metrics
//!
//! Booking metrics are documented in `ticketing_core::metrics`. This module
//! adds:
//!
//! - `ticketing_webhooks_total{kind}` - verified webhook deliveries by event type
//! - `ticketing_webhook_rejections_total` - deliveries with a bad signature
//! - `ticketing_store_contention_total` - serialization failures and deadlocks
//! - `ticketing_pending_reclaim_runs_total` - expiry sweeps started

use metrics::describe_counter;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use thiserror::Error;

/// Webhook delivery counter
pub const WEBHOOKS_TOTAL: &str = "ticketing_webhooks_total";
/// Webhook rejection counter
pub const WEBHOOK_REJECTIONS_TOTAL: &str = "ticketing_webhook_rejections_total";
/// Expiry sweep counter
pub const RECLAIM_RUNS_TOTAL: &str = "ticketing_pending_reclaim_runs_total";

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to install the exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Register descriptions for every metric the service records.
///
/// Call once at startup, after the recorder is installed.
pub fn register_metrics() {
    ticketing_core::metrics::describe();

    describe_counter!(WEBHOOKS_TOTAL, "Verified webhook deliveries by event type");
    describe_counter!(
        WEBHOOK_REJECTIONS_TOTAL,
        "Webhook deliveries rejected for a missing or invalid signature"
    );
    describe_counter!(
        "ticketing_store_contention_total",
        "Transactions aborted by serialization failure or deadlock"
    );
    describe_counter!(RECLAIM_RUNS_TOTAL, "Pending expiry sweeps started");

    tracing::info!("Business metrics registered");
}

/// Install the Prometheus recorder with an HTTP listener on `addr`.
///
/// # Errors
///
/// Returns [`MetricsError::Install`] if a recorder is already installed or
/// the listener cannot be set up.
pub fn install_exporter(addr: SocketAddr) -> Result<(), MetricsError> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| MetricsError::Install(e.to_string()))?;
    register_metrics();
    tracing::info!(%addr, "Metrics available at http://{addr}/metrics");
    Ok(())
}
