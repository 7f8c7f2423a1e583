//! Metrics collection and exposition.
//!
//! # Metrics
//! - `ingress_passes_total` (counter): reconciliation passes by outcome
//! - `ingress_pass_duration_seconds` (histogram): provider query to publish
//! - `ingress_broadcasts_total` (counter): document changes published
//! - `ingress_deliveries_total` (counter): subscriptions answered by a broadcast
//! - `ingress_pending_subscriptions` (gauge): waiting consumers
//! - `ingress_template_swaps_total` (counter): template updates by outcome
//! - `ingress_applies_total` (counter): applier outcomes
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op, so tests need no setup
//! - The Prometheus exporter serves its own listener, separate from the API

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{error, info};

/// Install the Prometheus recorder and its scrape listener.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(address: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(address).install() {
        Ok(()) => info!(%address, "Prometheus exporter listening"),
        Err(e) => error!(error = %e, "Failed to install Prometheus exporter"),
    }
}

pub fn record_pass(outcome: &'static str, elapsed: Duration) {
    counter!("ingress_passes_total", "outcome" => outcome).increment(1);
    histogram!("ingress_pass_duration_seconds").record(elapsed.as_secs_f64());
}

pub fn record_broadcast(delivered: usize) {
    counter!("ingress_broadcasts_total").increment(1);
    counter!("ingress_deliveries_total").increment(delivered as u64);
}

pub fn record_pending(count: usize) {
    gauge!("ingress_pending_subscriptions").set(count as f64);
}

pub fn record_template_swap(outcome: &'static str) {
    counter!("ingress_template_swaps_total", "outcome" => outcome).increment(1);
}

pub fn record_apply(outcome: &'static str) {
    counter!("ingress_applies_total", "outcome" => outcome).increment(1);
}
