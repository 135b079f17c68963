//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gate_requests_total` (counter): requests by method, status
//! - `gate_request_duration_seconds` (histogram): end-to-end latency
//! - `gate_rejections_total` (counter): admission rejections by reason
//! - `gate_signatures_total` (counter): signed / empty / failed responses
//! - `gate_upstream_errors_total` (counter): transport failures
//! - `gate_rate_limit_entries` (gauge): tracked client identifiers
//!
//! Recording is a no-op until a recorder is installed, so the gate runs
//! fine with metrics disabled.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Start the Prometheus scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => {
            tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter")
        }
    }
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    let status = status.to_string();
    counter!("gate_requests_total", "method" => method.to_string(), "status" => status.clone())
        .increment(1);
    histogram!("gate_request_duration_seconds", "method" => method.to_string(), "status" => status)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_rejection(reason: &'static str) {
    counter!("gate_rejections_total", "reason" => reason).increment(1);
}

pub fn record_signature(outcome: &'static str) {
    counter!("gate_signatures_total", "outcome" => outcome).increment(1);
}

pub fn record_upstream_error() {
    counter!("gate_upstream_errors_total").increment(1);
}

pub fn record_rate_limit_entries(count: usize) {
    gauge!("gate_rate_limit_entries").set(count as f64);
}
