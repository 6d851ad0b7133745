//! Metrics collection and exposition.
//!
//! # Metrics
//! - `slipcover_requests_total` (counter): requests by method, status
//! - `slipcover_request_duration_seconds` (histogram): latency by method
//! - `slipcover_control_signals_total` (counter): short-circuits by stage, status
//! - `slipcover_upstream_errors_total` (counter): failed backend exchanges

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Instant;

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    metrics::counter!(
        "slipcover_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!("slipcover_request_duration_seconds", "method" => method.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_signal(stage: &'static str, status: u16) {
    metrics::counter!(
        "slipcover_control_signals_total",
        "stage" => stage,
        "status" => status.to_string()
    )
    .increment(1);
}

pub fn record_upstream_error() {
    metrics::counter!("slipcover_upstream_errors_total").increment(1);
}
