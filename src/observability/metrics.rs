//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): requests by method, status, path kind
//! - `proxy_request_duration_seconds` (histogram): end-to-end latency
//! - `proxy_cache_events_total` (counter): hit / miss / store / skip
//! - `proxy_rewrites_total` (counter): bodies that went through substitution
//! - `proxy_errors_total` (counter): error boundary conversions by kind
//! - `proxy_tunnels_total` (counter): CONNECT outcomes
//!
//! Recording is a no-op until a recorder is installed, so library users
//! and tests never need to initialize anything.

use std::net::SocketAddr;
use std::time::Instant;

use ::metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape listener.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => {
            describe_metrics();
            tracing::info!(address = %addr, "Metrics endpoint listening");
        }
        Err(e) => {
            tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter");
        }
    }
}

fn describe_metrics() {
    describe_counter!("proxy_requests_total", "Total requests handled by the proxy");
    describe_histogram!("proxy_request_duration_seconds", "End-to-end request latency in seconds");
    describe_counter!("proxy_cache_events_total", "Cache lookups and stores by outcome");
    describe_counter!("proxy_rewrites_total", "Response bodies rewritten");
    describe_counter!("proxy_errors_total", "Requests answered by the error boundary");
    describe_counter!("proxy_tunnels_total", "CONNECT tunnels by outcome");
}

/// Record a completed request.
pub fn record_request(method: &str, status: u16, path_kind: &'static str, start: Instant) {
    counter!(
        "proxy_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "path_kind" => path_kind
    )
    .increment(1);
    histogram!("proxy_request_duration_seconds", "path_kind" => path_kind)
        .record(start.elapsed().as_secs_f64());
}

/// Record a cache event (`hit`, `miss`, `store`, `skip`).
pub fn record_cache_event(event: &'static str) {
    counter!("proxy_cache_events_total", "event" => event).increment(1);
}

/// Record a body rewrite.
pub fn record_rewrite() {
    counter!("proxy_rewrites_total").increment(1);
}

/// Record an error boundary conversion.
pub fn record_error(kind: &'static str) {
    counter!("proxy_errors_total", "kind" => kind).increment(1);
}

/// Record a tunnel outcome (`established`, `failed`).
pub fn record_tunnel(outcome: &'static str) {
    counter!("proxy_tunnels_total", "outcome" => outcome).increment(1);
}
