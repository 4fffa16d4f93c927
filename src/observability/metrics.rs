//! Metrics collection and exposition.
//!
//! # Metrics
//! - `admission_decisions_total` (counter): by class, outcome
//! - `admission_buckets` (gauge): tracked identities
//! - `admission_evictions_total` (counter): buckets dropped
//! - `admission_overflow_total` (counter): by class, lookups served by the shared overflow bucket
//! - `forward_requests_total` (counter): by result
//! - `forward_upstream_duration_seconds` (histogram): outbound latency
//! - `response_cache_entries` (gauge), `response_cache_evictions_total` (counter)
//! - `http_requests_total` (counter): by route, status
//!
//! Recording is a no-op until a recorder is installed, so library code and
//! tests can call these freely.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter with its own HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_admission(class: &'static str, allowed: bool) {
    let outcome = if allowed { "allowed" } else { "denied" };
    counter!("admission_decisions_total", "class" => class, "outcome" => outcome).increment(1);
}

pub fn record_bucket_count(count: usize) {
    gauge!("admission_buckets").set(count as f64);
}

pub fn record_bucket_evictions(count: usize) {
    counter!("admission_evictions_total").increment(count as u64);
}

pub fn record_bucket_overflow(class: &'static str) {
    counter!("admission_overflow_total", "class" => class).increment(1);
}

pub fn record_forward(result: &'static str) {
    counter!("forward_requests_total", "result" => result).increment(1);
}

pub fn record_upstream_duration(start: Instant) {
    histogram!("forward_upstream_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_cache_size(entries: usize) {
    gauge!("response_cache_entries").set(entries as f64);
}

pub fn record_cache_evictions(count: usize) {
    counter!("response_cache_evictions_total").increment(count as u64);
}

pub fn record_request(route: &'static str, status: u16) {
    counter!("http_requests_total", "route" => route, "status" => status.to_string()).increment(1);
}
