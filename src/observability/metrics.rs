//! Metrics collection and exposition.
//!
//! # Metrics
//! - `detector_probes_total` (counter): probe outcomes by result
//! - `detector_reconciles_total` (counter): reconcile passes by event and outcome
//! - `detector_reconcile_duration_seconds` (histogram): reconcile latency
//! - `detector_status_conflicts_exhausted_total` (counter): status writes abandoned after retries
//! - `detector_queue_depth` (gauge): items waiting in the work queue
//! - `detector_requeues_total` (counter): rate-limited requeues
//! - `detector_tracked_endpoints` (gauge): distinct endpoints being polled
//! - `detector_queries_total` (counter): query responses by status
//!
//! # Design Decisions
//! - Recording is a no-op until a recorder is installed, so library code and
//!   tests never need to check whether metrics are enabled

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Instant;

/// Start the Prometheus scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_probe(healthy: bool) {
    let result = if healthy { "healthy" } else { "unhealthy" };
    counter!("detector_probes_total", "result" => result).increment(1);
}

pub fn record_reconcile(event: &'static str, success: bool, start: Instant) {
    let outcome = if success { "success" } else { "error" };
    counter!("detector_reconciles_total", "event" => event, "outcome" => outcome).increment(1);
    histogram!("detector_reconcile_duration_seconds", "event" => event).record(start.elapsed().as_secs_f64());
}

pub fn record_conflict_exhausted() {
    counter!("detector_status_conflicts_exhausted_total").increment(1);
}

pub fn set_queue_depth(depth: usize) {
    gauge!("detector_queue_depth").set(depth as f64);
}

pub fn record_requeue() {
    counter!("detector_requeues_total").increment(1);
}

pub fn set_tracked_endpoints(count: usize) {
    gauge!("detector_tracked_endpoints").set(count as f64);
}

pub fn record_query(status: u16) {
    counter!("detector_queries_total", "status" => status.to_string()).increment(1);
}
