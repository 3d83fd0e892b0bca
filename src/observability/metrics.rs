//! Metrics export.
//!
//! # Responsibilities
//! - Mirror call, retry, fallback, breaker and health activity into the
//!   `metrics` facade
//! - Expose a Prometheus-compatible scrape endpoint
//!
//! # Metrics
//! - `service_mesh_requests_total` (counter): calls by service, outcome
//! - `service_mesh_request_errors_total` (counter): failed calls by service
//! - `service_mesh_request_duration_seconds` (histogram): call latency
//! - `service_mesh_service_health` (gauge): 1=healthy, 0=unhealthy, -1=unknown
//! - `service_mesh_circuit_state` (gauge): 0=closed, 1=open, 2=half-open
//! - `service_mesh_retries_total` (counter): retry attempts by service
//! - `service_mesh_fallbacks_total` (counter): fallbacks by service, source
//!
//! # Design Decisions
//! - Recording is a no-op until a recorder is installed, so library users and
//!   tests pay nothing
//! - Labels are service names, never paths, to keep cardinality bounded

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Duration;

use crate::health::state::HealthStatus;
use crate::resilience::circuit_breaker::CircuitState;
use crate::resilience::fallback::FallbackSource;

/// Install the Prometheus recorder with an HTTP listener on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Prometheus metrics exporter started"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install Prometheus metrics exporter"),
    }
}

pub fn record_service_request(service: &str, latency: Duration, is_error: bool) {
    let outcome = if is_error { "error" } else { "ok" };
    counter!(
        "service_mesh_requests_total",
        "service" => service.to_string(),
        "outcome" => outcome
    )
    .increment(1);
    if is_error {
        counter!("service_mesh_request_errors_total", "service" => service.to_string()).increment(1);
    }
    histogram!("service_mesh_request_duration_seconds", "service" => service.to_string())
        .record(latency.as_secs_f64());
}

pub fn record_service_health(service: &str, status: HealthStatus) {
    let value = match status.for_metrics() {
        HealthStatus::Healthy => 1.0,
        HealthStatus::Unknown => -1.0,
        _ => 0.0,
    };
    gauge!("service_mesh_service_health", "service" => service.to_string()).set(value);
}

pub fn record_breaker_state(service: &str, state: CircuitState) {
    gauge!("service_mesh_circuit_state", "service" => service.to_string()).set(state.as_gauge());
}

pub fn record_retry(service: &str) {
    counter!("service_mesh_retries_total", "service" => service.to_string()).increment(1);
}

pub fn record_fallback(service: &str, source: FallbackSource) {
    counter!(
        "service_mesh_fallbacks_total",
        "service" => service.to_string(),
        "source" => source.as_str()
    )
    .increment(1);
}
