//! Per-service call metrics.
//!
//! # Responsibilities
//! - Count requests and errors per service
//! - Keep a bounded window of recent latencies and derive avg/p95/p99
//! - Track the last known health status per service
//!
//! # Design Decisions
//! - Percentiles use nearest rank: sorted window indexed at floor(n × q),
//!   clamped to the last sample; no interpolation
//! - Statistics are recomputed on every sample; the window is small and fixed
//! - Every update is mirrored into the Prometheus facade

use dashmap::DashMap;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use crate::config::MetricsConfig;
use crate::health::state::{epoch_millis, HealthStatus};
use crate::observability::metrics;

/// Snapshot of one service's metrics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceMetrics {
    pub service_name: String,
    pub request_count: u64,
    pub error_count: u64,
    pub avg_response_time: f64,
    pub p95: u64,
    pub p99: u64,
    pub health_status: HealthStatus,
    /// Epoch milliseconds.
    pub last_updated: u64,
}

impl ServiceMetrics {
    fn empty(service: &str) -> Self {
        Self {
            service_name: service.to_string(),
            request_count: 0,
            error_count: 0,
            avg_response_time: 0.0,
            p95: 0,
            p99: 0,
            health_status: HealthStatus::Unknown,
            last_updated: epoch_millis(),
        }
    }

    pub fn error_rate(&self) -> f64 {
        if self.request_count == 0 {
            0.0
        } else {
            self.error_count as f64 / self.request_count as f64
        }
    }
}

#[derive(Debug)]
struct ServiceWindow {
    latencies: VecDeque<u64>,
    metrics: ServiceMetrics,
}

/// Nearest-rank percentile of an ascending slice.
fn percentile(sorted: &[u64], quantile: f64) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let index = ((sorted.len() as f64) * quantile).floor() as usize;
    sorted[index.min(sorted.len() - 1)]
}

#[derive(Debug)]
pub struct MetricsCollector {
    window_size: usize,
    services: DashMap<String, ServiceWindow>,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new(&MetricsConfig::default())
    }
}

impl MetricsCollector {
    pub fn new(config: &MetricsConfig) -> Self {
        Self {
            window_size: config.window_size.max(1),
            services: DashMap::new(),
        }
    }

    pub fn record_request(&self, service: &str, latency_ms: u64, is_error: bool) {
        let mut entry = self.services.entry(service.to_string()).or_insert_with(|| ServiceWindow {
            latencies: VecDeque::with_capacity(self.window_size),
            metrics: ServiceMetrics::empty(service),
        });
        let window = entry.value_mut();

        if window.latencies.len() == self.window_size {
            window.latencies.pop_front();
        }
        window.latencies.push_back(latency_ms);

        let m = &mut window.metrics;
        m.request_count += 1;
        if is_error {
            m.error_count += 1;
        }

        let mut sorted: Vec<u64> = window.latencies.iter().copied().collect();
        sorted.sort_unstable();
        m.avg_response_time = sorted.iter().sum::<u64>() as f64 / sorted.len() as f64;
        m.p95 = percentile(&sorted, 0.95);
        m.p99 = percentile(&sorted, 0.99);
        m.last_updated = epoch_millis();
        drop(entry);

        metrics::record_service_request(service, Duration::from_millis(latency_ms), is_error);
    }

    pub fn record_health_status(&self, service: &str, status: HealthStatus) {
        let status = status.for_metrics();
        {
            let mut entry = self.services.entry(service.to_string()).or_insert_with(|| ServiceWindow {
                latencies: VecDeque::with_capacity(self.window_size),
                metrics: ServiceMetrics::empty(service),
            });
            entry.metrics.health_status = status;
            entry.metrics.last_updated = epoch_millis();
        }
        metrics::record_service_health(service, status);
    }

    pub fn get_metrics(&self, service: &str) -> Option<ServiceMetrics> {
        self.services.get(service).map(|w| w.metrics.clone())
    }

    pub fn get_all_metrics(&self) -> HashMap<String, ServiceMetrics> {
        self.services
            .iter()
            .map(|w| (w.key().clone(), w.metrics.clone()))
            .collect()
    }
}
