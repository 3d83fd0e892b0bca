//! Monitoring façade.
//!
//! # Responsibilities
//! - Wrap service calls in a span and record their latency and outcome
//! - Aggregate registry health and collector metrics into one snapshot
//! - Own the health checker's lifecycle
//!
//! # Design Decisions
//! - Recording happens in a drop guard, so success, failure, panic and
//!   cancellation all record exactly once
//! - Errors are recorded and returned unchanged

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use crate::discovery::ServiceRegistry;
use crate::health::state::{epoch_millis, HealthStatus, OverallStatus};
use crate::health::HealthChecker;
use crate::observability::tracer::{DistributedTracer, SpanStatus, TraceContext};
use crate::observability::{MetricsCollector, ServiceMetrics};

/// Health of one service as shown in the system snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceHealthSummary {
    pub status: HealthStatus,
    pub response_time_ms: u64,
    /// Epoch milliseconds of the last probe, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_health_check: Option<u64>,
    pub url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemHealth {
    pub overall: OverallStatus,
    pub services: BTreeMap<String, ServiceHealthSummary>,
    pub metrics: BTreeMap<String, ServiceMetrics>,
    pub timestamp: u64,
}

/// Records the call when dropped.
struct CallGuard<'a> {
    tracer: &'a DistributedTracer,
    collector: &'a MetricsCollector,
    service: &'a str,
    span_id: String,
    started: Instant,
    is_error: bool,
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        let elapsed_ms = self.started.elapsed().as_millis() as u64;
        if self.is_error {
            // No-op when the error path already set it.
            if let Some(span) = self.tracer.get_span(&self.span_id) {
                if span.status == SpanStatus::Ok {
                    self.tracer.set_status(&self.span_id, SpanStatus::Error);
                    self.tracer
                        .add_log(&self.span_id, "error", "Operation abandoned", BTreeMap::new());
                }
            }
        }
        let mut tags = BTreeMap::new();
        tags.insert("response.time".to_string(), elapsed_ms.into());
        self.tracer.finish_span(&self.span_id, tags);
        self.collector.record_request(self.service, elapsed_ms, self.is_error);
    }
}

pub struct Monitoring {
    registry: Arc<ServiceRegistry>,
    tracer: Arc<DistributedTracer>,
    collector: Arc<MetricsCollector>,
    health_checker: Arc<HealthChecker>,
}

impl Monitoring {
    pub fn new(
        registry: Arc<ServiceRegistry>,
        tracer: Arc<DistributedTracer>,
        collector: Arc<MetricsCollector>,
        health_checker: Arc<HealthChecker>,
    ) -> Self {
        Self {
            registry,
            tracer,
            collector,
            health_checker,
        }
    }

    pub fn tracer(&self) -> &Arc<DistributedTracer> {
        &self.tracer
    }

    pub fn collector(&self) -> &Arc<MetricsCollector> {
        &self.collector
    }

    pub fn health_checker(&self) -> &Arc<HealthChecker> {
        &self.health_checker
    }

    /// Start background health checks.
    pub async fn initialize(&self) {
        self.health_checker.start().await;
        tracing::info!("Monitoring initialized");
    }

    pub async fn shutdown(&self) {
        self.health_checker.stop().await;
        tracing::info!("Monitoring shut down");
    }

    /// Run `operation` inside a span for `service`, recording latency and
    /// outcome however it exits. The operation receives the span's context
    /// for propagation.
    pub async fn trace_service_call<T, E, F, Fut>(
        &self,
        service: &str,
        operation: &str,
        parent: Option<&TraceContext>,
        f: F,
    ) -> Result<T, E>
    where
        F: FnOnce(TraceContext) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let (span, context) = self.tracer.start_span(operation, service, parent);
        self.tracer.add_tag(&span.span_id, "service.name", service);
        self.tracer.add_tag(&span.span_id, "operation.name", operation);

        let mut guard = CallGuard {
            tracer: &self.tracer,
            collector: &self.collector,
            service,
            span_id: span.span_id.clone(),
            started: Instant::now(),
            is_error: true,
        };

        let result = f(context).await;
        match &result {
            Ok(_) => {
                guard.is_error = false;
                self.tracer
                    .add_log(&span.span_id, "info", "Operation completed successfully", BTreeMap::new());
                tracing::debug!(service = %service, operation = %operation, "Service call completed");
            }
            Err(e) => {
                let mut fields = BTreeMap::new();
                fields.insert("error".to_string(), e.to_string().into());
                self.tracer.add_log(&span.span_id, "error", "Operation failed", fields);
                self.tracer.set_status(&span.span_id, SpanStatus::Error);
                tracing::error!(service = %service, operation = %operation, error = %e, "Service call failed");
            }
        }

        drop(guard);
        result
    }

    /// Registry health plus collector metrics, with an overall verdict.
    pub fn system_health(&self) -> SystemHealth {
        let records = self.registry.list();
        let overall = OverallStatus::from_statuses(records.iter().map(|r| r.health_status()));

        let services = records
            .into_iter()
            .map(|record| {
                let summary = ServiceHealthSummary {
                    status: record.health_status(),
                    response_time_ms: record.health.as_ref().map(|h| h.response_time_ms).unwrap_or(0),
                    last_health_check: record.health.as_ref().map(|h| h.last_checked_at),
                    url: record.endpoint.url,
                };
                (record.name, summary)
            })
            .collect();

        SystemHealth {
            overall,
            services,
            metrics: self.collector.get_all_metrics().into_iter().collect(),
            timestamp: epoch_millis(),
        }
    }
}
