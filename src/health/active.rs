//! Active health checking.
//!
//! # Responsibilities
//! - Periodically probe every registered service
//! - Write results into the registry and the metrics collector
//! - Trace every probe so health activity is itself observable
//!
//! # Design Decisions
//! - Probes within a sweep run concurrently, each under its own deadline,
//!   so one hanging service cannot stall the others
//! - Sweeps never overlap: a timer tick that finds a sweep in progress is
//!   skipped, an on-demand sweep waits for the running one to finish
//! - `start` runs one sweep before arming the timer; `start`/`stop` are idempotent

use futures_util::future::join_all;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use crate::config::HealthCheckConfig;
use crate::discovery::{ServiceRecord, ServiceRegistry};
use crate::health::probe::{HealthProbe, ProbeError};
use crate::health::state::{Health, OverallStatus};
use crate::lifecycle::Shutdown;
use crate::observability::tracer::{DistributedTracer, SpanStatus};
use crate::observability::MetricsCollector;

/// Outcome of probing one service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthCheckResult {
    pub service: String,
    pub url: String,
    pub health: Health,
}

struct RunningLoop {
    shutdown: Shutdown,
    handle: JoinHandle<()>,
}

pub struct HealthChecker {
    registry: Arc<ServiceRegistry>,
    collector: Arc<MetricsCollector>,
    tracer: Arc<DistributedTracer>,
    probe: Arc<dyn HealthProbe>,
    config: HealthCheckConfig,
    running: Mutex<Option<RunningLoop>>,
    sweep_lock: Mutex<()>,
}

impl HealthChecker {
    pub fn new(
        registry: Arc<ServiceRegistry>,
        collector: Arc<MetricsCollector>,
        tracer: Arc<DistributedTracer>,
        probe: Arc<dyn HealthProbe>,
        config: HealthCheckConfig,
    ) -> Self {
        Self {
            registry,
            collector,
            tracer,
            probe,
            config,
            running: Mutex::new(None),
            sweep_lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &HealthCheckConfig {
        &self.config
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    /// Sweep once, then keep sweeping every `interval` until `stop`.
    pub async fn start(self: &Arc<Self>) {
        let mut running = self.running.lock().await;
        if running.is_some() {
            tracing::debug!("Health checker already running");
            return;
        }
        if !self.config.enabled {
            tracing::info!("Active health checks disabled");
            return;
        }

        let interval = self.config.interval().max(Duration::from_millis(1));
        tracing::info!(
            interval_ms = interval.as_millis() as u64,
            timeout_ms = self.config.timeout_ms,
            "Health checker starting"
        );

        self.sweep_once().await;

        let shutdown = Shutdown::new();
        let mut stop_rx = shutdown.subscribe();
        let checker = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = time::interval_at(time::Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        checker.try_sweep().await;
                    }
                    _ = stop_rx.recv() => {
                        tracing::info!("Health checker received shutdown signal, exiting loop");
                        break;
                    }
                }
            }
        });

        *running = Some(RunningLoop { shutdown, handle });
    }

    /// Stop the periodic loop and wait for it to exit.
    pub async fn stop(&self) {
        let Some(running) = self.running.lock().await.take() else {
            return;
        };
        running.shutdown.trigger();
        if let Err(e) = running.handle.await {
            tracing::warn!(error = %e, "Health checker task ended abnormally");
        }
        tracing::info!("Health checker stopped");
    }

    /// Probe every registered service once, after any sweep in progress.
    pub async fn sweep_once(&self) -> Vec<HealthCheckResult> {
        let _sweep = self.sweep_lock.lock().await;
        self.run_sweep().await
    }

    /// Sweep unless one is already running; `None` when skipped.
    pub async fn try_sweep(&self) -> Option<Vec<HealthCheckResult>> {
        let Ok(_sweep) = self.sweep_lock.try_lock() else {
            tracing::debug!("Health sweep still in progress, skipping tick");
            return None;
        };
        Some(self.run_sweep().await)
    }

    async fn run_sweep(&self) -> Vec<HealthCheckResult> {
        let records = self.registry.list();
        let started = Instant::now();
        let results = join_all(records.into_iter().map(|record| self.check_service(record))).await;

        let healthy = results.iter().filter(|r| r.health.is_healthy()).count();
        tracing::debug!(
            services = results.len(),
            healthy,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Health sweep complete"
        );
        results
    }

    async fn check_service(&self, record: ServiceRecord) -> HealthCheckResult {
        let (span, _) = self.tracer.start_span("health_check", &record.name, None);
        let deadline = self.config.timeout();
        let started = Instant::now();

        let result = match time::timeout(deadline, self.probe.probe(&record.name, &record.endpoint)).await {
            Ok(result) => result,
            Err(_) => Err(ProbeError::Timeout(deadline)),
        };
        let response_time_ms = started.elapsed().as_millis() as u64;

        let health = match &result {
            Ok(()) => Health::healthy(response_time_ms),
            Err(e) => {
                tracing::warn!(
                    service = %record.name,
                    url = %record.endpoint.url,
                    error = %e,
                    "Health check failed"
                );
                Health::new(e.health_status(), response_time_ms, Some(e.to_string()))
            }
        };

        if let Err(e) = self.registry.set_health(&record.name, health.clone()) {
            // Unregistered mid-sweep.
            tracing::debug!(service = %record.name, error = %e, "Dropping health result");
        }
        self.collector.record_health_status(&record.name, health.status);

        let span_status = match result {
            Ok(()) => SpanStatus::Ok,
            Err(ProbeError::Timeout(_)) => SpanStatus::Timeout,
            Err(_) => SpanStatus::Error,
        };
        self.tracer.set_status(&span.span_id, span_status);
        let mut tags = BTreeMap::new();
        tags.insert("service.name".to_string(), record.name.clone().into());
        tags.insert("service.url".to_string(), record.endpoint.url.clone().into());
        tags.insert("response.time".to_string(), response_time_ms.into());
        tags.insert("health.status".to_string(), health.status.as_str().into());
        self.tracer.finish_span(&span.span_id, tags);

        HealthCheckResult {
            service: record.name,
            url: record.endpoint.url,
            health,
        }
    }
}

/// `healthy` iff every result is healthy, otherwise `degraded`.
pub fn overall_status(results: &[HealthCheckResult]) -> OverallStatus {
    if results.iter().all(|r| r.health.is_healthy()) {
        OverallStatus::Healthy
    } else {
        OverallStatus::Degraded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MetricsConfig, TracingConfig};
    use crate::discovery::ServiceEndpoint;
    use crate::health::state::HealthStatus;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Hangs for services named "slow", refuses "down", takes 30ms for
    /// "paced", answers everyone else.
    struct ScriptedProbe {
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    #[async_trait]
    impl HealthProbe for ScriptedProbe {
        async fn probe(&self, service: &str, _endpoint: &ServiceEndpoint) -> Result<(), ProbeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match service {
                "slow" => {
                    time::sleep(Duration::from_secs(60)).await;
                    Ok(())
                }
                "down" => Err(ProbeError::Connect("refused".into())),
                "sick" => Err(ProbeError::Status(503)),
                "paced" => {
                    let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    self.max_in_flight.fetch_max(now, Ordering::SeqCst);
                    time::sleep(Duration::from_millis(30)).await;
                    self.in_flight.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                }
                _ => Ok(()),
            }
        }
    }

    fn checker(names: &[&str], interval_ms: u64) -> (Arc<HealthChecker>, Arc<ScriptedProbe>) {
        let registry = Arc::new(ServiceRegistry::new());
        for name in names {
            registry.register(name, ServiceEndpoint::new(format!("http://{}.local", name)));
        }
        let probe = Arc::new(ScriptedProbe {
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        });
        let checker = HealthChecker::new(
            registry,
            Arc::new(MetricsCollector::new(&MetricsConfig::default())),
            Arc::new(DistributedTracer::new(TracingConfig::default())),
            probe.clone(),
            HealthCheckConfig {
                enabled: true,
                interval_ms,
                timeout_ms: 50,
            },
        );
        (Arc::new(checker), probe)
    }

    #[tokio::test]
    async fn test_hanging_probe_does_not_block_sweep() {
        let (checker, _) = checker(&["slow", "recipe-service"], 60_000);

        let started = Instant::now();
        let results = checker.sweep_once().await;
        assert!(started.elapsed() < Duration::from_secs(2));

        let fast = checker.registry.get("recipe-service").unwrap();
        assert_eq!(fast.health_status(), HealthStatus::Healthy);
        let slow = checker.registry.get("slow").unwrap();
        assert_eq!(slow.health_status(), HealthStatus::Unhealthy);
        assert!(slow.health.unwrap().error.unwrap().contains("timed out"));

        assert_eq!(results.len(), 2);
        assert_eq!(overall_status(&results), OverallStatus::Degraded);
    }

    #[tokio::test]
    async fn test_sweep_updates_collector_and_traces() {
        let (checker, _) = checker(&["down", "sick", "ok"], 60_000);
        checker.sweep_once().await;

        assert_eq!(
            checker.registry.get("down").unwrap().health_status(),
            HealthStatus::Error
        );
        let metrics = checker.collector.get_metrics("down").unwrap();
        assert_eq!(metrics.health_status, HealthStatus::Unhealthy);
        assert_eq!(
            checker.collector.get_metrics("ok").unwrap().health_status,
            HealthStatus::Healthy
        );

        let traces = checker.tracer.all_traces();
        assert_eq!(traces.len(), 3);
        let span = traces
            .values()
            .flatten()
            .find(|s| s.service_name == "sick")
            .unwrap();
        assert_eq!(span.tags["health.status"], "unhealthy");
        assert_eq!(span.tags["service.url"], "http://sick.local");
        assert_eq!(span.status, SpanStatus::Error);
        assert!(span.is_finished());
    }

    #[tokio::test]
    async fn test_start_sweeps_immediately_and_is_idempotent() {
        let (checker, probe) = checker(&["ok"], 60_000);

        checker.start().await;
        checker.start().await;
        assert!(checker.is_running().await);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 1);

        checker.stop().await;
        checker.stop().await;
        assert!(!checker.is_running().await);
    }

    #[tokio::test]
    async fn test_loop_keeps_sweeping_until_stopped() {
        let (checker, probe) = checker(&["ok"], 20);
        checker.start().await;
        time::sleep(Duration::from_millis(110)).await;
        checker.stop().await;

        let calls = probe.calls.load(Ordering::SeqCst);
        assert!(calls >= 3, "expected several sweeps, got {}", calls);
        time::sleep(Duration::from_millis(60)).await;
        assert_eq!(probe.calls.load(Ordering::SeqCst), calls);
    }

    #[tokio::test]
    async fn test_concurrent_sweeps_run_one_at_a_time() {
        let (checker, probe) = checker(&["paced"], 60_000);

        let (a, b, c) = tokio::join!(checker.sweep_once(), checker.sweep_once(), checker.sweep_once());
        assert_eq!((a.len(), b.len(), c.len()), (1, 1, 1));
        assert_eq!(probe.calls.load(Ordering::SeqCst), 3);
        assert_eq!(probe.max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_tick_skips_while_sweep_in_progress() {
        let (checker, probe) = checker(&["paced"], 60_000);

        let (first, skipped) = tokio::join!(checker.sweep_once(), async {
            time::sleep(Duration::from_millis(10)).await;
            checker.try_sweep().await
        });
        assert_eq!(first.len(), 1);
        assert!(skipped.is_none());
        assert_eq!(probe.calls.load(Ordering::SeqCst), 1);

        assert_eq!(checker.try_sweep().await.map(|r| r.len()), Some(1));
    }

    #[tokio::test]
    async fn test_disabled_checker_never_starts() {
        let (checker, probe) = checker(&["ok"], 20);
        let disabled = Arc::new(HealthChecker::new(
            checker.registry.clone(),
            checker.collector.clone(),
            checker.tracer.clone(),
            probe.clone(),
            HealthCheckConfig {
                enabled: false,
                ..HealthCheckConfig::default()
            },
        ));
        disabled.start().await;
        assert!(!disabled.is_running().await);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 0);
    }
}
