//! Startup orchestration.
//!
//! # Responsibilities
//! - Build every subsystem from one `MeshConfig`
//! - Validate configuration and register the enabled services
//! - Start and stop background health checks
//! - Offer the traced, resilient call path used by application code
//!
//! # Design Decisions
//! - Fail fast: configuration issues make `initialize` an error
//! - Subsystems initialize in order, not concurrently
//! - `initialize` and `shutdown` are idempotent

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::config::{validate_config, MeshConfig};
use crate::discovery::{ServiceEndpoint, ServiceRegistry};
use crate::health::active::overall_status;
use crate::health::state::epoch_millis;
use crate::health::{Health, HealthCheckResult, HealthChecker, HealthProbe, HttpHealthProbe, OverallStatus};
use crate::monitoring::{Monitoring, SystemHealth};
use crate::observability::tracer::TraceContext;
use crate::observability::{DistributedTracer, MetricsCollector};
use crate::resilience::{
    HttpTransport, MeshError, MeshResult, ResilientClient, ServiceRequest, ServiceResponse, Transport,
};

/// Result of an on-demand health sweep.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub overall: OverallStatus,
    pub services: Vec<HealthCheckResult>,
    pub timestamp: u64,
}

/// A configured service as seen by operators.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub name: String,
    pub enabled: bool,
    pub registered: bool,
    pub url: String,
    pub version: String,
    pub capabilities: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health: Option<Health>,
}

/// The assembled mesh: registry, client, tracer, collector and health checker.
pub struct ServiceMesh {
    config: MeshConfig,
    registry: Arc<ServiceRegistry>,
    client: ResilientClient,
    monitoring: Monitoring,
    initialized: Mutex<bool>,
}

impl ServiceMesh {
    /// Build the mesh with the HTTP transport and HTTP health probe.
    pub fn new(config: MeshConfig) -> MeshResult<Self> {
        let transport = HttpTransport::new(&config.timeouts).map_err(|e| MeshError::Config(e.to_string()))?;
        let probe = HttpHealthProbe::new(config.caller_name.clone(), config.health_check.timeout());
        Ok(Self::with_parts(config, Arc::new(transport), Arc::new(probe)))
    }

    /// Build the mesh around a custom transport and probe.
    pub fn with_parts(config: MeshConfig, transport: Arc<dyn Transport>, probe: Arc<dyn HealthProbe>) -> Self {
        let registry = Arc::new(ServiceRegistry::new());
        let tracer = Arc::new(DistributedTracer::new(config.tracing.clone()));
        let collector = Arc::new(MetricsCollector::new(&config.metrics));
        let checker = Arc::new(HealthChecker::new(
            registry.clone(),
            collector.clone(),
            tracer.clone(),
            probe,
            config.health_check.clone(),
        ));
        let client = ResilientClient::new(registry.clone(), transport, &config);
        let monitoring = Monitoring::new(registry.clone(), tracer, collector, checker);

        Self {
            config,
            registry,
            client,
            monitoring,
            initialized: Mutex::new(false),
        }
    }

    pub fn config(&self) -> &MeshConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.registry
    }

    pub fn client(&self) -> &ResilientClient {
        &self.client
    }

    pub fn monitoring(&self) -> &Monitoring {
        &self.monitoring
    }

    pub async fn is_initialized(&self) -> bool {
        *self.initialized.lock().await
    }

    /// Validate, register enabled services, start health checks.
    pub async fn initialize(&self) -> MeshResult<()> {
        let mut initialized = self.initialized.lock().await;
        if *initialized {
            return Ok(());
        }

        let report = validate_config(&self.config);
        for recommendation in &report.recommendations {
            tracing::warn!(recommendation = %recommendation, "Configuration recommendation");
        }
        if !report.is_valid() {
            for issue in &report.issues {
                tracing::error!(issue = %issue, "Configuration issue");
            }
            return Err(MeshError::Config(report.issues.join(", ")));
        }

        for service in self.config.enabled_services() {
            let endpoint = ServiceEndpoint::new(service.url.clone())
                .with_version(service.version.clone())
                .with_capabilities(service.capabilities.clone())
                .with_health_path(service.health_path.clone());
            self.registry.register(&service.name, endpoint);
        }

        self.monitoring.initialize().await;
        *initialized = true;

        tracing::info!(
            environment = self.config.environment.as_str(),
            services = self.registry.len(),
            "Service mesh initialized"
        );
        Ok(())
    }

    pub async fn shutdown(&self) {
        let mut initialized = self.initialized.lock().await;
        if !*initialized {
            return;
        }
        self.monitoring.shutdown().await;
        *initialized = false;
        tracing::info!("Service mesh shut down");
    }

    /// Call `service` through the breaker, retry and fallback path, inside a
    /// span named `operation`. The service's configured timeout is the
    /// per-attempt deadline unless the request sets one.
    pub async fn call(
        &self,
        service: &str,
        operation: &str,
        mut request: ServiceRequest,
        parent: Option<&TraceContext>,
    ) -> MeshResult<ServiceResponse> {
        if request.timeout.is_none() {
            request.timeout = self.config.service(service).map(|s| s.timeout());
        }
        let client = &self.client;
        self.monitoring
            .trace_service_call(service, operation, parent, |ctx| async move {
                client.call(service, request, Some(&ctx)).await
            })
            .await
    }

    /// Run one sweep now, after any sweep in progress, and summarize it.
    pub async fn perform_health_check(&self) -> HealthReport {
        let services = self.monitoring.health_checker().sweep_once().await;
        HealthReport {
            overall: overall_status(&services),
            services,
            timestamp: epoch_millis(),
        }
    }

    pub fn system_health(&self) -> SystemHealth {
        self.monitoring.system_health()
    }

    /// Every configured service, with its registered endpoint and health.
    pub fn service_status(&self) -> Vec<ServiceStatus> {
        self.config
            .services
            .iter()
            .map(|service| {
                let record = self.registry.get(&service.name);
                let (url, version, capabilities) = match &record {
                    Some(r) => (r.endpoint.url.clone(), r.endpoint.version.clone(), r.endpoint.capabilities.clone()),
                    None => (service.url.clone(), service.version.clone(), service.capabilities.clone()),
                };
                ServiceStatus {
                    name: service.name.clone(),
                    enabled: service.enabled,
                    registered: record.is_some(),
                    url,
                    version,
                    capabilities,
                    health: record.and_then(|r| r.health),
                }
            })
            .collect()
    }

    /// Point a registered service at a new base URL. Health resets to unknown.
    pub fn update_service_url(&self, name: &str, url: &str) -> MeshResult<()> {
        let parsed = url::Url::parse(url).map_err(|e| MeshError::Config(format!("invalid URL for {}: {}", name, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(MeshError::Config(format!("URL for {} is not HTTP(S): {}", name, url)));
        }

        let current = self
            .registry
            .get(name)
            .ok_or_else(|| MeshError::UnknownService(name.to_string()))?;
        let endpoint = ServiceEndpoint {
            url: url.to_string(),
            ..current.endpoint
        };
        self.registry.register(name, endpoint);
        tracing::info!(service = %name, url = %url, "Service URL updated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::probe::ProbeError;
    use crate::health::HealthStatus;
    use crate::resilience::{OutboundRequest, TransportError, TransportResponse};
    use async_trait::async_trait;
    use serde_json::json;

    struct EchoTransport;

    #[async_trait]
    impl Transport for EchoTransport {
        async fn send(&self, request: OutboundRequest) -> Result<TransportResponse, TransportError> {
            if request.service == "blog-service" {
                return Err(TransportError::Connect("refused".into()));
            }
            Ok(TransportResponse::new(200, json!({ "url": request.url, "timeout_ms": request.timeout.as_millis() as u64 })))
        }
    }

    struct BlogDown;

    #[async_trait]
    impl HealthProbe for BlogDown {
        async fn probe(&self, service: &str, _endpoint: &ServiceEndpoint) -> Result<(), ProbeError> {
            if service == "blog-service" {
                Err(ProbeError::Status(503))
            } else {
                Ok(())
            }
        }
    }

    fn config() -> MeshConfig {
        let mut config = MeshConfig::default();
        for service in &mut config.services {
            service.api_key = format!("{}-key", service.name);
        }
        config.retries.max_attempts = 1;
        config.health_check.interval_ms = 60_000;
        config
    }

    fn mesh(config: MeshConfig) -> ServiceMesh {
        ServiceMesh::with_parts(config, Arc::new(EchoTransport), Arc::new(BlogDown))
    }

    #[tokio::test]
    async fn test_initialize_registers_enabled_services() {
        let mut config = config();
        config.services.iter_mut().find(|s| s.name == "websocket-service").unwrap().enabled = false;
        let mesh = mesh(config);

        mesh.initialize().await.unwrap();
        mesh.initialize().await.unwrap();
        assert_eq!(mesh.registry().len(), 5);
        assert!(mesh.registry().get("websocket-service").is_none());

        let statuses = mesh.service_status();
        assert_eq!(statuses.len(), 6);
        let ws = statuses.iter().find(|s| s.name == "websocket-service").unwrap();
        assert!(!ws.enabled && !ws.registered);
        let recipes = statuses.iter().find(|s| s.name == "recipe-service").unwrap();
        assert_eq!(recipes.health.as_ref().map(|h| h.status), Some(HealthStatus::Healthy));

        mesh.shutdown().await;
        mesh.shutdown().await;
        assert!(!mesh.is_initialized().await);
    }

    #[tokio::test]
    async fn test_initialize_rejects_invalid_config() {
        let mesh = mesh(MeshConfig::default());
        let err = mesh.initialize().await.unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("Missing API key for recipe-service"));
        assert!(mesh.registry().is_empty());
    }

    #[tokio::test]
    async fn test_call_uses_service_timeout_and_records() {
        let mesh = mesh(config());
        mesh.initialize().await.unwrap();

        let response = mesh
            .call("recipe-service", "recipes.list", ServiceRequest::get("/api/recipes"), None)
            .await
            .unwrap();
        let expected_timeout = mesh.config().service("recipe-service").unwrap().timeout_ms;
        assert_eq!(response.body["timeout_ms"], expected_timeout);

        let err = mesh
            .call("blog-service", "posts.list", ServiceRequest::get("/api/posts"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, MeshError::Transport { .. }));

        let health = mesh.system_health();
        assert_eq!(health.metrics["recipe-service"].request_count, 1);
        assert_eq!(health.metrics["blog-service"].error_count, 1);
        assert_eq!(health.overall, OverallStatus::Degraded);
        mesh.shutdown().await;
    }

    #[tokio::test]
    async fn test_perform_health_check_reports_degraded() {
        let mesh = mesh(config());
        mesh.initialize().await.unwrap();

        let report = mesh.perform_health_check().await;
        assert_eq!(report.services.len(), 6);
        assert_eq!(report.overall, OverallStatus::Degraded);
        let blog = report.services.iter().find(|r| r.service == "blog-service").unwrap();
        assert_eq!(blog.health.status, HealthStatus::Unhealthy);
        mesh.shutdown().await;
    }

    #[tokio::test]
    async fn test_update_service_url() {
        let mesh = mesh(config());
        mesh.initialize().await.unwrap();

        mesh.update_service_url("recipe-service", "http://recipes.internal:9000").unwrap();
        let record = mesh.registry().get("recipe-service").unwrap();
        assert_eq!(record.endpoint.url, "http://recipes.internal:9000");
        assert!(!record.endpoint.capabilities.is_empty());
        assert_eq!(record.health_status(), HealthStatus::Unknown);

        assert!(matches!(
            mesh.update_service_url("ghost", "http://x"),
            Err(MeshError::UnknownService(_))
        ));
        assert!(mesh.update_service_url("recipe-service", "ftp://x").is_err());
        assert!(mesh.update_service_url("recipe-service", "not a url").is_err());
        mesh.shutdown().await;
    }
}
