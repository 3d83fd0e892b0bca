//! In-memory service registry.
//!
//! # Responsibilities
//! - Map logical service names to endpoints
//! - Hold the last-known health per service
//! - Resolve endpoints for the resilient client
//!
//! # Design Decisions
//! - One mutex guards the whole map; every operation is O(services)
//! - Readers get copies, never references into the map
//! - Re-registration replaces the record wholesale (health resets to unknown)
//! - Unregistering affects only new lookups; in-flight calls keep their copy

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::health::state::{Health, HealthStatus};
use crate::resilience::error::{MeshError, MeshResult};

/// Where a service can be reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEndpoint {
    pub url: String,
    pub version: String,
    pub capabilities: Vec<String>,
    /// Path probed by the health checker.
    #[serde(default = "default_health_path")]
    pub health_path: String,
}

fn default_health_path() -> String {
    "/health".to_string()
}

impl ServiceEndpoint {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            version: "1.0.0".to_string(),
            capabilities: Vec::new(),
            health_path: default_health_path(),
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_capabilities<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities = capabilities.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_health_path(mut self, path: impl Into<String>) -> Self {
        self.health_path = path.into();
        self
    }

    /// Join a request path onto the base URL.
    pub fn url_for(&self, path: &str) -> String {
        let base = self.url.trim_end_matches('/');
        if path.is_empty() {
            base.to_string()
        } else if path.starts_with('/') {
            format!("{}{}", base, path)
        } else {
            format!("{}/{}", base, path)
        }
    }
}

/// A registered service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceRecord {
    pub name: String,
    pub endpoint: ServiceEndpoint,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health: Option<Health>,
}

impl ServiceRecord {
    pub fn health_status(&self) -> HealthStatus {
        self.health
            .as_ref()
            .map(|h| h.status)
            .unwrap_or(HealthStatus::Unknown)
    }
}

/// Resolves logical service names to endpoints.
pub trait ServiceResolver: Send + Sync {
    fn resolve(&self, name: &str) -> Option<ServiceEndpoint>;
}

/// Thread-safe registry of downstream services.
#[derive(Debug, Default)]
pub struct ServiceRegistry {
    services: Mutex<HashMap<String, ServiceRecord>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the record for `name`.
    pub fn register(&self, name: &str, endpoint: ServiceEndpoint) {
        let record = ServiceRecord {
            name: name.to_string(),
            endpoint,
            status: Some("registered".to_string()),
            health: None,
        };
        let replaced = self.services.lock().insert(name.to_string(), record).is_some();
        tracing::info!(service = %name, replaced, "Service registered");
    }

    /// Remove a service; returns the removed record.
    pub fn unregister(&self, name: &str) -> Option<ServiceRecord> {
        let removed = self.services.lock().remove(name);
        if removed.is_some() {
            tracing::info!(service = %name, "Service unregistered");
        }
        removed
    }

    pub fn get(&self, name: &str) -> Option<ServiceRecord> {
        self.services.lock().get(name).cloned()
    }

    /// All records, sorted by name.
    pub fn list(&self) -> Vec<ServiceRecord> {
        let mut records: Vec<_> = self.services.lock().values().cloned().collect();
        records.sort_by(|a, b| a.name.cmp(&b.name));
        records
    }

    /// Replace the health of a registered service.
    pub fn set_health(&self, name: &str, health: Health) -> MeshResult<()> {
        let mut services = self.services.lock();
        let record = services
            .get_mut(name)
            .ok_or_else(|| MeshError::UnknownService(name.to_string()))?;
        record.status = Some(health.status.as_str().to_string());
        record.health = Some(health);
        Ok(())
    }

    /// Records whose last probe reported healthy.
    pub fn healthy_only(&self) -> Vec<ServiceRecord> {
        self.list()
            .into_iter()
            .filter(|r| r.health_status() == HealthStatus::Healthy)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.services.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ServiceResolver for ServiceRegistry {
    fn resolve(&self, name: &str) -> Option<ServiceEndpoint> {
        self.services.lock().get(name).map(|r| r.endpoint.clone())
    }
}
