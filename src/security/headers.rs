//! Outbound identity and trace headers.
//!
//! # Responsibilities
//! - Identify this caller to every downstream service (X-Service-Name)
//! - Attach the target service's API key (X-API-Key)
//! - Propagate trace context (X-Trace-Id, X-Span-Id)
//!
//! # Design Decisions
//! - Keys are looked up by target service name, captured once at startup
//! - A missing key is omitted, never sent empty; the callee decides
//! - API keys never appear in logs or Debug output

use std::collections::HashMap;

use crate::config::MeshConfig;
use crate::observability::tracer::TraceContext;

pub const API_KEY_HEADER: &str = "X-API-Key";
pub const SERVICE_NAME_HEADER: &str = "X-Service-Name";
pub const TRACE_ID_HEADER: &str = "X-Trace-Id";
pub const SPAN_ID_HEADER: &str = "X-Span-Id";
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// Caller identity plus per-target API keys.
#[derive(Clone, Default)]
pub struct ServiceCredentials {
    caller_name: String,
    api_keys: HashMap<String, String>,
}

impl std::fmt::Debug for ServiceCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut services: Vec<_> = self.api_keys.keys().collect();
        services.sort();
        f.debug_struct("ServiceCredentials")
            .field("caller_name", &self.caller_name)
            .field("keys_for", &services)
            .finish()
    }
}

impl ServiceCredentials {
    pub fn new(caller_name: impl Into<String>) -> Self {
        Self {
            caller_name: caller_name.into(),
            api_keys: HashMap::new(),
        }
    }

    pub fn from_config(config: &MeshConfig) -> Self {
        let mut credentials = Self::new(config.caller_name.clone());
        for service in &config.services {
            if !service.api_key.is_empty() {
                credentials.set_api_key(&service.name, &service.api_key);
            }
        }
        credentials
    }

    pub fn with_api_key(mut self, service: &str, key: &str) -> Self {
        self.set_api_key(service, key);
        self
    }

    pub fn set_api_key(&mut self, service: &str, key: &str) {
        self.api_keys.insert(service.to_string(), key.to_string());
    }

    pub fn caller_name(&self) -> &str {
        &self.caller_name
    }

    pub fn api_key_for(&self, service: &str) -> Option<&str> {
        self.api_keys.get(service).map(String::as_str)
    }

    /// Headers for a call to `target`, in a stable order.
    pub fn outbound_headers(&self, target: &str, trace: Option<&TraceContext>) -> Vec<(&'static str, String)> {
        let mut headers = vec![
            ("Content-Type", CONTENT_TYPE_JSON.to_string()),
            (SERVICE_NAME_HEADER, self.caller_name.clone()),
        ];
        if let Some(key) = self.api_key_for(target) {
            headers.push((API_KEY_HEADER, key.to_string()));
        }
        if let Some(ctx) = trace {
            headers.push((TRACE_ID_HEADER, ctx.trace_id.clone()));
            headers.push((SPAN_ID_HEADER, ctx.span_id.clone()));
        }
        headers
    }
}
