//! Health probes.
//!
//! # Responsibilities
//! - Ask one service whether it is alive
//! - Classify failures so the checker can map them to a status
//!
//! # Design Decisions
//! - Probes are a trait so sweeps can be tested without sockets
//! - The checker owns the deadline; probes may also set their own
//! - 2xx is healthy; any other status, or a timeout, is unhealthy;
//!   an unreachable service is an error

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::discovery::ServiceEndpoint;
use crate::health::state::HealthStatus;
use crate::security::headers::SERVICE_NAME_HEADER;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProbeError {
    #[error("health probe timed out after {0:?}")]
    Timeout(Duration),

    #[error("health probe could not connect: {0}")]
    Connect(String),

    #[error("health probe returned HTTP {0}")]
    Status(u16),
}

impl ProbeError {
    /// Registry status recorded for this failure.
    pub fn health_status(&self) -> HealthStatus {
        match self {
            ProbeError::Timeout(_) | ProbeError::Status(_) => HealthStatus::Unhealthy,
            ProbeError::Connect(_) => HealthStatus::Error,
        }
    }
}

#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn probe(&self, service: &str, endpoint: &ServiceEndpoint) -> Result<(), ProbeError>;
}

/// `GET <url><health_path>` over HTTP.
#[derive(Debug, Clone)]
pub struct HttpHealthProbe {
    client: reqwest::Client,
    caller_name: String,
    timeout: Duration,
}

impl HttpHealthProbe {
    pub fn new(caller_name: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            caller_name: caller_name.into(),
            timeout,
        }
    }

    /// Use a preconfigured client (proxy, TLS or pool settings).
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }
}

#[async_trait]
impl HealthProbe for HttpHealthProbe {
    async fn probe(&self, service: &str, endpoint: &ServiceEndpoint) -> Result<(), ProbeError> {
        let url = endpoint.url_for(&endpoint.health_path);
        tracing::trace!(service = %service, url = %url, "Probing service health");

        let response = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .header("user-agent", "service-mesh-health-check")
            .header(SERVICE_NAME_HEADER, &self.caller_name)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProbeError::Timeout(self.timeout)
                } else {
                    ProbeError::Connect(e.to_string())
                }
            })?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(ProbeError::Status(status.as_u16()))
        }
    }
}
