//! Resilient service client.
//!
//! # Call Flow
//! ```text
//! call(service, request)
//!     → resolve endpoint (unknown / missing URL → configuration error, no retry)
//!     → breaker.try_acquire()
//!         → rejected → fallback or CircuitOpen
//!     → attempt loop (each attempt under its own deadline)
//!         → retryable failure and attempts left → sleep(backoff) → retry
//!     → settle the breaker once for the whole call
//!     → success → populate fallback cache
//!     → failure → fallback or Transport error
//! ```
//!
//! # Design Decisions
//! - The breaker counts calls, not attempts: retries happen inside one admission
//! - A half-open trial gets exactly one attempt
//! - 4xx answers prove the service is up; they only count against the breaker
//!   when `count_client_errors` is set
//! - Errors that reach the caller carry service, path, attempt count and the
//!   last underlying failure

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{MeshConfig, TimeoutConfig};
use crate::discovery::ServiceResolver;
use crate::observability::metrics;
use crate::observability::tracer::TraceContext;
use crate::resilience::circuit_breaker::{BreakerPermit, BreakerSnapshot, CircuitBreakerRegistry};
use crate::resilience::error::{MeshError, MeshResult, TransportError};
use crate::resilience::fallback::{FallbackCache, FallbackPolicy, FallbackSource};
use crate::resilience::retries::RetryPolicy;
use crate::resilience::timeouts::with_deadline;
use crate::security::ServiceCredentials;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
        }
    }
}

/// One attempt as handed to the transport.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub service: String,
    pub url: String,
    pub method: HttpMethod,
    pub headers: Vec<(&'static str, String)>,
    pub body: Option<Value>,
    pub timeout: Duration,
}

/// What the transport got back, whatever the status.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Value,
}

impl TransportResponse {
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Sends a single attempt. Implementations must not retry.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: OutboundRequest) -> Result<TransportResponse, TransportError>;
}

/// `reqwest`-backed transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(config: &TimeoutConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_ms))
            .build()
            .map_err(|e| TransportError::Request(e.to_string()))?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: OutboundRequest) -> Result<TransportResponse, TransportError> {
        let mut builder = self
            .client
            .request(request.method.into(), &request.url)
            .timeout(request.timeout);
        for (name, value) in &request.headers {
            builder = builder.header(*name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout(request.timeout)
            } else if e.is_builder() {
                TransportError::Request(e.to_string())
            } else {
                TransportError::Connect(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let bytes = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout(request.timeout)
            } else {
                TransportError::Connect(e.to_string())
            }
        })?;

        let body = if bytes.is_empty() {
            Value::Null
        } else if (200..300).contains(&status) {
            serde_json::from_slice(&bytes).map_err(|e| TransportError::Decode(e.to_string()))?
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };

        Ok(TransportResponse { status, body })
    }
}

/// A call to a service, with optional per-call policies.
#[derive(Debug, Clone, Default)]
pub struct ServiceRequest {
    pub path: String,
    pub method: HttpMethod,
    pub body: Option<Value>,
    /// Per-attempt deadline; the client default applies when unset.
    pub timeout: Option<Duration>,
    /// Retry policy; the client default applies when unset.
    pub retry: Option<RetryPolicy>,
    pub fallback: FallbackPolicy,
}

impl ServiceRequest {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method,
            ..Self::default()
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, path)
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(HttpMethod::Post, path).with_body(body)
    }

    pub fn put(path: impl Into<String>, body: Value) -> Self {
        Self::new(HttpMethod::Put, path).with_body(body)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, path)
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn with_fallback(mut self, fallback: FallbackPolicy) -> Self {
        self.fallback = fallback;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceResponse {
    pub status: u16,
    pub body: Value,
    /// Transport attempts made; zero when the breaker rejected the call.
    pub attempts: u32,
    /// Set when the body is a substitute.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback: Option<FallbackSource>,
}

impl ServiceResponse {
    pub fn is_fallback(&self) -> bool {
        self.fallback.is_some()
    }
}

pub struct ResilientClient {
    resolver: Arc<dyn ServiceResolver>,
    transport: Arc<dyn Transport>,
    breakers: CircuitBreakerRegistry,
    cache: FallbackCache,
    credentials: ServiceCredentials,
    default_retry: RetryPolicy,
    default_timeout: Duration,
}

impl ResilientClient {
    pub fn new(resolver: Arc<dyn ServiceResolver>, transport: Arc<dyn Transport>, config: &MeshConfig) -> Self {
        Self {
            resolver,
            transport,
            breakers: CircuitBreakerRegistry::new(config.circuit_breaker.clone()),
            cache: FallbackCache::new(),
            credentials: ServiceCredentials::from_config(config),
            default_retry: RetryPolicy::from(&config.retries),
            default_timeout: Duration::from_millis(config.timeouts.request_ms),
        }
    }

    pub fn with_credentials(mut self, credentials: ServiceCredentials) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn default_retry(&self) -> &RetryPolicy {
        &self.default_retry
    }

    pub fn breaker_snapshot(&self, service: &str) -> Option<BreakerSnapshot> {
        self.breakers.get(service).map(|b| b.snapshot())
    }

    pub fn breaker_snapshots(&self) -> Vec<BreakerSnapshot> {
        self.breakers.snapshots()
    }

    /// Issue `request` to `service` with breaker, retry and fallback applied.
    pub async fn call(
        &self,
        service: &str,
        request: ServiceRequest,
        trace: Option<&TraceContext>,
    ) -> MeshResult<ServiceResponse> {
        let endpoint = self
            .resolver
            .resolve(service)
            .ok_or_else(|| MeshError::UnknownService(service.to_string()))?;
        if endpoint.url.trim().is_empty() {
            return Err(MeshError::MissingUrl(service.to_string()));
        }

        let breaker = self.breakers.get_or_create(service);
        let permit = match breaker.try_acquire() {
            Ok(permit) => permit,
            Err(rejected) => {
                tracing::debug!(
                    service = %service,
                    path = %request.path,
                    state = %rejected.state,
                    "Circuit breaker rejected call"
                );
                let error = MeshError::CircuitOpen {
                    service: service.to_string(),
                    path: request.path.clone(),
                    last_error: rejected.last_error,
                };
                return self.fallback_or(service, &request.fallback, error, 0).await;
            }
        };

        let mut policy = request.retry.clone().unwrap_or_else(|| self.default_retry.clone());
        if permit.is_trial() {
            policy.max_attempts = 1;
        }

        let outbound = OutboundRequest {
            service: service.to_string(),
            url: endpoint.url_for(&request.path),
            method: request.method,
            headers: self.credentials.outbound_headers(service, trace),
            body: request.body.clone(),
            timeout: request.timeout.unwrap_or(self.default_timeout),
        };

        let (result, attempts) = self.send_with_retry(&outbound, &policy).await;
        match result {
            Ok(response) => {
                permit.record_success();
                if let Some(key) = request.fallback.active_cache_key() {
                    self.cache.store(key, response.body.clone());
                }
                Ok(ServiceResponse {
                    status: response.status,
                    body: response.body,
                    attempts,
                    fallback: None,
                })
            }
            Err(error) => {
                self.settle_failure(permit, &error);
                tracing::warn!(
                    service = %service,
                    method = %request.method,
                    path = %request.path,
                    attempts,
                    error = %error,
                    "Service call failed"
                );
                let error = MeshError::Transport {
                    service: service.to_string(),
                    path: request.path.clone(),
                    attempts,
                    source: error,
                };
                self.fallback_or(service, &request.fallback, error, attempts).await
            }
        }
    }

    async fn send_with_retry(
        &self,
        request: &OutboundRequest,
        policy: &RetryPolicy,
    ) -> (Result<TransportResponse, TransportError>, u32) {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let result = with_deadline(request.timeout, self.transport.send(request.clone()))
                .await
                .and_then(|response| {
                    if response.is_success() {
                        Ok(response)
                    } else {
                        Err(TransportError::Status {
                            status: response.status,
                            body: body_excerpt(&response.body),
                        })
                    }
                });

            let error = match result {
                Ok(response) => return (Ok(response), attempt),
                Err(error) => error,
            };
            if attempt >= policy.max_attempts || !error.is_retryable(policy) {
                return (Err(error), attempt);
            }

            let delay = policy.delay_for(attempt);
            tracing::info!(
                service = %request.service,
                attempt,
                max_attempts = policy.max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Retrying request"
            );
            metrics::record_retry(&request.service);
            tokio::time::sleep(delay).await;
        }
    }

    fn settle_failure(&self, permit: BreakerPermit, error: &TransportError) {
        match error {
            TransportError::Request(_) => permit.release(),
            e if e.is_client_error() && !self.breakers.config().count_client_errors => {
                if permit.is_trial() {
                    permit.record_success();
                } else {
                    permit.release();
                }
            }
            e => permit.record_failure(e.clone()),
        }
    }

    async fn fallback_or(
        &self,
        service: &str,
        policy: &FallbackPolicy,
        error: MeshError,
        attempts: u32,
    ) -> MeshResult<ServiceResponse> {
        let Some((body, source)) = self.cache.resolve(service, policy).await else {
            return Err(error);
        };
        tracing::warn!(
            service = %service,
            source = source.as_str(),
            error = %error,
            "Serving fallback response"
        );
        metrics::record_fallback(service, source);
        Ok(ServiceResponse {
            status: 200,
            body,
            attempts,
            fallback: Some(source),
        })
    }
}

fn body_excerpt(body: &Value) -> String {
    const LIMIT: usize = 512;
    let text = match body {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    if text.len() <= LIMIT {
        return text;
    }
    let mut end = LIMIT;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &text[..end])
}
