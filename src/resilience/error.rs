//! Error taxonomy for outbound service calls.

use std::time::Duration;
use thiserror::Error;

use crate::resilience::retries::RetryPolicy;

/// A single transport attempt failed.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TransportError {
    /// The attempt exceeded its deadline.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Connection refused, reset, DNS failure, ...
    #[error("connection error: {0}")]
    Connect(String),

    /// The service answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The response body could not be decoded.
    #[error("invalid response body: {0}")]
    Decode(String),

    /// The request could not be built or sent for a non-network reason.
    #[error("request error: {0}")]
    Request(String),
}

impl TransportError {
    /// Network failures and listed statuses are retryable; everything else fails fast.
    pub fn is_retryable(&self, policy: &RetryPolicy) -> bool {
        match self {
            TransportError::Timeout(_) | TransportError::Connect(_) => true,
            TransportError::Status { status, .. } => policy.retryable_status_codes.contains(status),
            TransportError::Decode(_) | TransportError::Request(_) => false,
        }
    }

    /// 4xx answers mean the service is up but rejected the request.
    pub fn is_client_error(&self) -> bool {
        matches!(self, TransportError::Status { status, .. } if (400..500).contains(status))
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Errors surfaced to callers of the mesh.
#[derive(Debug, Error)]
pub enum MeshError {
    /// No service with this name is registered.
    #[error("service '{0}' is not registered")]
    UnknownService(String),

    /// The service is registered without a usable URL.
    #[error("service '{0}' has no URL configured")]
    MissingUrl(String),

    /// All attempts failed and no fallback applied.
    #[error("request to {service}{path} failed after {attempts} attempt(s): {source}")]
    Transport {
        service: String,
        path: String,
        attempts: u32,
        #[source]
        source: TransportError,
    },

    /// The circuit breaker rejected the call and no fallback applied.
    #[error("circuit breaker open for {service} (rejected {path}){}", last_error_suffix(.last_error))]
    CircuitOpen {
        service: String,
        path: String,
        last_error: Option<TransportError>,
    },

    /// Failure raised by a caller-supplied operation.
    #[error("operation failed: {0}")]
    Operation(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

fn last_error_suffix(last_error: &Option<TransportError>) -> String {
    match last_error {
        Some(e) => format!("; last error: {}", e),
        None => String::new(),
    }
}

impl MeshError {
    /// Deployment or programming mistakes that retrying cannot fix.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            MeshError::UnknownService(_) | MeshError::MissingUrl(_) | MeshError::Config(_)
        )
    }

    /// The underlying transport failure, if any.
    pub fn transport_error(&self) -> Option<&TransportError> {
        match self {
            MeshError::Transport { source, .. } => Some(source),
            MeshError::CircuitOpen { last_error, .. } => last_error.as_ref(),
            _ => None,
        }
    }
}

/// Result type for mesh operations.
pub type MeshResult<T> = Result<T, MeshError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        let policy = RetryPolicy::default();
        assert!(TransportError::Timeout(Duration::from_secs(1)).is_retryable(&policy));
        assert!(TransportError::Connect("refused".into()).is_retryable(&policy));
        assert!(TransportError::Status { status: 503, body: String::new() }.is_retryable(&policy));
        assert!(!TransportError::Status { status: 404, body: String::new() }.is_retryable(&policy));
        assert!(!TransportError::Decode("eof".into()).is_retryable(&policy));
    }

    #[test]
    fn test_error_display() {
        let err = MeshError::Transport {
            service: "recipe-service".into(),
            path: "/api/recipes".into(),
            attempts: 3,
            source: TransportError::Status { status: 502, body: "bad gateway".into() },
        };
        assert_eq!(
            err.to_string(),
            "request to recipe-service/api/recipes failed after 3 attempt(s): HTTP 502: bad gateway"
        );

        let err = MeshError::CircuitOpen {
            service: "blog-service".into(),
            path: "/posts".into(),
            last_error: Some(TransportError::Connect("refused".into())),
        };
        assert!(err.to_string().ends_with("last error: connection error: refused"));
        assert!(!err.is_configuration());
        assert!(MeshError::UnknownService("x".into()).is_configuration());
    }
}
