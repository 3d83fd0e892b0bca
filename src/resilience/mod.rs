//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Call to a service (client.rs):
//!     → circuit_breaker.rs (admit, reject, or admit the single half-open trial)
//!     → timeouts.rs (deadline per attempt)
//!     → On failure: retries.rs + backoff.rs (retryable? wait, try again)
//!     → circuit_breaker.rs (settle once per call)
//!     → fallback.rs (static → function → cache) or error.rs to the caller
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every attempt has a deadline
//! - Idempotency is the caller's contract; non-idempotent calls pass a
//!   no-retry policy or carry an idempotency key
//! - Circuit breaker prevents cascading failures
//! - One breaker per service, shared by every caller

pub mod backoff;
pub mod circuit_breaker;
pub mod client;
pub mod error;
pub mod fallback;
pub mod retries;
pub mod timeouts;

pub use circuit_breaker::{BreakerSnapshot, CircuitBreakerRegistry, CircuitState};
pub use client::{
    HttpMethod, HttpTransport, OutboundRequest, ResilientClient, ServiceRequest, ServiceResponse,
    Transport, TransportResponse,
};
pub use error::{MeshError, MeshResult, TransportError};
pub use fallback::{FallbackPolicy, FallbackSource};
pub use retries::RetryPolicy;
