//! Service mesh resilience and observability layer.
//!
//! Resolves logical service names to endpoints, calls them through a
//! per-service circuit breaker with retries and fallbacks, traces and
//! measures every call, and keeps a continuously refreshed view of
//! downstream health.

pub mod admin;
pub mod config;
pub mod discovery;
pub mod health;
pub mod lifecycle;
pub mod monitoring;
pub mod observability;
pub mod resilience;
pub mod security;

pub use config::schema::MeshConfig;
pub use lifecycle::{ServiceMesh, Shutdown};
pub use resilience::{FallbackPolicy, MeshError, MeshResult, RetryPolicy, ServiceRequest, ServiceResponse};
