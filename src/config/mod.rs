//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize)
//!     → loader.rs (environment overrides: <SERVICE>_URL, RETRY_*, ...)
//!     → validation.rs (semantic checks → issues + recommendations)
//!     → MeshConfig (validated, immutable)
//!     → handed to ServiceMesh::new, which builds every subsystem
//! ```
//!
//! # Design Decisions
//! - Config is read once at startup; endpoint URLs change only through
//!   an explicit `update_service_url` call
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::ConfigError;
pub use schema::MeshConfig;
pub use schema::{
    AdminConfig, CircuitBreakerConfig, Environment, HealthCheckConfig, LogFormat,
    MetricsConfig, ObservabilityConfig, RetryConfig, ServiceConfig, TimeoutConfig,
    TracingConfig,
};
pub use validation::{validate_config, ValidationReport};
