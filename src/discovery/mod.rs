//! Service discovery subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (ServiceMesh::initialize):
//!     enabled ServiceConfig → registry.register(name, endpoint)
//!
//! Outbound call:
//!     ResilientClient → ServiceResolver::resolve(name) → endpoint copy
//!
//! Background:
//!     HealthChecker → registry.list() → probe → registry.set_health()
//! ```

pub mod registry;

pub use registry::{ServiceEndpoint, ServiceRecord, ServiceRegistry, ServiceResolver};
