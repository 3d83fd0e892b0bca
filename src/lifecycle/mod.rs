//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     MeshConfig → ServiceMesh::new (build every subsystem)
//!     → initialize (validate → register services → start health checks)
//!
//! Shutdown (shutdown.rs):
//!     Signal received → stop health checks → drain admin API → exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then core, then listeners
//! - No globals: every subsystem is an explicit instance owned by ServiceMesh

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{HealthReport, ServiceMesh, ServiceStatus};
