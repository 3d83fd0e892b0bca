//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Active health checks (active.rs):
//!     Periodic timer (first sweep immediately on start)
//!     → probe.rs for every registered service, concurrently, with deadline
//!     → registry: replace Health
//!     → metrics collector: record status
//!     → tracer: one span per probe
//!
//! State (state.rs):
//!     Unknown → Healthy | Unhealthy | Error, replaced on every probe
//! ```
//!
//! # Design Decisions
//! - Never on a caller's hot path
//! - One failing probe never aborts the sweep
//! - Health state is per-service

pub mod active;
pub mod probe;
pub mod state;

pub use active::{HealthCheckResult, HealthChecker};
pub use probe::{HealthProbe, HttpHealthProbe, ProbeError};
pub use state::{Health, HealthStatus, OverallStatus};
