//! Monitoring subsystem.
//!
//! # Data Flow
//! ```text
//! trace_service_call(service, operation, f)
//!     → tracer: open span (child of parent context if given)
//!     → f(context)
//!     → guard drop: collector.record_request + tracer.finish_span
//!
//! system_health()
//!     → registry health + collector metrics → healthy | degraded | unhealthy
//! ```

pub mod facade;

pub use facade::{Monitoring, ServiceHealthSummary, SystemHealth};
