//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events)
//!     → tracer.rs (spans grouped by trace id, bounded retention)
//!     → collector.rs (per-service counts, latency window, health)
//!         → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → Log aggregation (stdout, JSON)
//!     → Metrics endpoint (Prometheus scrape)
//!     → Admin API (metrics snapshots, trace lookup)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Trace ids flow to downstream services in headers
//! - Tracer and collector are explicit instances, never globals

pub mod collector;
pub mod logging;
pub mod metrics;
pub mod tracer;

pub use collector::{MetricsCollector, ServiceMetrics};
pub use tracer::{DistributedTracer, Span, SpanStatus, TraceContext};
