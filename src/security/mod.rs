//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Outbound call:
//!     → headers.rs (caller identity, target API key, trace ids)
//!     → transport
//!
//! Admin request:
//!     → admin/auth.rs (bearer key, constant-time compare)
//! ```
//!
//! # Design Decisions
//! - The mesh authenticates itself to callees; callees enforce their own policy
//! - Secrets never logged

pub mod headers;

pub use headers::ServiceCredentials;
