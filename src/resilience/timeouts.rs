//! Timeout enforcement.
//!
//! # Responsibilities
//! - Wrap transport attempts and health probes with a deadline
//! - Cancel operations cleanly on timeout
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - Timeout errors are distinct from other errors and retryable

use std::future::Future;
use std::time::Duration;

use crate::resilience::error::TransportError;

/// Run `attempt` with a deadline; exceeding it yields `TransportError::Timeout`.
pub async fn with_deadline<T, F>(deadline: Duration, attempt: F) -> Result<T, TransportError>
where
    F: Future<Output = Result<T, TransportError>>,
{
    match tokio::time::timeout(deadline, attempt).await {
        Ok(result) => result,
        Err(_) => Err(TransportError::Timeout(deadline)),
    }
}
