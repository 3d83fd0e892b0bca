//! Retry policy.
//!
//! # Responsibilities
//! - Describe how many attempts a call gets and how long to wait between them
//! - Decide whether a failed attempt is worth repeating
//!
//! # Design Decisions
//! - Pure configuration, no state; the client owns the attempt loop
//! - Connection errors and timeouts always retryable; statuses opt-in by list
//! - The policy does not inspect the HTTP method: callers issuing non-idempotent
//!   requests must either make them idempotent (idempotency keys) or pass
//!   `RetryPolicy::no_retry()`

use std::time::Duration;

use crate::config::RetryConfig;
use crate::resilience::backoff::calculate_backoff;

/// How a single call is retried.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub retryable_status_codes: Vec<u16>,
    /// Jitter as a fraction of the computed delay; 0 means deterministic delays.
    pub jitter_ratio: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            backoff_multiplier: config.backoff_multiplier,
            retryable_status_codes: config.retryable_status_codes.clone(),
            jitter_ratio: config.jitter_ratio,
        }
    }
}

impl RetryPolicy {
    /// A single attempt, no retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_delays(mut self, base: Duration, max: Duration) -> Self {
        self.base_delay = base;
        self.max_delay = max;
        self
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    pub fn with_retryable_statuses(mut self, statuses: impl Into<Vec<u16>>) -> Self {
        self.retryable_status_codes = statuses.into();
        self
    }

    /// Delay to sleep after failed attempt `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        calculate_backoff(
            attempt,
            self.base_delay,
            self.max_delay,
            self.backoff_multiplier,
            self.jitter_ratio,
        )
    }
}
