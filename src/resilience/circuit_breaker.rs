//! Circuit breaker for backend protection.
//!
//! # States
//! - Closed: normal operation, requests pass through
//! - Open: backend assumed down, requests fail fast
//! - Half-Open: testing if backend recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive failed calls >= failure_threshold
//! Open → Half-Open: first call after reset_timeout elapsed
//! Half-Open → Closed: trial call succeeds
//! Half-Open → Open: trial call fails (timeout restarts)
//! ```
//!
//! # Design Decisions
//! - Per-service circuit breaker (not global), created lazily, never dropped
//! - Fail fast in Open state (no waiting for timeout)
//! - Single trial in Half-Open, enforced by a trial-in-flight flag
//! - Outcomes are reported through a permit; dropping an unsettled trial
//!   permit re-opens the breaker instead of leaving it half-open forever

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::CircuitBreakerConfig;
use crate::observability::metrics;
use crate::resilience::error::TransportError;

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    /// Gauge encoding: 0=closed, 1=open, 2=half-open.
    pub fn as_gauge(&self) -> f64 {
        match self {
            CircuitState::Closed => 0.0,
            CircuitState::Open => 1.0,
            CircuitState::HalfOpen => 2.0,
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "CLOSED"),
            CircuitState::Open => write!(f, "OPEN"),
            CircuitState::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
    last_error: Option<TransportError>,
    rejected: u64,
}

/// Point-in-time view of a breaker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BreakerSnapshot {
    pub service: String,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub rejected: u64,
    /// Milliseconds since the breaker last opened.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open_for_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Why a call was not admitted.
#[derive(Debug, Clone)]
pub struct Rejected {
    pub state: CircuitState,
    pub last_error: Option<TransportError>,
}

/// Kind of admission granted by [`CircuitBreaker::try_acquire`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Breaker closed; failures are counted.
    Normal,
    /// The single half-open trial.
    Trial,
}

/// Per-service circuit breaker.
#[derive(Debug)]
pub struct CircuitBreaker {
    service: String,
    failure_threshold: u32,
    reset_timeout: Duration,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(service: impl Into<String>, config: &CircuitBreakerConfig) -> Self {
        Self {
            service: service.into(),
            failure_threshold: config.failure_threshold.max(1),
            reset_timeout: config.reset_timeout(),
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                trial_in_flight: false,
                last_error: None,
                rejected: 0,
            }),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// Ask to issue a call. Open breakers reject until the reset timeout elapses,
    /// then admit exactly one trial.
    pub fn try_acquire(self: &Arc<Self>) -> Result<BreakerPermit, Rejected> {
        let mut inner = self.inner.lock();
        let admission = match inner.state {
            CircuitState::Closed => Admission::Normal,
            CircuitState::Open => {
                let elapsed = inner.opened_at.map(|t| t.elapsed()).unwrap_or(Duration::MAX);
                if elapsed < self.reset_timeout || inner.trial_in_flight {
                    return Err(self.reject(&mut inner));
                }
                self.transition(&mut inner, CircuitState::HalfOpen);
                inner.trial_in_flight = true;
                Admission::Trial
            }
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    return Err(self.reject(&mut inner));
                }
                inner.trial_in_flight = true;
                Admission::Trial
            }
        };

        Ok(BreakerPermit {
            breaker: Arc::clone(self),
            admission,
            settled: false,
        })
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.inner.lock().consecutive_failures
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.inner.lock();
        BreakerSnapshot {
            service: self.service.clone(),
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            rejected: inner.rejected,
            open_for_ms: match inner.state {
                CircuitState::Closed => None,
                _ => inner.opened_at.map(|t| t.elapsed().as_millis() as u64),
            },
            last_error: inner.last_error.as_ref().map(|e| e.to_string()),
        }
    }

    fn reject(&self, inner: &mut BreakerInner) -> Rejected {
        inner.rejected += 1;
        Rejected {
            state: inner.state,
            last_error: inner.last_error.clone(),
        }
    }

    fn on_success(&self, admission: Admission) {
        let mut inner = self.inner.lock();
        match admission {
            Admission::Trial => {
                inner.trial_in_flight = false;
                inner.consecutive_failures = 0;
                inner.opened_at = None;
                self.transition(&mut inner, CircuitState::Closed);
            }
            // Only the half-open trial may close the breaker; a call admitted
            // while closed that finishes after the breaker opened changes nothing.
            Admission::Normal => {
                if inner.state == CircuitState::Closed {
                    inner.consecutive_failures = 0;
                }
            }
        }
    }

    fn on_failure(&self, admission: Admission, error: TransportError) {
        let mut inner = self.inner.lock();
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        inner.last_error = Some(error);
        if admission == Admission::Trial {
            inner.trial_in_flight = false;
        }

        let trip = match inner.state {
            CircuitState::Closed => inner.consecutive_failures >= self.failure_threshold,
            CircuitState::HalfOpen => admission == Admission::Trial,
            // A call admitted while closed finished after the breaker opened.
            CircuitState::Open => false,
        };
        if trip {
            inner.opened_at = Some(Instant::now());
            self.transition(&mut inner, CircuitState::Open);
        }
    }

    fn on_abandon(&self, admission: Admission) {
        if admission != Admission::Trial {
            return;
        }
        let mut inner = self.inner.lock();
        inner.trial_in_flight = false;
        if inner.state == CircuitState::HalfOpen {
            inner.opened_at = Some(Instant::now());
            self.transition(&mut inner, CircuitState::Open);
        }
    }

    fn transition(&self, inner: &mut BreakerInner, to: CircuitState) {
        let from = inner.state;
        if from == to {
            return;
        }
        inner.state = to;
        match to {
            CircuitState::Open => tracing::warn!(
                service = %self.service,
                from = %from,
                failures = inner.consecutive_failures,
                "Circuit breaker opened"
            ),
            _ => tracing::info!(service = %self.service, from = %from, to = %to, "Circuit breaker transition"),
        }
        metrics::record_breaker_state(&self.service, to);
    }
}

/// Admission ticket; report the call outcome through it exactly once.
#[derive(Debug)]
pub struct BreakerPermit {
    breaker: Arc<CircuitBreaker>,
    admission: Admission,
    settled: bool,
}

impl BreakerPermit {
    pub fn admission(&self) -> Admission {
        self.admission
    }

    pub fn is_trial(&self) -> bool {
        self.admission == Admission::Trial
    }

    pub fn record_success(mut self) {
        self.settled = true;
        self.breaker.on_success(self.admission);
    }

    pub fn record_failure(mut self, error: TransportError) {
        self.settled = true;
        self.breaker.on_failure(self.admission, error);
    }

    /// Settle without an outcome. Failure counts are untouched; a released
    /// trial re-opens the breaker.
    pub fn release(mut self) {
        self.settled = true;
        self.breaker.on_abandon(self.admission);
    }
}

impl Drop for BreakerPermit {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.on_abandon(self.admission);
        }
    }
}

/// Lazily-populated map of breakers keyed by service name.
#[derive(Debug)]
pub struct CircuitBreakerRegistry {
    config: CircuitBreakerConfig,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
}

impl CircuitBreakerRegistry {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            breakers: DashMap::new(),
        }
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// The authoritative breaker for `service`, created on first use.
    pub fn get_or_create(&self, service: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(service) {
            return Arc::clone(existing.value());
        }
        self.breakers
            .entry(service.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(service, &self.config)))
            .value()
            .clone()
    }

    pub fn get(&self, service: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(service).map(|b| Arc::clone(b.value()))
    }

    /// Snapshots of every breaker, sorted by service name.
    pub fn snapshots(&self) -> Vec<BreakerSnapshot> {
        let mut snapshots: Vec<_> = self.breakers.iter().map(|b| b.value().snapshot()).collect();
        snapshots.sort_by(|a, b| a.service.cmp(&b.service));
        snapshots
    }
}
