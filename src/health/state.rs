//! Service health state.
//!
//! # States
//! - Healthy: last probe returned a 2xx within its deadline
//! - Unhealthy: last probe timed out or returned a non-2xx status
//! - Error: last probe could not reach the service at all
//! - Unknown: never probed
//!
//! # Design Decisions
//! - A `Health` value is replaced wholesale on every probe, never merged
//! - Metrics only distinguish healthy/unhealthy/unknown; `Error` folds into unhealthy

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Health status as recorded in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
    #[default]
    Unknown,
    Error,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Unhealthy => "unhealthy",
            HealthStatus::Unknown => "unknown",
            HealthStatus::Error => "error",
        }
    }

    /// Collapse to the three states tracked by the metrics collector.
    pub fn for_metrics(self) -> HealthStatus {
        match self {
            HealthStatus::Error => HealthStatus::Unhealthy,
            other => other,
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of the most recent health probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Health {
    pub status: HealthStatus,
    pub response_time_ms: u64,
    /// Milliseconds since the Unix epoch.
    pub last_checked_at: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Health {
    pub fn new(status: HealthStatus, response_time_ms: u64, error: Option<String>) -> Self {
        Self {
            status,
            response_time_ms,
            last_checked_at: epoch_millis(),
            error,
        }
    }

    pub fn healthy(response_time_ms: u64) -> Self {
        Self::new(HealthStatus::Healthy, response_time_ms, None)
    }

    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}

/// Aggregate status across services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverallStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl OverallStatus {
    /// `Healthy` iff all are healthy (vacuously for none), `Unhealthy` iff
    /// none are, otherwise `Degraded`.
    pub fn from_statuses<I>(statuses: I) -> Self
    where
        I: IntoIterator<Item = HealthStatus>,
    {
        let (mut total, mut healthy) = (0usize, 0usize);
        for status in statuses {
            total += 1;
            if status == HealthStatus::Healthy {
                healthy += 1;
            }
        }
        if healthy == total {
            OverallStatus::Healthy
        } else if healthy == 0 {
            OverallStatus::Unhealthy
        } else {
            OverallStatus::Degraded
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OverallStatus::Healthy => "healthy",
            OverallStatus::Degraded => "degraded",
            OverallStatus::Unhealthy => "unhealthy",
        }
    }
}

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_folds_into_unhealthy() {
        assert_eq!(HealthStatus::Error.for_metrics(), HealthStatus::Unhealthy);
        assert_eq!(HealthStatus::Unknown.for_metrics(), HealthStatus::Unknown);
    }

    #[test]
    fn test_health_serialization() {
        let health = Health::new(HealthStatus::Error, 12, Some("connection refused".into()));
        let json = serde_json::to_value(&health).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["response_time_ms"], 12);
        assert_eq!(json["error"], "connection refused");
        assert!(health.last_checked_at > 0);
    }

    #[test]
    fn test_overall_status() {
        use HealthStatus::*;
        assert_eq!(OverallStatus::from_statuses(Vec::<HealthStatus>::new()), OverallStatus::Healthy);
        assert_eq!(OverallStatus::from_statuses([Healthy, Healthy]), OverallStatus::Healthy);
        assert_eq!(OverallStatus::from_statuses([Healthy, Error]), OverallStatus::Degraded);
        assert_eq!(OverallStatus::from_statuses([Unknown, Unhealthy]), OverallStatus::Unhealthy);
    }
}
