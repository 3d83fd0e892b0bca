//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check every enabled service has a usable URL and API key
//! - Validate policy value ranges (attempts > 0, delays ordered)
//! - Surface non-fatal recommendations separately from issues
//!
//! # Design Decisions
//! - Returns all validation issues, not just first
//! - Validation is pure function: &MeshConfig → ValidationReport
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use url::Url;

use crate::config::schema::MeshConfig;

/// Outcome of validating a [`MeshConfig`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    /// Problems that make the configuration unusable.
    pub issues: Vec<String>,
    /// Suggestions that do not block startup.
    pub recommendations: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Validate the whole configuration.
pub fn validate_config(config: &MeshConfig) -> ValidationReport {
    let mut report = ValidationReport::default();
    let mut seen = HashSet::new();

    for service in &config.services {
        if !seen.insert(service.name.as_str()) {
            report.issues.push(format!("Duplicate service name: {}", service.name));
        }

        if !service.enabled {
            continue;
        }

        match Url::parse(&service.url) {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
            Ok(_) => report.issues.push(format!(
                "Service {} is enabled but URL is not HTTP(S): {}",
                service.name, service.url
            )),
            Err(_) => report
                .issues
                .push(format!("Invalid URL for {}: {}", service.name, service.url)),
        }

        if service.api_key.is_empty() {
            report.issues.push(format!("Missing API key for {}", service.name));
            report.recommendations.push(format!(
                "Set {}_API_KEY environment variable",
                service.env_prefix()
            ));
        }

        if service.timeout_ms > 30_000 {
            report.recommendations.push(format!(
                "Consider reducing timeout for {} (current: {}ms)",
                service.name, service.timeout_ms
            ));
        }

        if service.max_concurrent_requests > 50 {
            report.recommendations.push(format!(
                "High concurrent request limit for {} (current: {})",
                service.name, service.max_concurrent_requests
            ));
        }
    }

    let retries = &config.retries;
    if retries.max_attempts == 0 {
        report.issues.push("retries.max_attempts must be at least 1".to_string());
    }
    if retries.base_delay_ms > retries.max_delay_ms {
        report
            .issues
            .push("retries.base_delay_ms must not exceed retries.max_delay_ms".to_string());
    }
    if !(retries.backoff_multiplier >= 1.0) {
        report
            .issues
            .push("retries.backoff_multiplier must be >= 1.0".to_string());
    }
    if !(0.0..=1.0).contains(&retries.jitter_ratio) {
        report
            .issues
            .push("retries.jitter_ratio must be within 0.0..=1.0".to_string());
    }

    if config.circuit_breaker.failure_threshold == 0 {
        report
            .issues
            .push("circuit_breaker.failure_threshold must be at least 1".to_string());
    }

    if config.health_check.enabled && config.health_check.interval_ms == 0 {
        report
            .issues
            .push("health_check.interval_ms must be greater than 0".to_string());
    }

    let tracing = &config.tracing;
    if tracing.max_spans_per_trace == 0 {
        report
            .issues
            .push("tracing.max_spans_per_trace must be at least 1".to_string());
    }
    if tracing.low_water_spans >= tracing.high_water_spans {
        report
            .issues
            .push("tracing.low_water_spans must be below tracing.high_water_spans".to_string());
    }

    if config.metrics.window_size == 0 {
        report
            .issues
            .push("metrics.window_size must be at least 1".to_string());
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keyed_config() -> MeshConfig {
        let mut config = MeshConfig::default();
        for service in &mut config.services {
            service.api_key = format!("{}-key", service.name);
        }
        config
    }

    #[test]
    fn test_valid_defaults_with_keys() {
        let report = validate_config(&keyed_config());
        assert!(report.is_valid(), "{:?}", report.issues);
        // websocket-service allows 100 concurrent requests
        assert!(report
            .recommendations
            .iter()
            .any(|r| r.contains("websocket-service")));
    }

    #[test]
    fn test_invalid_url_and_scheme() {
        let mut config = keyed_config();
        config.services[0].url = "not a url".to_string();
        config.services[1].url = "ftp://plans.internal".to_string();

        let report = validate_config(&config);
        assert_eq!(report.issues.len(), 2);
        assert!(report.issues[0].starts_with("Invalid URL for recipe-service"));
        assert!(report.issues[1].contains("not HTTP(S)"));
    }

    #[test]
    fn test_disabled_services_skipped() {
        let mut config = keyed_config();
        config.services[0].api_key.clear();
        config.services[0].enabled = false;
        assert!(validate_config(&config).is_valid());
    }

    #[test]
    fn test_policy_ranges() {
        let mut config = keyed_config();
        config.retries.max_attempts = 0;
        config.retries.base_delay_ms = 5_000;
        config.retries.max_delay_ms = 100;
        config.circuit_breaker.failure_threshold = 0;
        config.tracing.low_water_spans = config.tracing.high_water_spans;

        let report = validate_config(&config);
        assert_eq!(report.issues.len(), 4);
    }

    #[test]
    fn test_duplicate_names() {
        let mut config = keyed_config();
        let dup = config.services[0].clone();
        config.services.push(dup);
        let report = validate_config(&config);
        assert!(report.issues.iter().any(|i| i.starts_with("Duplicate service name")));
    }
}
