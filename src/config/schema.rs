//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the mesh.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the service mesh layer.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MeshConfig {
    /// Deployment environment, selects default service URLs.
    pub environment: Environment,

    /// Identity sent to callees as `X-Service-Name`.
    pub caller_name: String,

    /// Only talk to externally hosted services (mealplan, shopping).
    pub external_api_only: bool,

    /// Downstream service definitions.
    pub services: Vec<ServiceConfig>,

    /// Health check settings.
    pub health_check: HealthCheckConfig,

    /// Retry defaults.
    pub retries: RetryConfig,

    /// Circuit breaker settings.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Transport timeouts.
    pub timeouts: TimeoutConfig,

    /// Span retention settings.
    pub tracing: TracingConfig,

    /// Latency window settings.
    pub metrics: MetricsConfig,

    /// Logging and metrics export.
    pub observability: ObservabilityConfig,

    /// Admin API settings.
    pub admin: AdminConfig,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self::for_environment(Environment::Development)
    }
}

impl MeshConfig {
    /// Defaults for a given environment, including the six backend services.
    pub fn for_environment(environment: Environment) -> Self {
        Self {
            environment,
            caller_name: "api-gateway".to_string(),
            external_api_only: false,
            services: default_services(environment),
            health_check: HealthCheckConfig::default(),
            retries: RetryConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            timeouts: TimeoutConfig::default(),
            tracing: TracingConfig::default(),
            metrics: MetricsConfig::default(),
            observability: ObservabilityConfig::default(),
            admin: AdminConfig::default(),
        }
    }

    /// Look up a service definition by name.
    pub fn service(&self, name: &str) -> Option<&ServiceConfig> {
        self.services.iter().find(|s| s.name == name)
    }

    /// Services that should be registered at startup.
    pub fn enabled_services(&self) -> impl Iterator<Item = &ServiceConfig> {
        self.services.iter().filter(|s| s.enabled)
    }
}

/// Deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Test,
    Staging,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Test => "test",
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "test" => Ok(Environment::Test),
            "staging" => Ok(Environment::Staging),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(format!("unknown environment '{}'", other)),
        }
    }
}

/// Downstream service definition.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
    /// Logical service name (registry key).
    pub name: String,

    /// Base URL (e.g., "http://localhost:3002").
    pub url: String,

    /// Path probed by the health checker.
    #[serde(default = "default_health_path")]
    pub health_path: String,

    /// Key presented to the service as `X-API-Key`.
    #[serde(default)]
    pub api_key: String,

    /// Disabled services are never registered.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Advertised endpoint version.
    #[serde(default = "default_version")]
    pub version: String,

    /// Capabilities advertised by the service.
    #[serde(default)]
    pub capabilities: Vec<String>,

    /// Per-attempt transport deadline in milliseconds.
    #[serde(default = "default_service_timeout_ms")]
    pub timeout_ms: u64,

    /// Advisory concurrency limit (validated, reported).
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_requests: u32,
}

impl ServiceConfig {
    /// Environment variable prefix, e.g. `RECIPE_SERVICE` for `recipe-service`.
    pub fn env_prefix(&self) -> String {
        self.name.to_ascii_uppercase().replace('-', "_")
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn default_health_path() -> String {
    "/health".to_string()
}

fn default_enabled() -> bool {
    true
}

fn default_version() -> String {
    "1.0.0".to_string()
}

fn default_service_timeout_ms() -> u64 {
    10_000
}

fn default_max_concurrent() -> u32 {
    10
}

/// The six MealPrep360 backends with their per-environment defaults.
pub fn default_services(environment: Environment) -> Vec<ServiceConfig> {
    // (name, dev/test url, staging url, production url, health path, capabilities, timeout, concurrency)
    let table: [(&str, &str, &str, &str, &str, &[&str], u64, u32); 6] = [
        (
            "recipe-service",
            "http://localhost:3002",
            "https://recipe-staging.mealprep360.com",
            "https://recipe.mealprep360.com",
            "/health",
            &["recipe-generation", "recipe-search", "recipe-validation"],
            30_000,
            10,
        ),
        (
            "mealplan-service",
            "http://localhost:3003",
            "https://mealplan-staging.mealprep360.com",
            "https://plan.mealprep360.com",
            "/health",
            &["meal-planning", "calendar-management"],
            15_000,
            5,
        ),
        (
            "shopping-service",
            "https://shopping.mealprep360.com",
            "https://shopping-staging.mealprep360.com",
            "https://shopping.mealprep360.com",
            "/health",
            &["shopping-list-generation", "ingredient-aggregation"],
            10_000,
            15,
        ),
        (
            "social-service",
            "http://localhost:3005",
            "https://social-staging.mealprep360.com",
            "https://social.mealprep360.com",
            "/api/health",
            &["social-posts", "comments", "user-profiles"],
            10_000,
            25,
        ),
        (
            "blog-service",
            "http://localhost:3006",
            "https://blog-staging.mealprep360.com",
            "https://blog.mealprep360.com",
            "/api/health",
            &["blog-posts", "content-management"],
            15_000,
            10,
        ),
        (
            "websocket-service",
            "http://localhost:3007",
            "https://ws-staging.mealprep360.com",
            "https://ws.mealprep360.com",
            "/health",
            &["real-time-messaging", "notifications"],
            5_000,
            100,
        ),
    ];

    table
        .iter()
        .map(|(name, local, staging, production, health_path, caps, timeout_ms, max_conc)| {
            let url = match environment {
                Environment::Development | Environment::Test => *local,
                Environment::Staging => *staging,
                Environment::Production => *production,
            };
            ServiceConfig {
                name: name.to_string(),
                url: url.to_string(),
                health_path: health_path.to_string(),
                api_key: String::new(),
                enabled: true,
                version: default_version(),
                capabilities: caps.iter().map(|c| c.to_string()).collect(),
                timeout_ms: *timeout_ms,
                max_concurrent_requests: *max_conc,
            }
        })
        .collect()
}

/// Health check configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Enable the background health checker.
    pub enabled: bool,

    /// Sweep interval in milliseconds.
    pub interval_ms: u64,

    /// Per-probe timeout in milliseconds.
    pub timeout_ms: u64,
}

impl HealthCheckConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: 30_000,
            timeout_ms: 5_000,
        }
    }
}

/// Retry defaults applied when a call does not supply its own policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per call (first try included).
    pub max_attempts: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,

    /// Growth factor between successive delays.
    pub backoff_multiplier: f64,

    /// HTTP statuses that are worth retrying.
    pub retryable_status_codes: Vec<u16>,

    /// Random jitter added to each delay, as a fraction of the delay (0 disables).
    pub jitter_ratio: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 10_000,
            backoff_multiplier: 2.0,
            retryable_status_codes: vec![408, 429, 500, 502, 503, 504],
            jitter_ratio: 0.0,
        }
    }
}

/// Circuit breaker configuration, shared by every per-service breaker.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failed calls before the breaker opens.
    pub failure_threshold: u32,

    /// How long the breaker stays open before allowing a trial, in milliseconds.
    pub reset_timeout_ms: u64,

    /// Count non-retryable client errors (4xx) as breaker failures.
    pub count_client_errors: bool,
}

impl CircuitBreakerConfig {
    pub fn reset_timeout(&self) -> Duration {
        Duration::from_millis(self.reset_timeout_ms)
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout_ms: 60_000,
            count_client_errors: false,
        }
    }
}

/// Timeout configuration for transport attempts.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connection establishment timeout in milliseconds.
    pub connect_ms: u64,

    /// Default per-attempt deadline in milliseconds.
    pub request_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_ms: 5_000,
            request_ms: 30_000,
        }
    }
}

/// Span retention settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TracingConfig {
    /// Spans kept per trace; the oldest is dropped beyond this.
    pub max_spans_per_trace: usize,

    /// Total retained spans that triggers bulk eviction.
    pub high_water_spans: usize,

    /// Total retained spans left after bulk eviction.
    pub low_water_spans: usize,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            max_spans_per_trace: 100,
            high_water_spans: 10_000,
            low_water_spans: 5_000,
        }
    }
}

/// Latency sampling settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Recent latency samples kept per service.
    pub window_size: usize,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { window_size: 1_000 }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,

    /// Request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
            request_timeout_secs: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_services() {
        let config = MeshConfig::default();
        assert_eq!(config.services.len(), 6);
        let social = config.service("social-service").unwrap();
        assert_eq!(social.health_path, "/api/health");
        assert_eq!(social.url, "http://localhost:3005");
        assert_eq!(social.env_prefix(), "SOCIAL_SERVICE");
    }

    #[test]
    fn test_production_urls() {
        let config = MeshConfig::for_environment(Environment::Production);
        assert_eq!(
            config.service("mealplan-service").unwrap().url,
            "https://plan.mealprep360.com"
        );
    }

    #[test]
    fn test_partial_toml() {
        let config: MeshConfig = toml::from_str(
            r#"
            environment = "staging"

            [retries]
            max_attempts = 5

            [[services]]
            name = "recipe-service"
            url = "http://recipes.internal:8080"
            "#,
        )
        .unwrap();

        assert_eq!(config.environment, Environment::Staging);
        assert_eq!(config.retries.max_attempts, 5);
        assert_eq!(config.retries.base_delay_ms, 1_000);
        assert_eq!(config.services.len(), 1);
        assert_eq!(config.services[0].health_path, "/health");
        assert!(config.services[0].enabled);
    }
}
