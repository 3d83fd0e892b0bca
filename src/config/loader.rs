//! Configuration loading from disk and the process environment.

use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::config::schema::{default_services, Environment, MeshConfig};
use crate::config::validation::validate_config;

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", .0.join(", "))]
    Validation(Vec<String>),
}

/// Load, apply environment overrides and validate a TOML config file.
pub fn load_config(path: &Path) -> Result<MeshConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content, |key| std::env::var(key).ok())
}

/// Build the configuration from defaults plus environment variables only.
pub fn config_from_env() -> Result<MeshConfig, ConfigError> {
    parse_config("", |key| std::env::var(key).ok())
}

/// Parse TOML content, apply overrides from `lookup`, then validate.
///
/// When the document has no `[[services]]` table, the default service set
/// for the resolved environment is used.
pub fn parse_config<F>(content: &str, lookup: F) -> Result<MeshConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let raw: toml::Table = toml::from_str(content)?;
    let explicit_services = raw.contains_key("services");
    let mut config: MeshConfig = toml::Value::Table(raw).try_into()?;

    if let Some(env) = lookup("MESH_ENV") {
        match env.parse::<Environment>() {
            Ok(environment) => config.environment = environment,
            Err(e) => tracing::warn!(error = %e, "Ignoring MESH_ENV"),
        }
    }
    if !explicit_services {
        config.services = default_services(config.environment);
    }

    apply_env_overrides(&mut config, &lookup);

    let report = validate_config(&config);
    for recommendation in &report.recommendations {
        tracing::warn!(recommendation = %recommendation, "Service configuration recommendation");
    }
    if !report.is_valid() {
        return Err(ConfigError::Validation(report.issues));
    }

    Ok(config)
}

/// Apply environment-style overrides on top of a parsed configuration.
pub fn apply_env_overrides<F>(config: &mut MeshConfig, lookup: &F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(name) = lookup("MESH_CALLER_NAME") {
        config.caller_name = name;
    }
    if let Some(flag) = lookup("USE_EXTERNAL_API_ONLY") {
        config.external_api_only = parse_flag(&flag);
    }

    for service in &mut config.services {
        let prefix = service.env_prefix();
        if let Some(url) = lookup(&format!("{}_URL", prefix)) {
            service.url = url;
        }
        if let Some(key) = lookup(&format!("{}_API_KEY", prefix)) {
            service.api_key = key;
        }
        if let Some(enabled) = lookup(&format!("{}_ENABLED", prefix)) {
            service.enabled = enabled != "false";
        }
        if config.external_api_only && !is_external(&service.name) {
            service.enabled = false;
        }
    }

    override_number(lookup, "HEALTH_CHECK_INTERVAL_MS", &mut config.health_check.interval_ms);
    override_number(lookup, "HEALTH_CHECK_TIMEOUT_MS", &mut config.health_check.timeout_ms);
    override_number(lookup, "RETRY_MAX_ATTEMPTS", &mut config.retries.max_attempts);
    override_number(lookup, "RETRY_BASE_DELAY_MS", &mut config.retries.base_delay_ms);
    override_number(lookup, "RETRY_MAX_DELAY_MS", &mut config.retries.max_delay_ms);
    override_number(lookup, "RETRY_BACKOFF_MULTIPLIER", &mut config.retries.backoff_multiplier);
    override_number(
        lookup,
        "CIRCUIT_BREAKER_FAILURE_THRESHOLD",
        &mut config.circuit_breaker.failure_threshold,
    );
    override_number(
        lookup,
        "CIRCUIT_BREAKER_RESET_TIMEOUT_MS",
        &mut config.circuit_breaker.reset_timeout_ms,
    );
}

/// Services hosted outside this deployment stay enabled in external-API mode.
fn is_external(name: &str) -> bool {
    matches!(name, "mealplan-service" | "shopping-service")
}

fn parse_flag(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "true" | "1" | "yes")
}

fn override_number<F, T>(lookup: &F, key: &str, target: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    if let Some(raw) = lookup(key) {
        match raw.parse::<T>() {
            Ok(value) => *target = value,
            Err(_) => tracing::warn!(key = key, value = %raw, "Ignoring unparsable override"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn keyed_env() -> Vec<(&'static str, &'static str)> {
        vec![
            ("RECIPE_SERVICE_API_KEY", "k1"),
            ("MEALPLAN_SERVICE_API_KEY", "k2"),
            ("SHOPPING_SERVICE_API_KEY", "k3"),
            ("SOCIAL_SERVICE_API_KEY", "k4"),
            ("BLOG_SERVICE_API_KEY", "k5"),
            ("WEBSOCKET_SERVICE_API_KEY", "k6"),
        ]
    }

    #[test]
    fn test_env_overrides() {
        let mut env = keyed_env();
        env.push(("RECIPE_SERVICE_URL", "http://recipes:9000"));
        env.push(("BLOG_SERVICE_ENABLED", "false"));
        env.push(("RETRY_MAX_ATTEMPTS", "7"));
        env.push(("CIRCUIT_BREAKER_RESET_TIMEOUT_MS", "1500"));

        let config = parse_config("", lookup_from(&env)).unwrap();
        let recipe = config.service("recipe-service").unwrap();
        assert_eq!(recipe.url, "http://recipes:9000");
        assert_eq!(recipe.api_key, "k1");
        assert!(!config.service("blog-service").unwrap().enabled);
        assert_eq!(config.retries.max_attempts, 7);
        assert_eq!(config.circuit_breaker.reset_timeout_ms, 1500);
    }

    #[test]
    fn test_external_api_only() {
        let mut env = keyed_env();
        env.push(("USE_EXTERNAL_API_ONLY", "true"));

        let config = parse_config("", lookup_from(&env)).unwrap();
        let enabled: Vec<_> = config.enabled_services().map(|s| s.name.as_str()).collect();
        assert_eq!(enabled, vec!["mealplan-service", "shopping-service"]);
    }

    #[test]
    fn test_environment_selects_default_urls() {
        let mut env = keyed_env();
        env.push(("MESH_ENV", "production"));

        let config = parse_config("", lookup_from(&env)).unwrap();
        assert_eq!(config.environment, Environment::Production);
        assert_eq!(
            config.service("recipe-service").unwrap().url,
            "https://recipe.mealprep360.com"
        );
    }

    #[test]
    fn test_missing_keys_rejected() {
        let err = parse_config("", lookup_from(&[])).unwrap_err();
        match err {
            ConfigError::Validation(issues) => {
                assert_eq!(issues.len(), 6);
                assert!(issues[0].contains("Missing API key"));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_load_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            caller_name = "gateway-test"

            [[services]]
            name = "recipe-service"
            url = "http://127.0.0.1:3002"
            api_key = "secret"
            "#
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.caller_name, "gateway-test");
        assert_eq!(config.services.len(), 1);
    }
}
