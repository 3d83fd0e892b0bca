//! Fallback resolution.
//!
//! # Responsibilities
//! - Describe substitute results for a call (static, computed, cached)
//! - Remember the last successful response per cache key
//!
//! # Design Decisions
//! - Consulted only after retries are exhausted or the breaker rejected the call
//! - Fixed priority: static response, then function, then cache; first hit wins
//! - A failing fallback function falls through to the cache; if nothing
//!   applies, the original error reaches the caller unchanged

use dashmap::DashMap;
use futures_util::future::BoxFuture;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Async producer of a substitute response.
pub type FallbackFn = Arc<dyn Fn() -> BoxFuture<'static, Result<Value, String>> + Send + Sync>;

/// Where a substitute response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FallbackSource {
    Static,
    Function,
    Cache,
}

impl FallbackSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            FallbackSource::Static => "static",
            FallbackSource::Function => "function",
            FallbackSource::Cache => "cache",
        }
    }
}

/// Substitute results for a call.
#[derive(Clone, Default)]
pub struct FallbackPolicy {
    pub enabled: bool,
    pub response: Option<Value>,
    pub function: Option<FallbackFn>,
    pub cache_key: Option<String>,
    pub cache_ttl: Duration,
}

impl std::fmt::Debug for FallbackPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackPolicy")
            .field("enabled", &self.enabled)
            .field("response", &self.response)
            .field("function", &self.function.as_ref().map(|_| "<fn>"))
            .field("cache_key", &self.cache_key)
            .field("cache_ttl", &self.cache_ttl)
            .finish()
    }
}

impl FallbackPolicy {
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Always answer with `value` when the call cannot be served.
    pub fn static_response(value: Value) -> Self {
        Self {
            enabled: true,
            response: Some(value),
            ..Self::default()
        }
    }

    /// Compute a substitute with an async function.
    pub fn function<F, Fut>(f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, String>> + Send + 'static,
    {
        Self {
            enabled: true,
            ..Self::default()
        }
        .with_function(f)
    }

    /// Serve the last good response for `key` while younger than `ttl`.
    pub fn cached(key: impl Into<String>, ttl: Duration) -> Self {
        Self {
            enabled: true,
            ..Self::default()
        }
        .with_cache(key, ttl)
    }

    pub fn with_response(mut self, value: Value) -> Self {
        self.response = Some(value);
        self
    }

    pub fn with_function<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, String>> + Send + 'static,
    {
        self.function = Some(Arc::new(move || Box::pin(f()) as BoxFuture<'static, _>));
        self
    }

    pub fn with_cache(mut self, key: impl Into<String>, ttl: Duration) -> Self {
        self.cache_key = Some(key.into());
        self.cache_ttl = ttl;
        self
    }

    /// Cache key to populate on success, if caching is active.
    pub fn active_cache_key(&self) -> Option<&str> {
        if self.enabled {
            self.cache_key.as_deref()
        } else {
            None
        }
    }
}

#[derive(Debug, Clone)]
struct CachedResponse {
    value: Value,
    stored_at: Instant,
}

/// Default bound on distinct cache keys.
pub const DEFAULT_MAX_CACHE_ENTRIES: usize = 1024;

/// Last successful responses keyed by fallback cache key. Expired entries are
/// dropped on lookup; past `max_entries` the oldest entry is evicted.
#[derive(Debug)]
pub struct FallbackCache {
    entries: DashMap<String, CachedResponse>,
    max_entries: usize,
}

impl Default for FallbackCache {
    fn default() -> Self {
        Self::with_max_entries(DEFAULT_MAX_CACHE_ENTRIES)
    }
}

impl FallbackCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_entries(max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            max_entries: max_entries.max(1),
        }
    }

    pub fn store(&self, key: &str, value: Value) {
        if !self.entries.contains_key(key) && self.entries.len() >= self.max_entries {
            self.evict_oldest();
        }
        self.entries.insert(
            key.to_string(),
            CachedResponse {
                value,
                stored_at: Instant::now(),
            },
        );
    }

    /// The cached value for `key` if it is younger than `ttl`. An older entry
    /// is removed.
    pub fn lookup(&self, key: &str, ttl: Duration) -> Option<Value> {
        {
            let entry = self.entries.get(key)?;
            if entry.stored_at.elapsed() <= ttl {
                return Some(entry.value.clone());
            }
        }
        self.entries.remove_if(key, |_, entry| entry.stored_at.elapsed() > ttl);
        None
    }

    fn evict_oldest(&self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|entry| entry.stored_at)
            .map(|entry| entry.key().clone());
        if let Some(key) = oldest {
            self.entries.remove(&key);
            tracing::debug!(key = %key, "Evicted oldest fallback cache entry");
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve a substitute according to `policy`, in priority order.
    pub async fn resolve(&self, service: &str, policy: &FallbackPolicy) -> Option<(Value, FallbackSource)> {
        if !policy.enabled {
            return None;
        }

        if let Some(value) = &policy.response {
            return Some((value.clone(), FallbackSource::Static));
        }

        if let Some(function) = &policy.function {
            match function().await {
                Ok(value) => return Some((value, FallbackSource::Function)),
                Err(e) => {
                    tracing::warn!(service = %service, error = %e, "Fallback function failed");
                }
            }
        }

        if let Some(key) = &policy.cache_key {
            if let Some(value) = self.lookup(key, policy.cache_ttl) {
                return Some((value, FallbackSource::Cache));
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_static_wins_over_function() {
        let cache = FallbackCache::new();
        let policy = FallbackPolicy::static_response(json!({"fallback": true}))
            .with_function(|| async { Ok(json!({"fromFunction": true})) });

        let (value, source) = cache.resolve("svc", &policy).await.unwrap();
        assert_eq!(source, FallbackSource::Static);
        assert_eq!(value, json!({"fallback": true}));
    }

    #[tokio::test]
    async fn test_function_failure_falls_through_to_cache() {
        let cache = FallbackCache::new();
        cache.store("recipes", json!(["cached"]));
        let policy = FallbackPolicy::function(|| async { Err("down too".to_string()) })
            .with_cache("recipes", Duration::from_secs(60));

        let (value, source) = cache.resolve("svc", &policy).await.unwrap();
        assert_eq!(source, FallbackSource::Cache);
        assert_eq!(value, json!(["cached"]));
    }

    #[tokio::test]
    async fn test_expired_cache_and_disabled_policy() {
        let cache = FallbackCache::new();
        cache.store("k", json!(1));
        tokio::time::sleep(Duration::from_millis(20)).await;

        let expired = FallbackPolicy::cached("k", Duration::from_millis(5));
        assert!(cache.resolve("svc", &expired).await.is_none());
        assert!(cache.is_empty());

        let mut disabled = FallbackPolicy::static_response(json!(2));
        disabled.enabled = false;
        assert!(cache.resolve("svc", &disabled).await.is_none());
        assert!(disabled.active_cache_key().is_none());
    }

    #[test]
    fn test_cache_is_bounded() {
        let cache = FallbackCache::with_max_entries(2);
        cache.store("a", json!(1));
        std::thread::sleep(Duration::from_millis(2));
        cache.store("b", json!(2));
        std::thread::sleep(Duration::from_millis(2));
        cache.store("c", json!(3));

        assert_eq!(cache.len(), 2);
        let ttl = Duration::from_secs(60);
        assert!(cache.lookup("a", ttl).is_none());
        assert_eq!(cache.lookup("b", ttl), Some(json!(2)));
        assert_eq!(cache.lookup("c", ttl), Some(json!(3)));

        // Overwriting an existing key never evicts.
        cache.store("c", json!(4));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.lookup("b", ttl), Some(json!(2)));
    }
}
