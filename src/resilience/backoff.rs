//! Exponential backoff with optional jitter.

use rand::Rng;
use std::time::Duration;

/// Delay after failed attempt `attempt` (1-based):
/// `min(max, base × multiplier^(attempt-1))`, plus up to `jitter_ratio` of it,
/// never exceeding `max`.
pub fn calculate_backoff(
    attempt: u32,
    base: Duration,
    max: Duration,
    multiplier: f64,
    jitter_ratio: f64,
) -> Duration {
    if attempt == 0 || base.is_zero() {
        return Duration::ZERO;
    }

    let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
    let factor = multiplier.max(1.0).powi(exponent);
    let base_ms = base.as_millis() as f64;
    let max_ms = max.as_millis() as f64;
    let capped_ms = (base_ms * factor).min(max_ms);

    let jitter_ms = if jitter_ratio > 0.0 && capped_ms >= 1.0 {
        rand::thread_rng().gen_range(0.0..capped_ms * jitter_ratio.min(1.0))
    } else {
        0.0
    };

    Duration::from_millis((capped_ms + jitter_ms).min(max_ms).round() as u64)
}
