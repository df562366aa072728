//! Exponential backoff with jitter.

use std::time::Duration;

use rand::Rng;

use crate::ClientOptions;

/// Deterministic part of the delay before retry `attempt` (0-based):
/// `base * factor^attempt`, capped at `max_ms`.
pub(crate) fn backoff_delay(attempt: u32, base_ms: u64, factor: f64, max_ms: u64) -> Duration {
    let exponent = attempt.min(32) as i32;
    let raw = base_ms as f64 * factor.max(1.0).powi(exponent);
    let capped = if raw.is_finite() {
        raw.min(max_ms as f64) as u64
    } else {
        max_ms
    };
    Duration::from_millis(capped)
}

/// Uniform jitter in `[0, max_ms)`.
pub(crate) fn jitter(max_ms: u64) -> Duration {
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..max_ms))
}

/// Full delay before retry `attempt`, jitter included.
pub(crate) fn retry_delay(attempt: u32, opts: &ClientOptions) -> Duration {
    backoff_delay(
        attempt,
        opts.retry_backoff_ms,
        opts.backoff_factor,
        opts.max_backoff_ms,
    ) + jitter(opts.jitter_ms)
}
