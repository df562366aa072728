use serde::Deserialize;

/// Configures models, timeouts, retries, queueing, caching and the breaker.
///
/// All durations are in milliseconds. Every field has a default, so a JSON
/// config only needs the values it overrides.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct ClientOptions {
    /// Model used for chat completions.
    pub chat_model: String,
    /// Sampling temperature for chat completions.
    pub chat_temperature: f32,
    /// Token limit for chat completions.
    pub chat_max_tokens: u32,
    /// Model used for image analysis.
    pub vision_model: String,
    /// Sampling temperature for image analysis.
    pub vision_temperature: f32,
    /// Token limit for image analysis.
    pub vision_max_tokens: u32,
    /// Conversation messages kept when building a chat prompt.
    pub max_history_messages: usize,
    /// Hard per-request deadline in milliseconds.
    pub timeout_ms: u64,
    /// Maximum number of retries after the initial attempt.
    pub max_retries: u32,
    /// Base retry backoff in milliseconds.
    pub retry_backoff_ms: u64,
    /// Multiplier applied to the backoff on every retry.
    pub backoff_factor: f64,
    /// Upper bound for the exponential part of the backoff.
    pub max_backoff_ms: u64,
    /// Upper bound (exclusive) for the random jitter added to each backoff.
    pub jitter_ms: u64,
    /// Requests allowed in flight at the same time.
    pub max_concurrent_requests: usize,
    /// Minimum spacing between two dispatches.
    pub dispatch_interval_ms: u64,
    /// Whether successful responses are cached.
    pub cache_enabled: bool,
    /// Lifetime of a cached response.
    pub cache_ttl_ms: u64,
    /// Maximum cached responses before least-recently-used eviction.
    pub cache_capacity: usize,
    /// Consecutive upstream failures that open the breaker.
    pub breaker_failure_threshold: u32,
    /// How long the breaker stays open.
    pub breaker_cooldown_ms: u64,
    /// Image analyses below this confidence are rejected.
    pub min_confidence: f64,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            chat_model: "gpt-4o-mini".to_owned(),
            chat_temperature: 0.7,
            chat_max_tokens: 1_000,
            vision_model: "gpt-4o".to_owned(),
            vision_temperature: 0.2,
            vision_max_tokens: 800,
            max_history_messages: 10,
            timeout_ms: 8 * 60 * 1_000,
            max_retries: 3,
            retry_backoff_ms: 1_000,
            backoff_factor: 2.0,
            max_backoff_ms: 30_000,
            jitter_ms: 1_000,
            max_concurrent_requests: 2,
            dispatch_interval_ms: 500,
            cache_enabled: true,
            cache_ttl_ms: 30 * 24 * 60 * 60 * 1_000,
            cache_capacity: 256,
            breaker_failure_threshold: 3,
            breaker_cooldown_ms: 60_000,
            min_confidence: 0.7,
        }
    }
}
