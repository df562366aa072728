//! The resilient request gateway.
//!
//! ```text
//! send(body)
//!     → cache (live entry: return, no slot taken)
//!     → breaker fast path (open: ServiceUnavailable, nothing queued)
//!     → dispatcher (FIFO, ≤ max_concurrent_requests, spaced dispatches)
//!     → breaker check at dispatch
//!     → attempt loop: timeout, classify, backoff / Retry-After
//!     → breaker bookkeeping, decode, cache fill
//! ```

use std::{
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use serde_json::Value;
use tokio::time::{sleep, timeout};

use crate::{
    backoff::retry_delay,
    breaker::{Admission, CircuitBreaker},
    cache::{cache_key, ResponseCache},
    clock::Clock,
    dispatch::Dispatcher,
    transport::{HttpResponse, Transport, TransportError, TransportErrorKind},
    ClientOptions, DietAiError, GatewayStats, Result,
};

/// Mediates every call to the upstream completion endpoint.
#[derive(Debug)]
pub struct Gateway {
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    options: ClientOptions,
    cache: Mutex<ResponseCache>,
    breaker: Mutex<CircuitBreaker>,
    dispatcher: Dispatcher,
}

/// Outcome of a single attempt.
enum Attempt {
    Done(Result<Value>),
    Retry {
        error: DietAiError,
        wait: Option<Duration>,
    },
}

impl Gateway {
    pub fn new(transport: Arc<dyn Transport>, clock: Arc<dyn Clock>, options: ClientOptions) -> Self {
        Self {
            cache: Mutex::new(ResponseCache::new(
                Duration::from_millis(options.cache_ttl_ms),
                options.cache_capacity,
            )),
            breaker: Mutex::new(CircuitBreaker::new(
                options.breaker_failure_threshold,
                Duration::from_millis(options.breaker_cooldown_ms),
            )),
            dispatcher: Dispatcher::new(
                options.max_concurrent_requests,
                Duration::from_millis(options.dispatch_interval_ms),
            ),
            transport,
            clock,
            options,
        }
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Sends a request body and returns the parsed JSON envelope.
    pub async fn send(&self, body: Value) -> Result<Value> {
        self.send_with(body, Ok).await
    }

    /// Sends a request body and decodes the envelope with `decode`.
    ///
    /// Only envelopes that `decode` accepts are cached.
    pub async fn send_with<T, F>(&self, body: Value, decode: F) -> Result<T>
    where
        F: FnOnce(Value) -> Result<T>,
    {
        let key = self.options.cache_enabled.then(|| cache_key(&body));
        if let Some(key) = &key {
            let cached = self.cache().get(key, self.clock.now());
            if let Some(hit) = cached {
                #[cfg(feature = "tracing")]
                tracing::debug!("serving completion from cache");
                return decode(hit);
            }
        }

        let admission = self.breaker().peek(self.clock.now());
        self.check_admission(admission)?;

        let slot = self.dispatcher.acquire().await;
        let admission = self.breaker().admit(self.clock.now());
        self.check_admission(admission)?;

        let result = self.execute(&body).await;
        drop(slot);

        let envelope = match result {
            Ok(envelope) => {
                self.breaker().record_success();
                envelope
            }
            Err(err) => {
                if err.counts_as_upstream_failure() {
                    let opened = self.breaker().record_failure(self.clock.now());
                    log_upstream_failure(&err, opened, self.options.breaker_cooldown_ms);
                }
                return Err(err);
            }
        };

        match key {
            Some(key) => {
                let decoded = decode(envelope.clone());
                if decoded.is_ok() {
                    self.cache().insert(key, envelope, self.clock.now());
                }
                decoded
            }
            None => decode(envelope),
        }
    }

    /// Snapshot of the queue, cache and breaker.
    pub fn stats(&self) -> GatewayStats {
        let (cache_entries, cache_hits, cache_misses) = {
            let cache = self.cache();
            (cache.len(), cache.hits(), cache.misses())
        };
        let (breaker_open, consecutive_failures) = {
            let breaker = self.breaker();
            (breaker.is_open(), breaker.consecutive_failures())
        };
        GatewayStats {
            active_requests: self.dispatcher.active(),
            peak_active_requests: self.dispatcher.peak(),
            queued_requests: self.dispatcher.queued(),
            cache_entries,
            cache_hits,
            cache_misses,
            breaker_open,
            consecutive_failures,
        }
    }

    pub fn clear_cache(&self) {
        self.cache().clear();
    }

    fn check_admission(&self, admission: Admission) -> Result<()> {
        match admission {
            Admission::Allowed => Ok(()),
            Admission::Recovered => {
                #[cfg(feature = "tracing")]
                tracing::info!("circuit breaker cooldown elapsed, probing upstream");
                Ok(())
            }
            Admission::Rejected { retry_in } => Err(DietAiError::ServiceUnavailable {
                retry_in_ms: u64::try_from(retry_in.as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }

    async fn execute(&self, body: &Value) -> Result<Value> {
        let deadline = Duration::from_millis(self.options.timeout_ms);
        let mut attempt = 0u32;
        loop {
            let outcome = match timeout(deadline, self.transport.post_json(body)).await {
                Ok(Ok(response)) => classify_response(response),
                Ok(Err(err)) => Attempt::Retry {
                    error: self.transport_error(err),
                    wait: None,
                },
                Err(_) => Attempt::Retry {
                    error: DietAiError::Timeout {
                        after_ms: self.options.timeout_ms,
                    },
                    wait: None,
                },
            };

            match outcome {
                Attempt::Done(result) => return result,
                Attempt::Retry { error, wait } => {
                    if attempt >= self.options.max_retries {
                        return Err(error);
                    }
                    let delay = match wait {
                        Some(wait) => wait.min(deadline),
                        None => retry_delay(attempt, &self.options),
                    };

                    #[cfg(feature = "tracing")]
                    tracing::debug!(
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = ?error,
                        "retrying completion request"
                    );

                    sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    fn transport_error(&self, err: TransportError) -> DietAiError {
        match err.kind {
            TransportErrorKind::Timeout => DietAiError::Timeout {
                after_ms: self.options.timeout_ms,
            },
            TransportErrorKind::Connect | TransportErrorKind::Other => DietAiError::Network {
                message: err.message,
            },
        }
    }

    fn cache(&self) -> MutexGuard<'_, ResponseCache> {
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn breaker(&self) -> MutexGuard<'_, CircuitBreaker> {
        self.breaker.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(feature = "tracing")]
fn log_upstream_failure(err: &DietAiError, opened: bool, cooldown_ms: u64) {
    if opened {
        tracing::warn!(error = ?err, cooldown_ms, "circuit breaker opened after consecutive failures");
    } else {
        tracing::warn!(error = ?err, "upstream request failed");
    }
}

#[cfg(not(feature = "tracing"))]
fn log_upstream_failure(_err: &DietAiError, _opened: bool, _cooldown_ms: u64) {}

fn classify_response(response: HttpResponse) -> Attempt {
    match response.status {
        200..=299 => Attempt::Done(serde_json::from_str::<Value>(&response.body).map_err(|err| {
            DietAiError::malformed(format!("invalid response JSON: {err}"))
        })),
        401 | 403 => Attempt::Done(Err(DietAiError::AuthFailure {
            status: response.status,
            body: response.body,
        })),
        429 => Attempt::Retry {
            error: DietAiError::RateLimited {
                retry_after_ms: response
                    .retry_after
                    .map(|wait| u64::try_from(wait.as_millis()).unwrap_or(u64::MAX)),
            },
            wait: response.retry_after,
        },
        status => Attempt::Retry {
            error: DietAiError::Overloaded {
                status,
                body: response.body,
            },
            wait: if status == 503 { response.retry_after } else { None },
        },
    }
}
