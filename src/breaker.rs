//! Consecutive-failure circuit breaker.
//!
//! ```text
//! closed ──[threshold consecutive failures]──> open
//!   ▲                                            │
//!   │ success                     [cooldown elapsed, next call]
//!   │                                            ▼
//!   └──────────── closed, failure count kept (half-open)
//!                   one more failure reopens
//! ```

use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug)]
pub(crate) struct CircuitBreaker {
    threshold: u32,
    cooldown: Duration,
    open: bool,
    reset_at: Option<Instant>,
    consecutive_failures: u32,
}

/// Result of asking the breaker whether a call may proceed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Admission {
    Allowed,
    /// The breaker was open and its cooldown just elapsed; the call is a probe.
    Recovered,
    Rejected { retry_in: Duration },
}

impl CircuitBreaker {
    pub(crate) fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            threshold: threshold.max(1),
            cooldown,
            open: false,
            reset_at: None,
            consecutive_failures: 0,
        }
    }

    /// Checks the breaker and closes it optimistically once the cooldown
    /// has passed.
    pub(crate) fn admit(&mut self, now: Instant) -> Admission {
        if !self.open {
            return Admission::Allowed;
        }
        match self.reset_at {
            Some(reset_at) if now < reset_at => Admission::Rejected {
                retry_in: reset_at - now,
            },
            _ => {
                self.open = false;
                self.reset_at = None;
                Admission::Recovered
            }
        }
    }

    /// Same check as [`CircuitBreaker::admit`] without changing state.
    pub(crate) fn peek(&self, now: Instant) -> Admission {
        match (self.open, self.reset_at) {
            (true, Some(reset_at)) if now < reset_at => Admission::Rejected {
                retry_in: reset_at - now,
            },
            (true, _) => Admission::Recovered,
            (false, _) => Admission::Allowed,
        }
    }

    pub(crate) fn record_success(&mut self) {
        self.consecutive_failures = 0;
    }

    /// Counts a failure; returns true if this failure opened the breaker.
    pub(crate) fn record_failure(&mut self, now: Instant) -> bool {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        if self.open || self.consecutive_failures < self.threshold {
            return false;
        }
        self.open = true;
        self.reset_at = Some(now + self.cooldown);
        true
    }

    pub(crate) fn is_open(&self) -> bool {
        self.open
    }

    pub(crate) fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }
}
