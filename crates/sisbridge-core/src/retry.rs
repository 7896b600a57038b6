//! Bounded retries with exponential backoff, per-attempt timeouts and a
//! caller deadline.
//!
//! Only transient upstream failures (timeouts, dropped connections, 5xx) are
//! retried. Anything else returns after exactly one call.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::upstream::{UpstreamError, UpstreamErrorKind};

/// Exponential backoff between attempts: `base * factor^retry`, capped at
/// `max`, with optional +/- 50% jitter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    pub base: Duration,
    pub factor: f64,
    pub max: Duration,
    pub jitter: bool,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(500),
            factor: 2.0,
            max: Duration::from_secs(8),
            jitter: false,
        }
    }
}

impl Backoff {
    /// Delay before retry number `retry` (0-based).
    pub fn delay(self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        let seconds = self.base.as_secs_f64() * self.factor.powi(exponent);
        let capped_seconds = seconds.min(self.max.as_secs_f64());
        let delay = Duration::from_secs_f64(capped_seconds.max(0.0));

        if !self.jitter {
            return delay;
        }

        let jitter_ms = (delay.as_millis() as f64 * 0.5) as u64;
        let offset = fastrand::u64(0..=(jitter_ms * 2));
        let total_ms = (delay.as_millis() as u64 + offset).saturating_sub(jitter_ms);
        Duration::from_millis(total_ms).min(self.max)
    }
}

/// Retry policy applied to every upstream read.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub per_attempt_timeout: Duration,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            per_attempt_timeout: Duration::from_secs(10),
            jitter: false,
        }
    }
}

impl RetryPolicy {
    pub fn backoff(&self) -> Backoff {
        Backoff {
            base: self.base_delay,
            factor: 2.0,
            max: self.max_delay,
            jitter: self.jitter,
        }
    }

    /// Delay after failed attempt number `attempt` (1-based):
    /// `base * 2^(attempt - 1)`, capped at `max_delay`.
    pub fn delay_after_attempt(&self, attempt: u32) -> Duration {
        self.backoff().delay(attempt.saturating_sub(1))
    }
}

/// Passed to every attempt so the operation can bound its own I/O.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptContext {
    /// 1-based attempt number.
    pub attempt: u32,
    /// `min(per_attempt_timeout, time left until the deadline)`.
    pub timeout: Duration,
}

/// Why the executor gave up.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RetryError {
    #[error("upstream failed with a non-retryable error after {attempts} attempt(s): {source}")]
    Terminal {
        attempts: u32,
        #[source]
        source: UpstreamError,
    },
    #[error("upstream still failing after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        #[source]
        last: UpstreamError,
    },
    #[error("caller deadline exceeded after {attempts} attempt(s)")]
    DeadlineExceeded {
        attempts: u32,
        last: Option<UpstreamError>,
    },
}

impl RetryError {
    pub const fn attempts(&self) -> u32 {
        match self {
            Self::Terminal { attempts, .. }
            | Self::Exhausted { attempts, .. }
            | Self::DeadlineExceeded { attempts, .. } => *attempts,
        }
    }

    /// The last upstream error observed, if any attempt completed.
    pub fn last_error(&self) -> Option<&UpstreamError> {
        match self {
            Self::Terminal { source, .. } => Some(source),
            Self::Exhausted { last, .. } => Some(last),
            Self::DeadlineExceeded { last, .. } => last.as_ref(),
        }
    }

    pub fn kind(&self) -> Option<UpstreamErrorKind> {
        self.last_error().map(UpstreamError::kind)
    }

    pub fn status(&self) -> Option<u16> {
        self.last_error().and_then(UpstreamError::status)
    }

    pub const fn is_deadline(&self) -> bool {
        matches!(self, Self::DeadlineExceeded { .. })
    }
}

/// Runs an upstream operation under a [`RetryPolicy`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Runs `operation` until it succeeds, fails terminally, runs out of
    /// attempts or would cross `deadline`.
    pub async fn execute<T, F, Fut>(
        &self,
        deadline: Option<Instant>,
        mut operation: F,
    ) -> Result<T, RetryError>
    where
        F: FnMut(AttemptContext) -> Fut,
        Fut: Future<Output = Result<T, UpstreamError>>,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut last: Option<UpstreamError> = None;
        let mut attempt = 0_u32;

        loop {
            attempt += 1;

            let (budget, clipped) = match deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Err(RetryError::DeadlineExceeded {
                            attempts: attempt - 1,
                            last,
                        });
                    }
                    if remaining < self.policy.per_attempt_timeout {
                        (remaining, true)
                    } else {
                        (self.policy.per_attempt_timeout, false)
                    }
                }
                None => (self.policy.per_attempt_timeout, false),
            };

            let context = AttemptContext {
                attempt,
                timeout: budget,
            };
            let outcome = match tokio::time::timeout(budget, operation(context)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(UpstreamError::timeout(format!(
                    "attempt {attempt} exceeded {} ms",
                    budget.as_millis()
                ))),
            };

            let error = match outcome {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(attempt, "upstream call recovered after retry");
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            if !error.retryable() {
                return Err(RetryError::Terminal {
                    attempts: attempt,
                    source: error,
                });
            }

            if clipped && error.kind() == UpstreamErrorKind::Timeout {
                return Err(RetryError::DeadlineExceeded {
                    attempts: attempt,
                    last: Some(error),
                });
            }

            if attempt >= max_attempts {
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    last: error,
                });
            }

            let delay = self.policy.delay_after_attempt(attempt);
            if let Some(deadline) = deadline {
                let wakes_at = Instant::now().checked_add(delay);
                if wakes_at.map_or(true, |wakes_at| wakes_at >= deadline) {
                    return Err(RetryError::DeadlineExceeded {
                        attempts: attempt,
                        last: Some(error),
                    });
                }
            }

            warn!(
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "transient upstream failure; retrying"
            );
            tokio::time::sleep(delay).await;
            last = Some(error);
        }
    }
}
