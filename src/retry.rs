//! Bounded retry with exponential backoff behind a rate limiter.
//!
//! Every attempt first asks the limiter for a grant, then runs the
//! operation. Failed attempts back off for `2^attempt` backoff units; the
//! last allowed attempt gives up with [`CallError::Exhausted`] without
//! sleeping. A rejected attempt stops the loop at once.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::{debug, warn};

use crate::error::{CallError, ConfigurationError, ExtractError};
use crate::metrics::{EXTRACTION_ATTEMPTS, EXTRACTION_EXHAUSTED, EXTRACTION_RETRIES};
use crate::rate_limit::RateLimiter;

// Floor for admission polling so a zero hint never spins
const MIN_POLL: Duration = Duration::from_millis(1);

/// Result of one remote attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attempt<T> {
    Success(T),
    Transient(String),
    Invalid(String),
    // retrying cannot help (bad request, bad credentials)
    Rejected(String),
}

impl<T> From<Result<T, ExtractError>> for Attempt<T> {
    fn from(result: Result<T, ExtractError>) -> Self {
        match result {
            Ok(value) => Attempt::Success(value),
            Err(ExtractError::Transient(reason)) => Attempt::Transient(reason),
            Err(ExtractError::Invalid(reason)) => Attempt::Invalid(reason),
            Err(ExtractError::Rejected(reason)) => Attempt::Rejected(reason),
        }
    }
}

/// What to do when the limiter denies an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Sleep (at most `poll` at a time) and ask again.
    Wait { poll: Duration },
    /// Give up with [`CallError::RateLimitExceeded`].
    FailFast,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub backoff_unit: Duration,
    pub admission: Admission,
    pub overall_timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            backoff_unit: Duration::from_secs(1),
            admission: Admission::Wait {
                poll: Duration::from_millis(250),
            },
            overall_timeout: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Backoff(Duration),
    Exhausted,
}

/// Decide what follows a failed attempt (0-based index).
pub fn next_step(attempt: u32, max_retries: u32, unit: Duration) -> Step {
    if attempt.saturating_add(1) >= max_retries {
        return Step::Exhausted;
    }
    Step::Backoff(unit.saturating_mul(2u32.saturating_pow(attempt)))
}

// Per-call bookkeeping, dropped with the call
#[derive(Debug, Default)]
struct AttemptRecord {
    index: u32,
    backoff: Duration,
    last_error: String,
}

pub struct RetryingCaller<K> {
    limiter: Arc<dyn RateLimiter<K>>,
    policy: RetryPolicy,
}

impl<K> RetryingCaller<K>
where
    K: std::fmt::Debug + Send + Sync,
{
    pub fn new(limiter: Arc<dyn RateLimiter<K>>, policy: RetryPolicy) -> Self {
        Self { limiter, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `operation` until it succeeds or `max_retries` attempts failed.
    pub async fn call<T, F, Fut>(
        &self,
        operation: F,
        key: &K,
        max_retries: u32,
    ) -> Result<T, CallError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Attempt<T>>,
    {
        if max_retries == 0 {
            return Err(ConfigurationError::ZeroRetries.into());
        }

        let Some(budget) = self.policy.overall_timeout else {
            return self.drive(operation, key, max_retries).await;
        };

        let started = Instant::now();
        match tokio::time::timeout(budget, self.drive(operation, key, max_retries)).await {
            Ok(result) => result,
            Err(_) => {
                let elapsed = started.elapsed();
                warn!(?key, ?elapsed, "extraction deadline exceeded");
                Err(CallError::DeadlineExceeded { elapsed })
            }
        }
    }

    async fn drive<T, F, Fut>(
        &self,
        mut operation: F,
        key: &K,
        max_retries: u32,
    ) -> Result<T, CallError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Attempt<T>>,
    {
        let mut record = AttemptRecord::default();

        loop {
            self.admit(key).await?;
            EXTRACTION_ATTEMPTS.inc();

            record.last_error = match operation().await {
                Attempt::Success(value) => {
                    debug!(?key, attempt = record.index + 1, "attempt succeeded");
                    return Ok(value);
                }
                Attempt::Transient(reason) => {
                    warn!(?key, attempt = record.index + 1, %reason, "attempt failed");
                    reason
                }
                Attempt::Invalid(reason) => {
                    warn!(
                        ?key,
                        attempt = record.index + 1,
                        %reason,
                        "attempt returned invalid data"
                    );
                    format!("validation failed: {reason}")
                }
                Attempt::Rejected(reason) => {
                    warn!(?key, attempt = record.index + 1, %reason, "attempt rejected");
                    return Err(CallError::Rejected {
                        attempts: record.index + 1,
                        reason,
                    });
                }
            };

            match next_step(record.index, max_retries, self.policy.backoff_unit) {
                Step::Exhausted => {
                    EXTRACTION_EXHAUSTED.inc();
                    warn!(
                        ?key,
                        attempts = record.index + 1,
                        backoff = ?record.backoff,
                        "all attempts failed"
                    );
                    return Err(CallError::Exhausted {
                        attempts: record.index + 1,
                        last_error: record.last_error,
                    });
                }
                Step::Backoff(delay) => {
                    EXTRACTION_RETRIES.inc();
                    debug!(?key, ?delay, "backing off before retry");
                    sleep(delay).await;
                    record.backoff += delay;
                    record.index += 1;
                }
            }
        }
    }

    // Nothing is recorded for a denied or abandoned admission
    async fn admit(&self, key: &K) -> Result<(), CallError> {
        loop {
            if self.limiter.is_allowed(key) {
                return Ok(());
            }

            match self.policy.admission {
                Admission::FailFast => {
                    return Err(CallError::RateLimitExceeded {
                        retry_after: self.limiter.retry_after(key),
                    });
                }
                Admission::Wait { poll } => {
                    let wait = self
                        .limiter
                        .retry_after(key)
                        .map_or(poll, |hint| hint.min(poll))
                        .max(MIN_POLL);
                    debug!(?key, ?wait, "rate limited, waiting for a slot");
                    sleep(wait).await;
                }
            }
        }
    }
}
