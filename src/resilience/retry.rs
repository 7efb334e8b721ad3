//! Bounded exponential-backoff retry around one provider's `generate` call.
//!
//! Only `Timeout` and `Transient` failures are retried. `QuotaExceeded` and `Invalid`
//! return at once so the caller can fall back to the next provider.

use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::warn;

use crate::provider::ProviderError;
use crate::types::AttemptFailure;

/// Retry budget for one provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one (at least 1).
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
        }
    }
}

/// What happened across all attempts on one provider.
#[derive(Debug)]
pub struct RetryOutcome {
    pub result: Result<String, ProviderError>,
    /// Calls actually issued to the provider.
    pub attempts: u32,
    /// Every failed attempt, in order.
    pub failures: Vec<AttemptFailure>,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            max_attempts,
            base_backoff,
            max_backoff,
        }
    }

    /// A policy that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay after failed attempt `attempt` (1-based): `base * 2^(attempt-1)`, capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1);
        let factor = 1u32.checked_shl(exp).unwrap_or(u32::MAX);
        self.base_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }

    /// Run `call` until it succeeds, fails non-retryably, or the budget is spent.
    ///
    /// Each attempt is bounded by `timeout` and by whatever is left before `deadline`.
    /// A backoff that would end past the deadline is not slept; the last error is
    /// returned instead.
    pub async fn execute<F, Fut>(
        &self,
        provider: &str,
        timeout: Duration,
        deadline: Instant,
        mut call: F,
    ) -> RetryOutcome
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<String, ProviderError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut failures = Vec::new();
        let mut attempt: u32 = 0;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                let err = ProviderError::timeout(provider, "overall deadline exhausted");
                failures.push(AttemptFailure::from_error(&err, attempt + 1, 0));
                return RetryOutcome {
                    result: Err(err),
                    attempts: attempt,
                    failures,
                };
            }

            attempt += 1;
            let budget = timeout.min(remaining);
            let started = Instant::now();
            let result = match tokio::time::timeout(budget, call()).await {
                Ok(r) => r,
                Err(_) => Err(ProviderError::timeout(
                    provider,
                    format!("no reply within {}ms", budget.as_millis()),
                )),
            };
            let latency_ms = started.elapsed().as_millis() as u64;

            let err = match result {
                Ok(text) => {
                    return RetryOutcome {
                        result: Ok(text),
                        attempts: attempt,
                        failures,
                    }
                }
                Err(err) => err,
            };

            warn!(
                provider,
                attempt,
                error_kind = err.kind.name(),
                latency_ms,
                error = %err,
                "provider attempt failed"
            );
            failures.push(AttemptFailure::from_error(&err, attempt, latency_ms));

            if !err.is_retryable() || attempt >= max_attempts {
                return RetryOutcome {
                    result: Err(err),
                    attempts: attempt,
                    failures,
                };
            }

            let delay = self.backoff(attempt);
            let resume = Instant::now().checked_add(delay);
            if !matches!(resume, Some(at) if at < deadline) {
                return RetryOutcome {
                    result: Err(err),
                    attempts: attempt,
                    failures,
                };
            }
            tokio::time::sleep(delay).await;
        }
    }
}
