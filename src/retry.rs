//! Retry Executor
//!
//! Runs one remote call through the shared [`RateLimiter`], classifies each
//! failure and either retries with backoff or gives up. Attempts are strictly
//! sequential: attempt N+1 starts only after attempt N has been classified.

use crate::error::ApiError;
use crate::limiter::RateLimiter;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Retry policy configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Attempt budget for throttled calls (includes the first attempt)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base of the exponential backoff (milliseconds)
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Ceiling of the exponential backoff, before jitter (milliseconds)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Upper bound of the random jitter added to throttle backoff (milliseconds)
    #[serde(default = "default_max_jitter_ms")]
    pub max_jitter_ms: u64,

    /// Attempt budget for timed-out calls, capped by `max_attempts`
    #[serde(default = "default_timeout_attempts")]
    pub timeout_attempts: u32,

    /// Linear step for timeout backoff (milliseconds)
    #[serde(default = "default_timeout_delay_ms")]
    pub timeout_delay_ms: u64,

    /// Ledger entries kept in the limiter after a throttling response
    #[serde(default = "default_retain_after_throttle")]
    pub retain_after_throttle: usize,
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_delay_ms() -> u64 {
    2_000
}

fn default_max_delay_ms() -> u64 {
    60_000
}

fn default_max_jitter_ms() -> u64 {
    1_000
}

fn default_timeout_attempts() -> u32 {
    3
}

fn default_timeout_delay_ms() -> u64 {
    5_000
}

fn default_retain_after_throttle() -> usize {
    2
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            max_jitter_ms: default_max_jitter_ms(),
            timeout_attempts: default_timeout_attempts(),
            timeout_delay_ms: default_timeout_delay_ms(),
            retain_after_throttle: default_retain_after_throttle(),
        }
    }
}

impl RetryPolicy {
    /// Exponential backoff after the given failed attempt, before jitter
    pub fn throttle_delay(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let delay_ms = self
            .base_delay_ms
            .saturating_mul(factor)
            .min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }

    /// Linear backoff after the given timed-out attempt
    pub fn timeout_delay(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.timeout_delay_ms.saturating_mul(u64::from(attempt)))
    }

    pub fn timeout_budget(&self) -> u32 {
        self.timeout_attempts.min(self.max_attempts)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("max_attempts must be at least 1".to_string());
        }
        if self.base_delay_ms > self.max_delay_ms {
            return Err(format!(
                "base_delay_ms ({}) exceeds max_delay_ms ({})",
                self.base_delay_ms, self.max_delay_ms
            ));
        }
        Ok(())
    }
}

/// How a failed attempt is treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    RateLimited,
    Timeout,
    Fatal,
}

/// Classify a failure. Only throttling and timeouts are retryable.
pub fn classify(error: &ApiError) -> FailureClass {
    match error {
        ApiError::RateLimited(_) => FailureClass::RateLimited,
        ApiError::Timeout(_) => FailureClass::Timeout,
        ApiError::RemoteFailure { status: 429, .. } => FailureClass::RateLimited,
        ApiError::RemoteFailure { message, .. } | ApiError::Network(message)
            if ApiError::is_throttling_message(message) =>
        {
            FailureClass::RateLimited
        }
        _ => FailureClass::Fatal,
    }
}

/// Await `future` unless `cancel` fires first.
pub async fn cancellable<T, Fut>(cancel: &CancellationToken, future: Fut) -> Result<T, ApiError>
where
    Fut: Future<Output = Result<T, ApiError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ApiError::Cancelled),
        result = future => result,
    }
}

/// Bookkeeping for one orchestrated call; discarded when the call ends
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryState {
    pub attempt: u32,
    pub next_delay: Duration,
    pub accumulated_jitter: Duration,
    pub total_backoff: Duration,
}

/// Successful result plus the retry history that produced it
#[derive(Debug, Clone)]
pub struct RetryOutcome<T> {
    pub value: T,
    pub attempts: u32,
    pub total_backoff: Duration,
}

/// Executes fallible remote calls under the shared rate limiter
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    limiter: Arc<RateLimiter>,
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(limiter: Arc<RateLimiter>, policy: RetryPolicy) -> Self {
        Self { limiter, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Run `operation` until it succeeds, fails fatally, or exhausts its budget.
    ///
    /// `operation` receives the 1-based attempt number.
    pub async fn execute<T, F, Fut>(
        &self,
        label: &str,
        cancel: &CancellationToken,
        mut operation: F,
    ) -> Result<RetryOutcome<T>, ApiError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let mut state = RetryState::default();

        loop {
            state.attempt += 1;
            self.limiter.admit_or_cancel(cancel).await?;

            debug!(label, attempt = state.attempt, "Issuing remote call");
            let result = cancellable(cancel, operation(state.attempt)).await;

            let error = match result {
                Ok(value) => {
                    return Ok(RetryOutcome {
                        value,
                        attempts: state.attempt,
                        total_backoff: state.total_backoff,
                    });
                }
                Err(error) => error,
            };

            let class = classify(&error);
            let delay = match class {
                FailureClass::Fatal => {
                    warn!(label, attempt = state.attempt, error = %error, "Remote call failed fatally");
                    return Err(error);
                }
                FailureClass::RateLimited => {
                    if state.attempt >= self.policy.max_attempts {
                        return Err(self.exhausted(label, &state, error));
                    }
                    let jitter = self.jitter();
                    state.accumulated_jitter += jitter;
                    self.limiter.retain_latest(self.policy.retain_after_throttle);
                    self.policy.throttle_delay(state.attempt) + jitter
                }
                FailureClass::Timeout => {
                    if state.attempt >= self.policy.timeout_budget() {
                        return Err(self.exhausted(label, &state, error));
                    }
                    self.policy.timeout_delay(state.attempt)
                }
            };

            state.next_delay = delay;
            state.total_backoff += delay;
            warn!(
                label,
                attempt = state.attempt,
                class = ?class,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Retrying remote call"
            );

            tokio::select! {
                _ = cancel.cancelled() => return Err(ApiError::Cancelled),
                _ = sleep(delay) => {}
            }
        }
    }

    fn jitter(&self) -> Duration {
        if self.policy.max_jitter_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..=self.policy.max_jitter_ms))
    }

    fn exhausted(&self, label: &str, state: &RetryState, last: ApiError) -> ApiError {
        warn!(
            label,
            attempts = state.attempt,
            error = %last,
            "Remote call exhausted its retry budget"
        );
        ApiError::RetriesExhausted {
            attempts: state.attempt,
            last: Box::new(last),
        }
    }
}
