//! Retry with configurable backoff for transient failures.
//!
//! Only errors classified [`RepoError::is_transient`] are retried; every
//! other error propagates on the first occurrence. When the attempt budget
//! runs out the last transient error is wrapped in
//! [`RepoError::RetriesExhausted`] so callers can distinguish "failed" from
//! "failed after retrying".

use std::time::Duration;

use rand::Rng;
use tracing::warn;

use crate::error::{RepoError, RepoResult};

/// How the delay grows between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffStrategy {
    /// The base delay every time.
    Fixed,
    /// The base delay multiplied by the attempt number.
    Linear,
    /// The base delay doubled per attempt.
    Exponential,
}

/// Retry policy: attempt budget, base delay, growth, and jitter.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use repokit::retry::{BackoffStrategy, RetryPolicy};
///
/// let policy = RetryPolicy::new(3)
///     .with_base_delay(Duration::from_millis(50))
///     .with_strategy(BackoffStrategy::Exponential);
/// assert_eq!(policy.max_attempts, 3);
/// ```
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub base_delay: Duration,
    /// Delay growth across attempts.
    pub strategy: BackoffStrategy,
    /// Random fraction of the computed delay added on top, in `0.0..=1.0`.
    /// Keeps concurrently failing workers from retrying in lockstep.
    pub jitter_ratio: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            strategy: BackoffStrategy::Exponential,
            jitter_ratio: 0.1,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy with the given attempt budget and default backoff.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }

    /// Sets the delay before the second attempt.
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Sets the delay growth strategy.
    pub fn with_strategy(mut self, strategy: BackoffStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Sets the jitter ratio (clamped to `0.0..=1.0`).
    pub fn with_jitter_ratio(mut self, ratio: f64) -> Self {
        self.jitter_ratio = ratio.clamp(0.0, 1.0);
        self
    }

    /// The delay before retrying after failed attempt `attempt` (1-based),
    /// jitter included.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = match self.strategy {
            BackoffStrategy::Fixed => self.base_delay,
            BackoffStrategy::Linear => self.base_delay.saturating_mul(attempt),
            BackoffStrategy::Exponential => {
                self.base_delay.saturating_mul(2u32.saturating_pow(attempt - 1))
            }
        };
        if self.jitter_ratio <= 0.0 {
            return base;
        }
        let jitter = base.mul_f64(rand::thread_rng().gen_range(0.0..=self.jitter_ratio));
        base.saturating_add(jitter)
    }
}

/// Runs `op` under the policy, sleeping between transient failures.
pub fn execute_with_retry<T, F>(policy: &RetryPolicy, mut op: F) -> RepoResult<T>
where
    F: FnMut() -> RepoResult<T>,
{
    let mut attempt = 1;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < policy.max_attempts => {
                let delay = policy.delay_for(attempt);
                warn!(attempt, delay_ms = delay.as_millis() as u64, error = %err, "transient failure, retrying");
                std::thread::sleep(delay);
                attempt += 1;
            }
            Err(err) if err.is_transient() => {
                return Err(RepoError::RetriesExhausted {
                    attempts: policy.max_attempts,
                    source: Box::new(err),
                });
            }
            Err(err) => return Err(err),
        }
    }
}

/// Async variant of [`execute_with_retry`].
pub async fn execute_with_retry_async<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> RepoResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = RepoResult<T>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < policy.max_attempts => {
                let delay = policy.delay_for(attempt);
                warn!(attempt, delay_ms = delay.as_millis() as u64, error = %err, "transient failure, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) if err.is_transient() => {
                return Err(RepoError::RetriesExhausted {
                    attempts: policy.max_attempts,
                    source: Box::new(err),
                });
            }
            Err(err) => return Err(err),
        }
    }
}
