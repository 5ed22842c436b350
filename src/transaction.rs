//! Transactional execution: atomic units of work, retried and breaker-gated.
//!
//! [`TransactionManager`] (and its async twin) wraps a unit of work in
//! BEGIN/COMMIT with rollback on any error, so the outcome is never
//! ambiguous. `execute_with_retry` re-runs the whole unit of work on
//! transient failures, each attempt in a fresh transaction.
//! `execute_protected` additionally gates attempts through a shared
//! [`CircuitBreaker`].

use std::sync::Arc;

use tracing::warn;

use crate::breaker::CircuitBreaker;
use crate::core::{AsyncExecutor, Executor};
use crate::error::{RepoError, RepoResult};
use crate::retry::RetryPolicy;

/// Backend-health signal for the breaker: infrastructure failures count,
/// domain outcomes (validation, not-found, duplicates) do not.
fn is_breaker_failure(err: &RepoError) -> bool {
    matches!(err, RepoError::Transient(_) | RepoError::Backend(_))
        || matches!(err, RepoError::RetriesExhausted { source, .. } if is_breaker_failure(source))
}

/// Runs units of work transactionally over a blocking executor.
#[derive(Debug, Clone, Default)]
pub struct TransactionManager {
    retry: RetryPolicy,
    breaker: Option<Arc<CircuitBreaker>>,
}

impl TransactionManager {
    /// Creates a manager with the default retry policy and no breaker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the retry policy used by `execute_with_retry` and
    /// `execute_protected`.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Shares a circuit breaker; `execute_protected` gates through it.
    pub fn with_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.breaker = Some(breaker);
        self
    }

    /// Runs `f` inside a transaction: commit on `Ok`, rollback on `Err`.
    ///
    /// A rollback failure is logged and the original error propagates.
    pub fn with_transaction<E, T>(
        &self,
        executor: &mut E,
        f: impl FnOnce(&mut E) -> RepoResult<T>,
    ) -> RepoResult<T>
    where
        E: Executor,
    {
        executor.begin()?;
        match f(executor) {
            Ok(value) => {
                executor.commit()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = executor.rollback() {
                    warn!(error = %rollback_err, "rollback failed after aborted transaction");
                }
                Err(err)
            }
        }
    }

    /// Runs `f` transactionally, retrying the whole unit of work on
    /// transient failures. Each attempt gets a fresh transaction.
    pub fn execute_with_retry<E, T>(
        &self,
        executor: &mut E,
        mut f: impl FnMut(&mut E) -> RepoResult<T>,
    ) -> RepoResult<T>
    where
        E: Executor,
    {
        crate::retry::execute_with_retry(&self.retry, || {
            self.with_transaction(&mut *executor, &mut f)
        })
    }

    /// Runs `f` transactionally with retry, gated through the breaker when
    /// one is configured.
    pub fn execute_protected<E, T>(
        &self,
        executor: &mut E,
        f: impl FnMut(&mut E) -> RepoResult<T>,
    ) -> RepoResult<T>
    where
        E: Executor,
    {
        let Some(breaker) = &self.breaker else {
            return self.execute_with_retry(executor, f);
        };
        breaker.try_acquire()?;
        match self.execute_with_retry(executor, f) {
            Ok(value) => {
                breaker.record_success();
                Ok(value)
            }
            Err(err) => {
                if is_breaker_failure(&err) {
                    breaker.record_failure();
                } else {
                    breaker.record_success();
                }
                Err(err)
            }
        }
    }
}

/// Async twin of [`TransactionManager`].
#[derive(Debug, Clone, Default)]
pub struct AsyncTransactionManager {
    retry: RetryPolicy,
    breaker: Option<Arc<CircuitBreaker>>,
}

impl AsyncTransactionManager {
    /// Creates a manager with the default retry policy and no breaker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the retry policy used by `execute_with_retry` and
    /// `execute_protected`.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Shares a circuit breaker; `execute_protected` gates through it.
    pub fn with_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.breaker = Some(breaker);
        self
    }

    /// Runs `f` inside a transaction: commit on `Ok`, rollback on `Err`.
    pub async fn with_transaction<E, T>(
        &self,
        executor: &mut E,
        f: impl AsyncFnOnce(&mut E) -> RepoResult<T>,
    ) -> RepoResult<T>
    where
        E: AsyncExecutor,
    {
        executor.begin().await?;
        match f(executor).await {
            Ok(value) => {
                executor.commit().await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = executor.rollback().await {
                    warn!(error = %rollback_err, "rollback failed after aborted transaction");
                }
                Err(err)
            }
        }
    }

    /// Runs `f` transactionally, retrying the whole unit of work on
    /// transient failures.
    pub async fn execute_with_retry<E, T>(
        &self,
        executor: &mut E,
        mut f: impl AsyncFnMut(&mut E) -> RepoResult<T>,
    ) -> RepoResult<T>
    where
        E: AsyncExecutor,
    {
        let mut attempt = 1;
        loop {
            let result = self.with_transaction(&mut *executor, &mut f).await;
            match result {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay_for(attempt);
                    warn!(attempt, delay_ms = delay.as_millis() as u64, error = %err, "transient failure, retrying transaction");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) if err.is_transient() => {
                    return Err(RepoError::RetriesExhausted {
                        attempts: self.retry.max_attempts,
                        source: Box::new(err),
                    });
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Runs `f` transactionally with retry, gated through the breaker when
    /// one is configured.
    pub async fn execute_protected<E, T>(
        &self,
        executor: &mut E,
        f: impl AsyncFnMut(&mut E) -> RepoResult<T>,
    ) -> RepoResult<T>
    where
        E: AsyncExecutor,
    {
        let Some(breaker) = &self.breaker else {
            return self.execute_with_retry(executor, f).await;
        };
        breaker.try_acquire()?;
        match self.execute_with_retry(executor, f).await {
            Ok(value) => {
                breaker.record_success();
                Ok(value)
            }
            Err(err) => {
                if is_breaker_failure(&err) {
                    breaker.record_failure();
                } else {
                    breaker.record_success();
                }
                Err(err)
            }
        }
    }
}
