//! Circuit breaker for failing backends.
//!
//! Classic three-state breaker: `Closed` counts consecutive failures, `Open`
//! rejects calls without invoking the backend until the recovery timeout
//! elapses, `HalfOpen` admits exactly one trial call whose outcome decides
//! between closing and re-opening. State is a single mutex-guarded struct;
//! no background tasks, transitions happen on the calling thread.

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::warn;

use crate::error::{RepoError, RepoResult};

/// Breaker thresholds.
#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that trip the breaker open.
    pub failure_threshold: u32,
    /// How long the breaker stays open before admitting a trial call.
    pub recovery_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(30),
        }
    }
}

impl CircuitBreakerConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the consecutive-failure trip point.
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Sets the open-state cooldown.
    pub fn with_recovery_timeout(mut self, timeout: Duration) -> Self {
        self.recovery_timeout = timeout;
        self
    }
}

/// The observable state of a breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Calls flow through; failures are counted.
    Closed,
    /// Calls are rejected without reaching the backend.
    Open,
    /// One trial call is in flight; its outcome decides the next state.
    HalfOpen,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Instant,
    trial_in_flight: bool,
}

/// A thread-safe circuit breaker.
///
/// Callers bracket each protected operation with [`try_acquire`] and then
/// either [`record_success`] or [`record_failure`]. The transaction manager
/// does this wiring; direct use is only needed for custom call sites.
///
/// [`try_acquire`]: CircuitBreaker::try_acquire
/// [`record_success`]: CircuitBreaker::record_success
/// [`record_failure`]: CircuitBreaker::record_failure
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    /// Creates a closed breaker.
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: Instant::now(),
                trial_in_flight: false,
            }),
        }
    }

    /// The current state. An open breaker past its cooldown reports
    /// `HalfOpen`; this is a pure read and never consumes the trial slot,
    /// so observers may poll it freely.
    pub fn state(&self) -> CircuitState {
        let inner = self.inner.lock();
        if inner.state == CircuitState::Open
            && inner.opened_at.elapsed() >= self.config.recovery_timeout
        {
            return CircuitState::HalfOpen;
        }
        inner.state
    }

    /// Requests permission to invoke the protected backend.
    ///
    /// While open and cooling, fails with [`RepoError::CircuitOpen`] carrying
    /// the remaining cooldown. Once the timeout elapses, exactly one caller
    /// is admitted as the half-open trial; concurrent callers keep seeing
    /// `CircuitOpen` until the trial resolves.
    pub fn try_acquire(&self) -> RepoResult<()> {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => Ok(()),
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    return Err(RepoError::CircuitOpen { retry_after_ms: 0 });
                }
                inner.trial_in_flight = true;
                Ok(())
            }
            CircuitState::Open => {
                let elapsed = inner.opened_at.elapsed();
                if elapsed >= self.config.recovery_timeout {
                    inner.state = CircuitState::HalfOpen;
                    inner.trial_in_flight = true;
                    return Ok(());
                }
                let remaining = self.config.recovery_timeout - elapsed;
                Err(RepoError::CircuitOpen {
                    retry_after_ms: remaining.as_millis() as u64,
                })
            }
        }
    }

    /// Records a successful call: closes the breaker and resets the count.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.trial_in_flight = false;
    }

    /// Records a failed call: re-opens from half-open, or counts toward the
    /// trip threshold when closed.
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.opened_at = Instant::now();
                inner.trial_in_flight = false;
                warn!("circuit breaker trial failed, reopening");
            }
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.failure_threshold {
                    inner.state = CircuitState::Open;
                    inner.opened_at = Instant::now();
                    warn!(
                        failures = inner.consecutive_failures,
                        "circuit breaker opened"
                    );
                }
            }
            CircuitState::Open => {}
        }
    }
}
