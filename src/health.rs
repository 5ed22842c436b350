//! Connectivity and latency diagnostics.
//!
//! The checker issues a trivial probe query (`SELECT 1`) and classifies the
//! outcome: errors are unhealthy, slow probes are degraded, the rest is
//! healthy. The async checker enforces `query_timeout` with
//! [`tokio::time::timeout`]; the blocking checker cannot preempt a stuck
//! driver, so it classifies after the fact against the same threshold.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::{AsyncExecutor, Executor, Statement};

const PROBE_SQL: &str = "SELECT 1";

/// Health-check thresholds.
#[derive(Debug, Clone, Copy)]
pub struct HealthConfig {
    /// Budget for the bare connectivity probe.
    pub connection_timeout: Duration,
    /// Budget for probe execution; exceeding it is unhealthy.
    pub query_timeout: Duration,
    /// Probe latency above this is degraded.
    pub slow_query_threshold: Duration,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            connection_timeout: Duration::from_secs(2),
            query_timeout: Duration::from_secs(5),
            slow_query_threshold: Duration::from_millis(250),
        }
    }
}

impl HealthConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the connectivity-probe budget.
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Sets the probe execution budget.
    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    /// Sets the degraded-latency threshold.
    pub fn with_slow_query_threshold(mut self, threshold: Duration) -> Self {
        self.slow_query_threshold = threshold;
        self
    }
}

/// Overall store health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// The probe succeeded within the latency threshold.
    Healthy,
    /// The probe succeeded but slower than the threshold.
    Degraded,
    /// The probe failed or exceeded its budget.
    Unhealthy,
}

/// Outcome of one health check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    /// Classified status.
    pub status: HealthStatus,
    /// Human-readable detail.
    pub message: String,
    /// Probe duration in milliseconds.
    pub duration_ms: u64,
}

impl HealthCheckResult {
    /// Returns `true` unless the store is unhealthy.
    pub fn is_available(&self) -> bool {
        self.status != HealthStatus::Unhealthy
    }
}

fn classify(config: &HealthConfig, elapsed: Duration, backend: &str) -> HealthCheckResult {
    let duration_ms = elapsed.as_millis() as u64;
    let (status, message) = if elapsed > config.query_timeout {
        (
            HealthStatus::Unhealthy,
            format!("{backend} probe exceeded {}ms budget", config.query_timeout.as_millis()),
        )
    } else if elapsed > config.slow_query_threshold {
        (HealthStatus::Degraded, format!("{backend} probe slow ({duration_ms}ms)"))
    } else {
        (HealthStatus::Healthy, format!("{backend} reachable"))
    };
    HealthCheckResult {
        status,
        message,
        duration_ms,
    }
}

fn unhealthy(message: String, elapsed: Duration) -> HealthCheckResult {
    HealthCheckResult {
        status: HealthStatus::Unhealthy,
        message,
        duration_ms: elapsed.as_millis() as u64,
    }
}

/// Blocking health checker.
#[derive(Debug, Clone, Default)]
pub struct HealthChecker {
    config: HealthConfig,
}

impl HealthChecker {
    /// Creates a checker with the given thresholds.
    pub fn new(config: HealthConfig) -> Self {
        Self { config }
    }

    /// Probes bare connectivity: healthy or unhealthy, nothing in between.
    pub fn check_connectivity<E: Executor>(&self, executor: &mut E) -> HealthCheckResult {
        let backend = executor.backend_name();
        let probe = Statement::new(PROBE_SQL, Vec::new());
        let started = Instant::now();
        match executor.fetch(&probe) {
            Ok(_) if started.elapsed() <= self.config.connection_timeout => HealthCheckResult {
                status: HealthStatus::Healthy,
                message: format!("{backend} reachable"),
                duration_ms: started.elapsed().as_millis() as u64,
            },
            Ok(_) => unhealthy(
                format!(
                    "{backend} probe exceeded {}ms budget",
                    self.config.connection_timeout.as_millis()
                ),
                started.elapsed(),
            ),
            Err(err) => unhealthy(format!("{backend} probe failed: {err}"), started.elapsed()),
        }
    }

    /// Probes the store and classifies latency against the thresholds. Never
    /// returns an error; failures are folded into the status.
    pub fn check_health<E: Executor>(&self, executor: &mut E) -> HealthCheckResult {
        let backend = executor.backend_name();
        let probe = Statement::new(PROBE_SQL, Vec::new());
        let started = Instant::now();
        let result = match executor.fetch(&probe) {
            Ok(_) => classify(&self.config, started.elapsed(), backend),
            Err(err) => unhealthy(format!("{backend} probe failed: {err}"), started.elapsed()),
        };
        debug!(backend, status = ?result.status, duration_ms = result.duration_ms, "health check");
        result
    }
}

/// Async health checker.
#[derive(Debug, Clone, Default)]
pub struct AsyncHealthChecker {
    config: HealthConfig,
}

impl AsyncHealthChecker {
    /// Creates a checker with the given thresholds.
    pub fn new(config: HealthConfig) -> Self {
        Self { config }
    }

    /// Probes bare connectivity within `connection_timeout`: healthy or
    /// unhealthy, nothing in between.
    pub async fn check_connectivity<E: AsyncExecutor>(&self, executor: &mut E) -> HealthCheckResult {
        let backend = executor.backend_name();
        let probe = Statement::new(PROBE_SQL, Vec::new());
        let started = Instant::now();
        match tokio::time::timeout(self.config.connection_timeout, executor.fetch(&probe)).await {
            Ok(Ok(_)) => HealthCheckResult {
                status: HealthStatus::Healthy,
                message: format!("{backend} reachable"),
                duration_ms: started.elapsed().as_millis() as u64,
            },
            Ok(Err(err)) => {
                unhealthy(format!("{backend} probe failed: {err}"), started.elapsed())
            }
            Err(_) => unhealthy(
                format!(
                    "{backend} probe exceeded {}ms budget",
                    self.config.connection_timeout.as_millis()
                ),
                started.elapsed(),
            ),
        }
    }

    /// Probes the store and classifies latency against the thresholds,
    /// aborting the probe at the query timeout.
    pub async fn check_health<E: AsyncExecutor>(&self, executor: &mut E) -> HealthCheckResult {
        let backend = executor.backend_name();
        let probe = Statement::new(PROBE_SQL, Vec::new());
        let started = Instant::now();
        let result = match tokio::time::timeout(self.config.query_timeout, executor.fetch(&probe))
            .await
        {
            Ok(Ok(_)) => classify(&self.config, started.elapsed(), backend),
            Ok(Err(err)) => {
                unhealthy(format!("{backend} probe failed: {err}"), started.elapsed())
            }
            Err(_) => unhealthy(
                format!(
                    "{backend} probe exceeded {}ms budget",
                    self.config.query_timeout.as_millis()
                ),
                started.elapsed(),
            ),
        };
        debug!(backend, status = ?result.status, duration_ms = result.duration_ms, "health check");
        result
    }
}
