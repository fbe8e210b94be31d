//! Bounded retry with exponential backoff
//!
//! Used for object storage reads and tracking calls. Only errors the caller
//! classifies as transient are retried; everything else returns at once.

use readiness_tracking::{
    ExperimentContext, ModelArtifact, ModelRegistration, RunId, RunStatus, TrackingBackend,
    TrackingError,
};
use std::fmt::Display;
use std::thread;
use std::time::Duration;
use tracing::warn;

use crate::config::RetryConfig;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first; at least 1
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub multiplier: f64,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            multiplier: config.multiplier,
            max_backoff: Duration::from_millis(config.max_backoff_ms),
        }
    }

    /// Single attempt, no retries
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            multiplier: 1.0,
            max_backoff: Duration::ZERO,
        }
    }

    /// Delay before retry number `retry` (1-based)
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = self.multiplier.powi(retry.saturating_sub(1) as i32);
        let millis = self.initial_backoff.as_millis() as f64 * factor;
        let capped = millis.min(self.max_backoff.as_millis() as f64);
        Duration::from_millis(capped.max(0.0) as u64)
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out
    pub fn run<T, E, F>(&self, what: &str, is_transient: impl Fn(&E) -> bool, mut op: F) -> Result<T, E>
    where
        E: Display,
        F: FnMut() -> Result<T, E>,
    {
        let mut attempt = 1;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(err) if attempt < self.max_attempts && is_transient(&err) => {
                    let delay = self.backoff(attempt);
                    warn!(
                        operation = what,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient failure, retrying"
                    );
                    thread::sleep(delay);
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Tracking backend decorator that retries transient failures.
///
/// `start_run` is attempted once: a lost response could otherwise leave a
/// second run behind on the server.
pub struct RetryingTracker<'a> {
    inner: &'a dyn TrackingBackend,
    policy: RetryPolicy,
}

impl<'a> RetryingTracker<'a> {
    pub fn new(inner: &'a dyn TrackingBackend, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    fn retry<T>(
        &self,
        what: &str,
        op: impl FnMut() -> Result<T, TrackingError>,
    ) -> Result<T, TrackingError> {
        self.policy.run(what, TrackingError::is_transient, op)
    }
}

impl TrackingBackend for RetryingTracker<'_> {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn start_run(
        &self,
        ctx: &ExperimentContext,
        run_name: Option<&str>,
    ) -> Result<RunId, TrackingError> {
        self.inner.start_run(ctx, run_name)
    }

    fn log_param(&self, run: &RunId, key: &str, value: &str) -> Result<(), TrackingError> {
        self.retry("log_param", || self.inner.log_param(run, key, value))
    }

    fn log_metric(&self, run: &RunId, key: &str, value: f64) -> Result<(), TrackingError> {
        self.retry("log_metric", || self.inner.log_metric(run, key, value))
    }

    fn set_tag(&self, run: &RunId, key: &str, value: &str) -> Result<(), TrackingError> {
        self.retry("set_tag", || self.inner.set_tag(run, key, value))
    }

    fn log_model(
        &self,
        run: &RunId,
        artifact: &ModelArtifact,
        registered_name: Option<&str>,
    ) -> Result<ModelRegistration, TrackingError> {
        self.retry("log_model", || {
            self.inner.log_model(run, artifact, registered_name)
        })
    }

    fn end_run(&self, run: &RunId, status: RunStatus) -> Result<(), TrackingError> {
        self.retry("end_run", || self.inner.end_run(run, status))
    }
}
