//! Scoped run guard
//!
//! An [`ActiveRun`] owns one open run on a backend and closes it exactly
//! once: `complete` closes it `FINISHED`, `fail` closes it `FAILED`, and
//! dropping a still-running guard (early return, `?`, panic unwind) closes
//! it `FAILED`.

use std::fmt::Display;
use tracing::{debug, info, warn};

use crate::backend::TrackingBackend;
use crate::errors::Result;
use crate::types::{ExperimentContext, ModelArtifact, ModelRegistration, RunId, RunStatus};

/// Lifecycle of a run as seen by the guard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    NotStarted,
    Running,
    Completed,
    Failed,
}

/// Tag recording why a run was closed `FAILED`
pub const FAILURE_REASON_TAG: &str = "failure_reason";

pub struct ActiveRun<'a> {
    tracker: &'a dyn TrackingBackend,
    run_id: RunId,
    state: RunState,
}

impl<'a> ActiveRun<'a> {
    /// Open a run; the guard is `Running` on success
    pub fn start(
        tracker: &'a dyn TrackingBackend,
        ctx: &ExperimentContext,
        run_name: Option<&str>,
    ) -> Result<Self> {
        let run_id = tracker.start_run(ctx, run_name)?;
        info!(
            backend = tracker.name(),
            run_id = %run_id,
            experiment = %ctx.experiment_name,
            "Run started"
        );
        Ok(Self {
            tracker,
            run_id,
            state: RunState::Running,
        })
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn log_param(&self, key: &str, value: impl Display) -> Result<()> {
        let value = value.to_string();
        debug!(run_id = %self.run_id, key, value = %value, "log_param");
        self.tracker.log_param(&self.run_id, key, &value)
    }

    pub fn log_metric(&self, key: &str, value: f64) -> Result<()> {
        debug!(run_id = %self.run_id, key, value, "log_metric");
        self.tracker.log_metric(&self.run_id, key, value)
    }

    pub fn set_tag(&self, key: &str, value: impl Display) -> Result<()> {
        let value = value.to_string();
        debug!(run_id = %self.run_id, key, value = %value, "set_tag");
        self.tracker.set_tag(&self.run_id, key, &value)
    }

    pub fn log_model(
        &self,
        artifact: &ModelArtifact,
        registered_name: Option<&str>,
    ) -> Result<ModelRegistration> {
        let registration = self
            .tracker
            .log_model(&self.run_id, artifact, registered_name)?;
        info!(
            run_id = %self.run_id,
            uri = %registration.artifact.uri,
            registered_name = ?registration.registered_name,
            version = ?registration.version,
            "Model logged"
        );
        Ok(registration)
    }

    /// Close the run `FINISHED`
    pub fn complete(mut self) -> Result<RunId> {
        self.close(RunStatus::Finished)?;
        Ok(self.run_id.clone())
    }

    /// Record `reason` and close the run `FAILED`
    pub fn fail(mut self, reason: &str) -> Result<()> {
        if let Err(e) = self.set_tag(FAILURE_REASON_TAG, reason) {
            warn!(run_id = %self.run_id, error = %e, "Could not record failure reason");
        }
        self.close(RunStatus::Failed)
    }

    fn close(&mut self, status: RunStatus) -> Result<()> {
        // The state moves before the call so a failed close is never retried by Drop.
        self.state = match status {
            RunStatus::Finished => RunState::Completed,
            _ => RunState::Failed,
        };
        self.tracker.end_run(&self.run_id, status)?;
        info!(run_id = %self.run_id, status = %status, "Run closed");
        Ok(())
    }
}

impl Drop for ActiveRun<'_> {
    fn drop(&mut self) {
        if self.state == RunState::Running {
            warn!(run_id = %self.run_id, "Run dropped while running, closing as FAILED");
            if let Err(e) = self.close(RunStatus::Failed) {
                warn!(run_id = %self.run_id, error = %e, "Failed to close run");
            }
        }
    }
}
