//! Tracking backend capability

use crate::errors::Result;
use crate::types::{ExperimentContext, ModelArtifact, ModelRegistration, RunId, RunStatus};

/// Experiment tracker and model registry.
///
/// Methods take `&self`; backends that hold mutable state use interior
/// locking. Every write must be safe to repeat with the same value so a
/// transient failure can be retried.
pub trait TrackingBackend {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Open a run under `ctx.experiment_name`, creating the experiment if needed
    fn start_run(&self, ctx: &ExperimentContext, run_name: Option<&str>) -> Result<RunId>;

    fn log_param(&self, run: &RunId, key: &str, value: &str) -> Result<()>;

    fn log_metric(&self, run: &RunId, key: &str, value: f64) -> Result<()>;

    fn set_tag(&self, run: &RunId, key: &str, value: &str) -> Result<()>;

    /// Store `artifact` under the run and, when `registered_name` is given,
    /// publish it as a new registry version
    fn log_model(
        &self,
        run: &RunId,
        artifact: &ModelArtifact,
        registered_name: Option<&str>,
    ) -> Result<ModelRegistration>;

    /// Close the run with a terminal status
    fn end_run(&self, run: &RunId, status: RunStatus) -> Result<()>;
}

impl<T: TrackingBackend + ?Sized> TrackingBackend for Box<T> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn start_run(&self, ctx: &ExperimentContext, run_name: Option<&str>) -> Result<RunId> {
        (**self).start_run(ctx, run_name)
    }

    fn log_param(&self, run: &RunId, key: &str, value: &str) -> Result<()> {
        (**self).log_param(run, key, value)
    }

    fn log_metric(&self, run: &RunId, key: &str, value: f64) -> Result<()> {
        (**self).log_metric(run, key, value)
    }

    fn set_tag(&self, run: &RunId, key: &str, value: &str) -> Result<()> {
        (**self).set_tag(run, key, value)
    }

    fn log_model(
        &self,
        run: &RunId,
        artifact: &ModelArtifact,
        registered_name: Option<&str>,
    ) -> Result<ModelRegistration> {
        (**self).log_model(run, artifact, registered_name)
    }

    fn end_run(&self, run: &RunId, status: RunStatus) -> Result<()> {
        (**self).end_run(run, status)
    }
}
