//! In-process tracking backend
//!
//! Keeps every run, artifact and registry version in memory and exposes them
//! for inspection. Faults can be queued per operation to exercise retry and
//! failure paths.

use parking_lot::RwLock;
use std::collections::{BTreeMap, VecDeque};
use uuid::Uuid;

use crate::backend::TrackingBackend;
use crate::errors::{Result, TrackingError};
use crate::types::{
    ArtifactRef, ExperimentContext, ModelArtifact, ModelRegistration, RegisteredModel, RunId,
    RunRecord, RunStatus,
};

/// Backend operations, for fault injection and call counting
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TrackingOp {
    StartRun,
    LogParam,
    LogMetric,
    SetTag,
    LogModel,
    EndRun,
}

/// Injected failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Surfaces as a transient `TrackingError::Unavailable`
    Unavailable,
    /// Surfaces as a permanent `TrackingError::Rejected`
    Rejected,
}

#[derive(Default)]
struct MemoryState {
    experiments: BTreeMap<String, String>,
    runs: BTreeMap<RunId, RunRecord>,
    run_order: Vec<RunId>,
    registry: BTreeMap<String, RegisteredModel>,
    artifacts: BTreeMap<String, Vec<u8>>,
    closes: BTreeMap<RunId, usize>,
    calls: BTreeMap<TrackingOp, usize>,
    faults: BTreeMap<TrackingOp, VecDeque<Fault>>,
}

#[derive(Default)]
pub struct MemoryTracker {
    state: RwLock<MemoryState>,
}

impl MemoryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `times` calls of `op` fail with `fault`
    pub fn inject_fault(&self, op: TrackingOp, fault: Fault, times: usize) {
        let mut state = self.state.write();
        let queue = state.faults.entry(op).or_default();
        queue.extend(std::iter::repeat(fault).take(times));
    }

    /// Runs in creation order
    pub fn runs(&self) -> Vec<RunRecord> {
        let state = self.state.read();
        state
            .run_order
            .iter()
            .filter_map(|id| state.runs.get(id).cloned())
            .collect()
    }

    pub fn run(&self, run_id: &RunId) -> Option<RunRecord> {
        self.state.read().runs.get(run_id).cloned()
    }

    /// How many times `run_id` was successfully closed
    pub fn close_count(&self, run_id: &RunId) -> usize {
        self.state.read().closes.get(run_id).copied().unwrap_or(0)
    }

    /// How many times `op` was invoked, including failed attempts
    pub fn calls(&self, op: TrackingOp) -> usize {
        self.state.read().calls.get(&op).copied().unwrap_or(0)
    }

    pub fn registered_model(&self, name: &str) -> Option<RegisteredModel> {
        self.state.read().registry.get(name).cloned()
    }

    /// Stored artifact bytes by URI
    pub fn artifact_bytes(&self, uri: &str) -> Option<Vec<u8>> {
        self.state.read().artifacts.get(uri).cloned()
    }

    fn enter(state: &mut MemoryState, op: TrackingOp) -> Result<()> {
        *state.calls.entry(op).or_default() += 1;
        match state.faults.get_mut(&op).and_then(VecDeque::pop_front) {
            Some(Fault::Unavailable) => Err(TrackingError::Unavailable(format!(
                "injected fault on {:?}",
                op
            ))),
            Some(Fault::Rejected) => Err(TrackingError::Rejected(format!(
                "injected fault on {:?}",
                op
            ))),
            None => Ok(()),
        }
    }

    fn with_run<T>(
        &self,
        op: TrackingOp,
        run_id: &RunId,
        f: impl FnOnce(&mut MemoryState, &RunId) -> Result<T>,
    ) -> Result<T> {
        let mut state = self.state.write();
        Self::enter(&mut *state, op)?;
        if !state.runs.contains_key(run_id) {
            return Err(TrackingError::NotFound(format!("run {}", run_id)));
        }
        f(&mut *state, run_id)
    }
}

fn record_mut<'s>(state: &'s mut MemoryState, run_id: &RunId) -> Result<&'s mut RunRecord> {
    state
        .runs
        .get_mut(run_id)
        .ok_or_else(|| TrackingError::NotFound(format!("run {}", run_id)))
}

impl TrackingBackend for MemoryTracker {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn start_run(&self, ctx: &ExperimentContext, run_name: Option<&str>) -> Result<RunId> {
        let mut state = self.state.write();
        Self::enter(&mut *state, TrackingOp::StartRun)?;

        let next_id = state.experiments.len().to_string();
        let experiment_id = state
            .experiments
            .entry(ctx.experiment_name.clone())
            .or_insert(next_id)
            .clone();

        let run_id = RunId::new(Uuid::new_v4().simple().to_string());
        let record = RunRecord::new(run_id.clone(), experiment_id, &ctx.experiment_name, run_name);
        state.runs.insert(run_id.clone(), record);
        state.run_order.push(run_id.clone());
        Ok(run_id)
    }

    fn log_param(&self, run: &RunId, key: &str, value: &str) -> Result<()> {
        self.with_run(TrackingOp::LogParam, run, |state, id| {
            record_mut(state, id)?.log_param(key, value)
        })
    }

    fn log_metric(&self, run: &RunId, key: &str, value: f64) -> Result<()> {
        self.with_run(TrackingOp::LogMetric, run, |state, id| {
            record_mut(state, id)?.log_metric(key, value)
        })
    }

    fn set_tag(&self, run: &RunId, key: &str, value: &str) -> Result<()> {
        self.with_run(TrackingOp::SetTag, run, |state, id| {
            record_mut(state, id)?.set_tag(key, value)
        })
    }

    fn log_model(
        &self,
        run: &RunId,
        artifact: &ModelArtifact,
        registered_name: Option<&str>,
    ) -> Result<ModelRegistration> {
        self.with_run(TrackingOp::LogModel, run, |state, id| {
            let record = record_mut(state, id)?;
            if let Some(existing) = &record.registration {
                if existing.artifact.checksum == artifact.checksum {
                    return Ok(existing.clone());
                }
            }

            let uri = format!(
                "memory://{}/{}/{}/{}",
                record.experiment_id, id, artifact.logical_name, artifact.file_name
            );
            let artifact_ref = ArtifactRef {
                logical_name: artifact.logical_name.clone(),
                uri: uri.clone(),
                size_bytes: artifact.size_bytes(),
                checksum: artifact.checksum.clone(),
            };
            record.add_artifact(artifact_ref.clone())?;

            let version = registered_name.map(|name| {
                state
                    .registry
                    .entry(name.to_string())
                    .or_insert_with(|| RegisteredModel::new(name))
                    .publish(id.clone(), uri.clone())
            });

            let registration = ModelRegistration {
                artifact: artifact_ref,
                registered_name: registered_name.map(str::to_string),
                version,
            };
            state.artifacts.insert(uri, artifact.bytes.clone());
            record_mut(state, id)?.registration = Some(registration.clone());
            Ok(registration)
        })
    }

    fn end_run(&self, run: &RunId, status: RunStatus) -> Result<()> {
        self.with_run(TrackingOp::EndRun, run, |state, id| {
            record_mut(state, id)?.close(status)?;
            *state.closes.entry(id.clone()).or_default() += 1;
            Ok(())
        })
    }
}
