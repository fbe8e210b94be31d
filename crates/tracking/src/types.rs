//! Type definitions for experiment tracking

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::errors::{Result, TrackingError};

/// Experiment and registry names a training invocation reports under.
///
/// Built once at startup and passed down explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperimentContext {
    /// Experiment the run is grouped under
    pub experiment_name: String,
    /// Registry name trained models are published as
    pub registered_model_name: String,
}

impl ExperimentContext {
    pub fn new(experiment_name: impl Into<String>, registered_model_name: impl Into<String>) -> Self {
        Self {
            experiment_name: experiment_name.into(),
            registered_model_name: registered_model_name.into(),
        }
    }
}

/// Backend-assigned run identifier
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle status as stored by a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Running,
    Finished,
    Failed,
}

impl RunStatus {
    /// Wire name used by the MLflow REST API
    pub fn as_mlflow(&self) -> &'static str {
        match self {
            RunStatus::Running => "RUNNING",
            RunStatus::Finished => "FINISHED",
            RunStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Running)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_mlflow())
    }
}

/// Serialized model handed to a backend for storage and registration
#[derive(Debug, Clone)]
pub struct ModelArtifact {
    /// Artifact path inside the run (e.g. `model`)
    pub logical_name: String,
    /// File name the bytes are stored under
    pub file_name: String,
    /// Raw artifact bytes
    pub bytes: Vec<u8>,
    /// BLAKE3 hex digest of `bytes`
    pub checksum: String,
}

impl ModelArtifact {
    pub fn new(logical_name: impl Into<String>, file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let checksum = hex::encode(blake3::hash(&bytes).as_bytes());
        Self {
            logical_name: logical_name.into(),
            file_name: file_name.into(),
            bytes,
            checksum,
        }
    }

    pub fn size_bytes(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Where a backend stored an artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub logical_name: String,
    pub uri: String,
    pub size_bytes: u64,
    pub checksum: String,
}

/// Result of `log_model`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelRegistration {
    /// Stored artifact
    pub artifact: ArtifactRef,
    /// Registry name, if the model was registered
    pub registered_name: Option<String>,
    /// Registry version assigned to this artifact
    pub version: Option<u32>,
}

/// One published version of a registered model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelVersion {
    pub version: u32,
    pub run_id: RunId,
    pub source: String,
    pub created_at: DateTime<Utc>,
}

/// Registry entry grouping every version published under a name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredModel {
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub versions: Vec<ModelVersion>,
}

impl RegisteredModel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            created_at: Utc::now(),
            versions: Vec::new(),
        }
    }

    pub fn latest_version(&self) -> Option<u32> {
        self.versions.iter().map(|v| v.version).max()
    }

    /// Append a version numbered one past the latest
    pub fn publish(&mut self, run_id: RunId, source: impl Into<String>) -> u32 {
        let version = self.latest_version().unwrap_or(0) + 1;
        self.versions.push(ModelVersion {
            version,
            run_id,
            source: source.into(),
            created_at: Utc::now(),
        });
        version
    }
}

/// Everything recorded about one training invocation.
///
/// Records are append-only while running: a key may be written again only
/// with the value it already holds, and nothing may be written once the
/// run has closed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: RunId,
    pub experiment_id: String,
    pub experiment_name: String,
    pub run_name: Option<String>,
    pub status: RunStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub params: BTreeMap<String, String>,
    pub metrics: BTreeMap<String, f64>,
    pub tags: BTreeMap<String, String>,
    pub artifacts: Vec<ArtifactRef>,
    pub registration: Option<ModelRegistration>,
}

impl RunRecord {
    pub fn new(
        run_id: RunId,
        experiment_id: impl Into<String>,
        experiment_name: impl Into<String>,
        run_name: Option<&str>,
    ) -> Self {
        Self {
            run_id,
            experiment_id: experiment_id.into(),
            experiment_name: experiment_name.into(),
            run_name: run_name.map(str::to_string),
            status: RunStatus::Running,
            start_time: Utc::now(),
            end_time: None,
            params: BTreeMap::new(),
            metrics: BTreeMap::new(),
            tags: BTreeMap::new(),
            artifacts: Vec::new(),
            registration: None,
        }
    }

    fn ensure_running(&self) -> Result<()> {
        if self.status.is_terminal() {
            return Err(TrackingError::Rejected(format!(
                "run {} is already {}",
                self.run_id, self.status
            )));
        }
        Ok(())
    }

    pub fn log_param(&mut self, key: &str, value: &str) -> Result<()> {
        self.ensure_running()?;
        append_once(&mut self.params, "param", key, value.to_string())
    }

    pub fn log_metric(&mut self, key: &str, value: f64) -> Result<()> {
        self.ensure_running()?;
        if !value.is_finite() {
            return Err(TrackingError::Rejected(format!(
                "metric {} has non-finite value {}",
                key, value
            )));
        }
        append_once(&mut self.metrics, "metric", key, value)
    }

    pub fn set_tag(&mut self, key: &str, value: &str) -> Result<()> {
        self.ensure_running()?;
        append_once(&mut self.tags, "tag", key, value.to_string())
    }

    /// Attach a stored artifact; logging the same logical name twice is rejected
    /// unless the checksum matches.
    pub fn add_artifact(&mut self, artifact: ArtifactRef) -> Result<()> {
        self.ensure_running()?;
        match self
            .artifacts
            .iter()
            .find(|a| a.logical_name == artifact.logical_name)
        {
            Some(existing) if existing.checksum == artifact.checksum => Ok(()),
            Some(_) => Err(TrackingError::Rejected(format!(
                "artifact {} already logged with different content",
                artifact.logical_name
            ))),
            None => {
                self.artifacts.push(artifact);
                Ok(())
            }
        }
    }

    /// Transition to a terminal status
    pub fn close(&mut self, status: RunStatus) -> Result<()> {
        if !status.is_terminal() {
            return Err(TrackingError::Rejected(
                "cannot close a run as RUNNING".into(),
            ));
        }
        self.ensure_running()?;
        self.status = status;
        self.end_time = Some(Utc::now());
        Ok(())
    }
}

fn append_once<V: PartialEq + fmt::Debug>(
    map: &mut BTreeMap<String, V>,
    what: &str,
    key: &str,
    value: V,
) -> Result<()> {
    match map.get(key) {
        Some(existing) if *existing == value => Ok(()),
        Some(existing) => Err(TrackingError::Rejected(format!(
            "{} {} already set to {:?}, refusing {:?}",
            what, key, existing, value
        ))),
        None => {
            map.insert(key.to_string(), value);
            Ok(())
        }
    }
}
