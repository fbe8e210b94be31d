//! Local tracking store
//!
//! Runs, experiments and registered models live in a `sled` database under
//! `<root>/db`, bincode-encoded. Artifact files are written beside it under
//! `<root>/artifacts/<experiment_id>/<run_id>/<logical_name>/<file_name>`.

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

use crate::backend::TrackingBackend;
use crate::errors::{Result, TrackingError};
use crate::types::{
    ArtifactRef, ExperimentContext, ModelArtifact, ModelRegistration, RegisteredModel, RunId,
    RunRecord, RunStatus,
};

const EXPERIMENTS_TREE: &str = "experiments";
const RUNS_TREE: &str = "runs";
const REGISTRY_TREE: &str = "registry";

/// Tracking backend persisted on the local filesystem
pub struct LocalTracker {
    db: sled::Db,
    experiments: sled::Tree,
    runs: sled::Tree,
    registry: sled::Tree,
    artifact_root: PathBuf,
    /// Serializes read-modify-write cycles on records
    write_lock: Mutex<()>,
}

impl LocalTracker {
    /// Open (or create) a store rooted at `root`
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        fs::create_dir_all(root)?;
        let db = sled::open(root.join("db")).map_err(db_error)?;
        let experiments = db.open_tree(EXPERIMENTS_TREE).map_err(db_error)?;
        let runs = db.open_tree(RUNS_TREE).map_err(db_error)?;
        let registry = db.open_tree(REGISTRY_TREE).map_err(db_error)?;

        info!(root = %root.display(), "Opened local tracking store");
        Ok(Self {
            db,
            experiments,
            runs,
            registry,
            artifact_root: root.join("artifacts"),
            write_lock: Mutex::new(()),
        })
    }

    pub fn artifact_root(&self) -> &Path {
        &self.artifact_root
    }

    pub fn get_run(&self, run_id: &RunId) -> Result<Option<RunRecord>> {
        load(&self.runs, run_id.as_str())
    }

    /// All runs, optionally restricted to one experiment, oldest first
    pub fn list_runs(&self, experiment_name: Option<&str>) -> Result<Vec<RunRecord>> {
        let mut records = Vec::new();
        for item in self.runs.iter() {
            let (_, value) = item.map_err(db_error)?;
            let record: RunRecord = decode(&value)?;
            if experiment_name.map_or(true, |name| record.experiment_name == name) {
                records.push(record);
            }
        }
        records.sort_by(|a, b| a.start_time.cmp(&b.start_time));
        Ok(records)
    }

    pub fn registered_model(&self, name: &str) -> Result<Option<RegisteredModel>> {
        load(&self.registry, name)
    }

    fn experiment_id(&self, name: &str) -> Result<String> {
        if let Some(id) = self.experiments.get(name).map_err(db_error)? {
            return Ok(String::from_utf8_lossy(&id).into_owned());
        }
        let id = self.db.generate_id().map_err(db_error)?.to_string();
        self.experiments
            .insert(name, id.as_bytes())
            .map_err(db_error)?;
        debug!(experiment = name, experiment_id = %id, "Created experiment");
        Ok(id)
    }

    fn update_run<T>(
        &self,
        run_id: &RunId,
        f: impl FnOnce(&mut RunRecord) -> Result<T>,
    ) -> Result<T> {
        let _guard = self.write_lock.lock();
        let mut record: RunRecord = load(&self.runs, run_id.as_str())?
            .ok_or_else(|| TrackingError::NotFound(format!("run {}", run_id)))?;
        let out = f(&mut record)?;
        store(&self.runs, run_id.as_str(), &record)?;
        self.db.flush().map_err(db_error)?;
        Ok(out)
    }

    fn artifact_path(&self, record: &RunRecord, artifact: &ModelArtifact) -> PathBuf {
        self.artifact_root
            .join(&record.experiment_id)
            .join(record.run_id.as_str())
            .join(&artifact.logical_name)
            .join(&artifact.file_name)
    }
}

impl TrackingBackend for LocalTracker {
    fn name(&self) -> &'static str {
        "local"
    }

    fn start_run(&self, ctx: &ExperimentContext, run_name: Option<&str>) -> Result<RunId> {
        let _guard = self.write_lock.lock();
        let experiment_id = self.experiment_id(&ctx.experiment_name)?;
        let run_id = RunId::new(Uuid::new_v4().simple().to_string());
        let record = RunRecord::new(run_id.clone(), experiment_id, &ctx.experiment_name, run_name);
        store(&self.runs, run_id.as_str(), &record)?;
        self.db.flush().map_err(db_error)?;
        Ok(run_id)
    }

    fn log_param(&self, run: &RunId, key: &str, value: &str) -> Result<()> {
        self.update_run(run, |record| record.log_param(key, value))
    }

    fn log_metric(&self, run: &RunId, key: &str, value: f64) -> Result<()> {
        self.update_run(run, |record| record.log_metric(key, value))
    }

    fn set_tag(&self, run: &RunId, key: &str, value: &str) -> Result<()> {
        self.update_run(run, |record| record.set_tag(key, value))
    }

    fn log_model(
        &self,
        run: &RunId,
        artifact: &ModelArtifact,
        registered_name: Option<&str>,
    ) -> Result<ModelRegistration> {
        self.update_run(run, |record| {
            if let Some(existing) = &record.registration {
                if existing.artifact.checksum == artifact.checksum {
                    return Ok(existing.clone());
                }
            }

            let path = self.artifact_path(record, artifact);
            write_atomic(&path, &artifact.bytes)?;
            let artifact_ref = ArtifactRef {
                logical_name: artifact.logical_name.clone(),
                uri: format!("file://{}", path.display()),
                size_bytes: artifact.size_bytes(),
                checksum: artifact.checksum.clone(),
            };
            record.add_artifact(artifact_ref.clone())?;

            let version = match registered_name {
                Some(name) => {
                    let mut model: RegisteredModel =
                        load(&self.registry, name)?.unwrap_or_else(|| RegisteredModel::new(name));
                    let version = model.publish(record.run_id.clone(), artifact_ref.uri.clone());
                    store(&self.registry, name, &model)?;
                    Some(version)
                }
                None => None,
            };

            let registration = ModelRegistration {
                artifact: artifact_ref,
                registered_name: registered_name.map(str::to_string),
                version,
            };
            record.registration = Some(registration.clone());
            Ok(registration)
        })
    }

    fn end_run(&self, run: &RunId, status: RunStatus) -> Result<()> {
        self.update_run(run, |record| record.close(status))
    }
}

fn db_error(err: sled::Error) -> TrackingError {
    TrackingError::Storage(err.to_string())
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    bincode::deserialize(bytes).map_err(|e| TrackingError::Serialization(e.to_string()))
}

fn load<T: DeserializeOwned>(tree: &sled::Tree, key: &str) -> Result<Option<T>> {
    match tree.get(key.as_bytes()).map_err(db_error)? {
        Some(bytes) => Ok(Some(decode(&bytes)?)),
        None => Ok(None),
    }
}

fn store<T: Serialize>(tree: &sled::Tree, key: &str, value: &T) -> Result<()> {
    let bytes =
        bincode::serialize(value).map_err(|e| TrackingError::Serialization(e.to_string()))?;
    tree.insert(key.as_bytes(), bytes).map_err(db_error)?;
    Ok(())
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension("tmp");
    let mut file = fs::File::create(&tmp_path)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    drop(file);
    fs::rename(&tmp_path, path)?;
    Ok(())
}
