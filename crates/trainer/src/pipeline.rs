//! End-to-end training pipeline
//!
//! Loader → Preparer → Trainer & Reporter, run once. Dataset and schema
//! failures surface before any run is opened on the tracker.

use readiness_tracking::{ExperimentContext, LocalTracker, MlflowTracker, TrackingBackend};
use tracing::{info, instrument};

use crate::config::{PipelineConfig, StorageKind, TrackingKind};
use crate::dataset::DatasetLoader;
use crate::errors::{PipelineError, Result};
use crate::prepare::FeaturePreparer;
use crate::reporter::{TrainerReporter, TrainingOutcome};
use crate::retry::{RetryPolicy, RetryingTracker};
use crate::storage::{HttpObjectStore, LocalObjectStore, ObjectLocation, ObjectStore};

pub struct Pipeline<'a> {
    config: PipelineConfig,
    ctx: ExperimentContext,
    store: &'a dyn ObjectStore,
    tracker: &'a dyn TrackingBackend,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        config: PipelineConfig,
        ctx: ExperimentContext,
        store: &'a dyn ObjectStore,
        tracker: &'a dyn TrackingBackend,
    ) -> Self {
        Self {
            config,
            ctx,
            store,
            tracker,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    #[instrument(skip_all, fields(store = self.store.name(), tracker = self.tracker.name()))]
    pub fn run(&self) -> Result<TrainingOutcome> {
        let retry = RetryPolicy::from_config(&self.config.retry);
        let location = ObjectLocation::new(&self.config.storage.bucket, &self.config.storage.key);

        let dataset = DatasetLoader::new(self.store, retry.clone()).load(&location)?;
        let split = FeaturePreparer::from_config(&self.config).prepare(&dataset)?;

        let tracker = RetryingTracker::new(self.tracker, retry);
        let outcome =
            TrainerReporter::from_config(&self.config, self.ctx.clone()).run(&split, &tracker)?;

        info!(
            run_id = %outcome.run_id,
            mae = outcome.metrics.mae,
            r2 = outcome.metrics.r2,
            version = ?outcome.registration.version,
            "Pipeline complete"
        );
        Ok(outcome)
    }
}

/// Experiment context named by the configuration
pub fn experiment_context(config: &PipelineConfig) -> ExperimentContext {
    ExperimentContext::new(
        &config.tracking.experiment_name,
        &config.tracking.registered_model_name,
    )
}

/// Object store selected by `storage.kind`
pub fn object_store_from_config(config: &PipelineConfig) -> Result<Box<dyn ObjectStore>> {
    match config.storage.kind {
        StorageKind::Local => Ok(Box::new(LocalObjectStore::new(&config.storage.root))),
        StorageKind::Http => {
            let store = HttpObjectStore::new(&config.storage.endpoint, config.storage_timeout())
                .map_err(|e| PipelineError::DataUnavailable(e.to_string()))?;
            Ok(Box::new(store))
        }
    }
}

/// Tracking backend selected by `tracking.kind`
pub fn tracker_from_config(config: &PipelineConfig) -> Result<Box<dyn TrackingBackend>> {
    match config.tracking.kind {
        TrackingKind::Local => Ok(Box::new(LocalTracker::open(&config.tracking.root)?)),
        TrackingKind::Mlflow => Ok(Box::new(MlflowTracker::new(
            &config.tracking.uri,
            config.tracking_timeout(),
        )?)),
    }
}
