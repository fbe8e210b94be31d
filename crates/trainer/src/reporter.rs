//! Training and reporting
//!
//! Opens one run, fits the encoder and the forest, scores the validation
//! rows and records everything on the run. The fitted encoder is staged on
//! disk before the model is registered and moved to its final path only
//! after registration succeeds, so a failed run leaves the previous encoder
//! in place. The run is closed `FINISHED` only after every step succeeded.

use readiness_forest::{
    Artifact, FeatureEncoder, ForestParams, RandomForestModel, RegressionMetrics, Scalar,
};
use readiness_tracking::{
    ActiveRun, ExperimentContext, ModelArtifact, ModelRegistration, RunId, TrackingBackend,
};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};

use crate::config::PipelineConfig;
use crate::errors::{PipelineError, Result};
use crate::prepare::DatasetSplit;
use crate::trainer::ForestTrainer;

/// File name of the model inside its logged artifact directory
pub const MODEL_FILE_NAME: &str = "model.bin";

/// What a successful invocation produced
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub run_id: RunId,
    pub metrics: RegressionMetrics,
    pub model_hash: String,
    pub feature_names: Vec<String>,
    pub train_rows: usize,
    pub val_rows: usize,
    pub encoder_path: PathBuf,
    pub model_path: Option<PathBuf>,
    pub registration: ModelRegistration,
}

/// Fitted state produced before anything is reported
struct FittedModel {
    encoder: FeatureEncoder,
    model: RandomForestModel,
    metrics: RegressionMetrics,
    model_hash: String,
}

pub struct TrainerReporter {
    ctx: ExperimentContext,
    run_name: Option<String>,
    params: ForestParams,
    encoder_path: PathBuf,
    model_path: Option<PathBuf>,
    model_logical_name: String,
}

impl TrainerReporter {
    pub fn new(ctx: ExperimentContext, params: ForestParams, encoder_path: impl Into<PathBuf>) -> Self {
        Self {
            ctx,
            run_name: None,
            params,
            encoder_path: encoder_path.into(),
            model_path: None,
            model_logical_name: "model".to_string(),
        }
    }

    pub fn from_config(config: &PipelineConfig, ctx: ExperimentContext) -> Self {
        Self {
            ctx,
            run_name: config.tracking.run_name.clone(),
            params: config.forest.to_params(),
            encoder_path: config.artifacts.encoder_path.clone(),
            model_path: config.artifacts.model_path.clone(),
            model_logical_name: config.artifacts.model_logical_name.clone(),
        }
    }

    pub fn with_model_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.model_path = Some(path.into());
        self
    }

    /// Train on `split` and report to `tracker` under a single run
    #[instrument(skip_all, fields(experiment = %self.ctx.experiment_name))]
    pub fn run(&self, split: &DatasetSplit, tracker: &dyn TrackingBackend) -> Result<TrainingOutcome> {
        let run = ActiveRun::start(tracker, &self.ctx, self.run_name.as_deref())?;

        match self.fit_and_report(&run, split) {
            Ok((fitted, registration)) => {
                let run_id = run.complete()?;
                info!(
                    run_id = %run_id,
                    mae = fitted.metrics.mae,
                    r2 = fitted.metrics.r2,
                    "Training run finished"
                );
                Ok(TrainingOutcome {
                    run_id,
                    metrics: fitted.metrics,
                    model_hash: fitted.model_hash,
                    feature_names: fitted.encoder.feature_names().to_vec(),
                    train_rows: split.train_len(),
                    val_rows: split.val_len(),
                    encoder_path: self.encoder_path.clone(),
                    model_path: self.model_path.clone(),
                    registration,
                })
            }
            Err(err) => {
                if let Err(close_err) = run.fail(&err.to_string()) {
                    warn!(error = %close_err, "Could not close failed run");
                }
                Err(err)
            }
        }
    }

    fn fit_and_report(
        &self,
        run: &ActiveRun<'_>,
        split: &DatasetSplit,
    ) -> Result<(FittedModel, ModelRegistration)> {
        let fitted = self.fit(split)?;

        run.log_param("n_estimators", self.params.n_estimators)?;
        run.log_param("max_depth", self.params.max_depth)?;
        run.log_metric("mae", fitted.metrics.mae)?;
        run.log_metric("r2", fitted.metrics.r2)?;
        run.set_tag("model_hash", &fitted.model_hash)?;
        run.set_tag("train_rows", split.train_len())?;
        run.set_tag("val_rows", split.val_len())?;
        run.set_tag("encoder_path", self.encoder_path.display())?;

        // Staged next to the final path; promoted once the model is registered
        let staged = staged_path(&self.encoder_path);
        save_artifact(&fitted.encoder, &staged, "encoder")?;

        let bytes = fitted.model.to_artifact_bytes()?;
        let artifact = ModelArtifact::new(&self.model_logical_name, MODEL_FILE_NAME, bytes);
        let registration = match run.log_model(&artifact, Some(&self.ctx.registered_model_name)) {
            Ok(registration) => registration,
            Err(err) => {
                if let Err(cleanup) = fs::remove_file(&staged) {
                    warn!(path = %staged.display(), error = %cleanup, "Could not remove staged encoder");
                }
                return Err(err.into());
            }
        };

        fs::rename(&staged, &self.encoder_path).map_err(|e| {
            PipelineError::Training(format!(
                "failed to move encoder into {}: {}",
                self.encoder_path.display(),
                e
            ))
        })?;
        if let Some(path) = &self.model_path {
            save_artifact(&fitted.model, path, "model")?;
        }

        Ok((fitted, registration))
    }

    /// Encode, fit and evaluate; nothing is reported here
    fn fit(&self, split: &DatasetSplit) -> Result<FittedModel> {
        let encoder = FeatureEncoder::fit(&split.train_rows)?;
        let x_train = encoder.transform(&split.train_rows)?;
        let x_val = encoder.transform(&split.val_rows)?;
        let y_train = numeric_targets(&split.train_targets, "training")?;
        let y_val = numeric_targets(&split.val_targets, "validation")?;
        info!(
            width = encoder.width(),
            train_rows = x_train.len(),
            val_rows = x_val.len(),
            "Features encoded"
        );

        let model = ForestTrainer::new(self.params.clone()).fit(
            &x_train,
            &y_train,
            encoder.feature_names().to_vec(),
        )?;

        let predictions = model.predict(&x_val)?;
        let metrics = RegressionMetrics::evaluate(&y_val, &predictions)?;
        let model_hash = model.hash_hex()?;
        info!(mae = metrics.mae, r2 = metrics.r2, model_hash = %model_hash, "Model evaluated");

        Ok(FittedModel {
            encoder,
            model,
            metrics,
            model_hash,
        })
    }
}

fn numeric_targets(targets: &[Scalar], side: &str) -> Result<Vec<f64>> {
    targets
        .iter()
        .enumerate()
        .map(|(i, cell)| {
            cell.as_target().ok_or_else(|| {
                PipelineError::Training(format!(
                    "{} target {} is not a finite number: {:?}",
                    side, i, cell
                ))
            })
        })
        .collect()
}

fn staged_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".staged");
    path.with_file_name(name)
}

fn save_artifact<A: Artifact>(artifact: &A, path: &Path, what: &str) -> Result<()> {
    let bytes = artifact.save(path).map_err(|e| {
        PipelineError::Training(format!("failed to write {} to {}: {}", what, path.display(), e))
    })?;
    info!(path = %path.display(), bytes, "Saved {}", what);
    Ok(())
}
