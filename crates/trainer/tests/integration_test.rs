//! Integration tests for the training pipeline
//!
//! Drives the full Loader → Preparer → Trainer & Reporter flow against an
//! on-disk object store and in-memory or sled-backed trackers.

mod common;

use anyhow::Result;
use readiness_forest::{Artifact, FeatureEncoder, RandomForestModel};
use readiness_tracking::{
    Fault, LocalTracker, MemoryTracker, RunStatus, TrackingBackend, TrackingOp,
};
use readiness_trainer::{experiment_context, LocalObjectStore, Pipeline, PipelineError};
use tempfile::TempDir;

use common::{config_in, seed_store, synthetic_csv, HEADER};

#[test]
fn test_thousand_row_scenario() -> Result<()> {
    let dir = TempDir::new()?;
    let config = config_in(dir.path());
    let store = seed_store(&config, &synthetic_csv(1000, 7, &HEADER))?;
    let tracker = MemoryTracker::new();

    let outcome = Pipeline::new(config.clone(), experiment_context(&config), &store, &tracker).run()?;

    assert_eq!(outcome.train_rows, 800);
    assert_eq!(outcome.val_rows, 200);
    assert_eq!(outcome.metrics.samples, 200);

    let runs = tracker.runs();
    assert_eq!(runs.len(), 1);
    let record = &runs[0];
    assert_eq!(record.run_id, outcome.run_id);
    assert_eq!(record.status, RunStatus::Finished);
    assert_eq!(record.experiment_name, "retirement-prediction");

    assert_eq!(record.params.len(), 2);
    assert_eq!(record.params["n_estimators"], "100");
    assert_eq!(record.params["max_depth"], "10");

    assert_eq!(record.metrics.len(), 2);
    assert!(record.metrics["mae"] >= 0.0);
    assert!(record.metrics["r2"] >= 0.0, "r2 = {}", record.metrics["r2"]);

    assert_eq!(record.artifacts.len(), 1);
    assert_eq!(record.artifacts[0].logical_name, "model");
    let registered = tracker
        .registered_model("retirement_rf_model")
        .expect("model registered");
    assert_eq!(registered.versions.len(), 1);
    assert_eq!(tracker.close_count(&outcome.run_id), 1);

    let encoder = FeatureEncoder::load(&config.artifacts.encoder_path)?;
    assert_eq!(encoder.width(), 8);
    let stored = tracker
        .artifact_bytes(&outcome.registration.artifact.uri)
        .expect("artifact stored");
    let model = RandomForestModel::from_artifact_bytes(&stored)?;
    assert_eq!(model.num_trees(), 100);
    assert_eq!(model.feature_names, encoder.feature_names());
    Ok(())
}

#[test]
fn test_renamed_column_is_schema_mismatch_without_run() -> Result<()> {
    let dir = TempDir::new()?;
    let config = config_in(dir.path());
    let mut header = HEADER;
    header[0] = "Age";
    let store = seed_store(&config, &synthetic_csv(50, 7, &header))?;
    let tracker = MemoryTracker::new();

    let err = Pipeline::new(config.clone(), experiment_context(&config), &store, &tracker)
        .run()
        .unwrap_err();

    match err {
        PipelineError::SchemaMismatch { missing } => assert_eq!(missing, vec!["age"]),
        other => panic!("expected SchemaMismatch, got {other:?}"),
    }
    assert!(tracker.runs().is_empty());
    assert_eq!(tracker.calls(TrackingOp::StartRun), 0);
    assert!(!config.artifacts.encoder_path.exists());
    Ok(())
}

#[test]
fn test_missing_object_is_data_unavailable_without_run() -> Result<()> {
    let dir = TempDir::new()?;
    let mut config = config_in(dir.path());
    let store = seed_store(&config, &synthetic_csv(50, 7, &HEADER))?;
    config.storage.key = "data/does_not_exist.csv".into();
    let tracker = MemoryTracker::new();

    let err = Pipeline::new(config.clone(), experiment_context(&config), &store, &tracker)
        .run()
        .unwrap_err();

    assert!(matches!(err, PipelineError::DataUnavailable(_)), "{err:?}");
    assert_eq!(err.exit_code(), 3);
    assert!(tracker.runs().is_empty());
    assert!(!config.artifacts.encoder_path.exists());
    Ok(())
}

#[test]
fn test_same_input_gives_same_model() -> Result<()> {
    let csv = synthetic_csv(200, 11, &HEADER);
    let mut hashes = Vec::new();

    for _ in 0..2 {
        let dir = TempDir::new()?;
        let mut config = config_in(dir.path());
        config.forest.n_estimators = 10;
        let store = seed_store(&config, &csv)?;
        let tracker = MemoryTracker::new();
        let outcome =
            Pipeline::new(config.clone(), experiment_context(&config), &store, &tracker).run()?;
        hashes.push((outcome.model_hash, outcome.metrics.mae));
    }

    assert_eq!(hashes[0], hashes[1]);
    Ok(())
}

#[test]
fn test_transient_tracking_failures_are_retried() -> Result<()> {
    let dir = TempDir::new()?;
    let mut config = config_in(dir.path());
    config.forest.n_estimators = 5;
    let store = seed_store(&config, &synthetic_csv(100, 3, &HEADER))?;
    let tracker = MemoryTracker::new();
    tracker.inject_fault(TrackingOp::LogParam, Fault::Unavailable, 2);
    tracker.inject_fault(TrackingOp::LogModel, Fault::Unavailable, 1);

    let outcome = Pipeline::new(config.clone(), experiment_context(&config), &store, &tracker).run()?;

    let record = tracker.run(&outcome.run_id).expect("run recorded");
    assert_eq!(record.status, RunStatus::Finished);
    assert_eq!(record.params.len(), 2);
    assert_eq!(tracker.calls(TrackingOp::LogModel), 2);
    assert_eq!(
        tracker
            .registered_model("retirement_rf_model")
            .expect("registered")
            .versions
            .len(),
        1
    );
    Ok(())
}

#[test]
fn test_rejected_tracking_write_fails_the_run_once() -> Result<()> {
    let dir = TempDir::new()?;
    let mut config = config_in(dir.path());
    config.forest.n_estimators = 5;
    let store = seed_store(&config, &synthetic_csv(100, 3, &HEADER))?;
    let tracker = MemoryTracker::new();
    tracker.inject_fault(TrackingOp::LogMetric, Fault::Rejected, 1);

    let err = Pipeline::new(config.clone(), experiment_context(&config), &store, &tracker)
        .run()
        .unwrap_err();

    assert!(matches!(err, PipelineError::TrackingBackend(_)), "{err:?}");
    let runs = tracker.runs();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, RunStatus::Failed);
    assert_eq!(tracker.close_count(&runs[0].run_id), 1);
    assert!(tracker.registered_model("retirement_rf_model").is_none());
    Ok(())
}

#[test]
fn test_non_numeric_target_fails_the_run() -> Result<()> {
    let dir = TempDir::new()?;
    let mut config = config_in(dir.path());
    config.forest.n_estimators = 5;
    let mut csv = synthetic_csv(40, 5, &HEADER);
    csv.push_str("40,5000,100000,2000,3,100,4,false,unknown\n");
    let store = seed_store(&config, &csv)?;
    let tracker = MemoryTracker::new();

    let err = Pipeline::new(config.clone(), experiment_context(&config), &store, &tracker)
        .run()
        .unwrap_err();

    assert!(matches!(err, PipelineError::Training(_)), "{err:?}");
    assert_eq!(err.exit_code(), 5);
    let runs = tracker.runs();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, RunStatus::Failed);
    assert_eq!(tracker.close_count(&runs[0].run_id), 1);
    Ok(())
}

#[test]
fn test_local_tracker_end_to_end() -> Result<()> {
    let dir = TempDir::new()?;
    let mut config = config_in(dir.path());
    config.forest.n_estimators = 5;
    let store: LocalObjectStore = seed_store(&config, &synthetic_csv(120, 9, &HEADER))?;

    let run_id = {
        let tracker = LocalTracker::open(&config.tracking.root)?;
        let backend: &dyn TrackingBackend = &tracker;
        Pipeline::new(config.clone(), experiment_context(&config), &store, backend)
            .run()?
            .run_id
    };

    let tracker = LocalTracker::open(&config.tracking.root)?;
    let record = tracker.get_run(&run_id)?.expect("run persisted");
    assert_eq!(record.status, RunStatus::Finished);
    assert_eq!(record.tags["train_rows"], "96");
    assert_eq!(record.tags["val_rows"], "24");

    let registered = tracker
        .registered_model("retirement_rf_model")?
        .expect("model registered");
    assert_eq!(registered.latest_version(), Some(1));
    Ok(())
}
