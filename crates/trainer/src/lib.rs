//! Readiness trainer - retirement-readiness model training job
//!
//! Loads the survey dataset from object storage, splits it with a fixed
//! seed, fits a random forest regressor and reports parameters, metrics and
//! the trained model to an experiment tracker.

pub mod cart;
pub mod config;
pub mod dataset;
pub mod deterministic;
pub mod errors;
pub mod logging;
pub mod pipeline;
pub mod prepare;
pub mod reporter;
pub mod retry;
pub mod storage;
pub mod trainer;

pub use crate::config::{ConfigError, PipelineConfig};
pub use crate::dataset::{DatasetLoader, RawDataset};
pub use crate::deterministic::{SeededRng, SplitTieBreaker};
pub use crate::errors::PipelineError;
pub use crate::pipeline::{experiment_context, object_store_from_config, tracker_from_config, Pipeline};
pub use crate::prepare::{DatasetSplit, FeaturePreparer};
pub use crate::reporter::{TrainerReporter, TrainingOutcome};
pub use crate::retry::{RetryPolicy, RetryingTracker};
pub use crate::storage::{HttpObjectStore, LocalObjectStore, ObjectLocation, ObjectStore, StoreError};
pub use crate::trainer::ForestTrainer;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
