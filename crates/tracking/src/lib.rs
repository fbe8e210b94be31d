//! Readiness experiment tracking
//!
//! Records one run per training invocation and publishes trained models to
//! a registry. The [`TrackingBackend`] trait is the seam the trainer calls;
//! [`ActiveRun`] wraps an open run and guarantees it is closed exactly once.
//!
//! Backends:
//! - [`MemoryTracker`]: in-process, inspectable
//! - [`LocalTracker`]: `sled` store plus artifact files on disk
//! - [`MlflowTracker`]: MLflow tracking server over REST

pub mod backend;
pub mod errors;
pub mod memory;
pub mod run;
pub mod types;

#[cfg(feature = "mlflow")]
pub mod mlflow;
#[cfg(feature = "persistent")]
pub mod store;

pub use backend::TrackingBackend;
pub use errors::{Result, TrackingError};
pub use memory::{Fault, MemoryTracker, TrackingOp};
pub use run::{ActiveRun, RunState, FAILURE_REASON_TAG};
pub use types::{
    ArtifactRef, ExperimentContext, ModelArtifact, ModelRegistration, ModelVersion,
    RegisteredModel, RunId, RunRecord, RunStatus,
};

#[cfg(feature = "mlflow")]
pub use mlflow::MlflowTracker;
#[cfg(feature = "persistent")]
pub use store::LocalTracker;
