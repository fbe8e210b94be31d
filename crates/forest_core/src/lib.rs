//! Readiness forest core
//!
//! Model-side building blocks for the retirement-readiness trainer.
//!
//! Modules:
//! - `types`: typed CSV cells and feature rows
//! - `encoder`: dictionary encoder from feature rows to numeric vectors
//! - `tree`: flat-array regression trees
//! - `forest`: random forest model, hyperparameters and hashing
//! - `metrics`: MAE and R² on held-out data
//! - `artifact`: framed binary codec for models and encoders
//! - `serde_canon`: canonical JSON + BLAKE3 hashing

pub mod artifact;
pub mod encoder;
pub mod errors;
pub mod forest;
pub mod metrics;
pub mod serde_canon;
pub mod tree;
pub mod types;

pub use artifact::{Artifact, ArtifactKind, ARTIFACT_FORMAT_VERSION};
pub use encoder::FeatureEncoder;
pub use errors::ForestError;
pub use forest::{ForestParams, MaxFeatures, RandomForestModel};
pub use metrics::{mean_absolute_error, r2_score, RegressionMetrics};
pub use tree::{Node, RegressionTree};
pub use types::{FeatureRow, Scalar};

/// Crate version string recorded alongside trained models
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
