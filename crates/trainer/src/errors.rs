use readiness_forest::ForestError;
use readiness_tracking::TrackingError;
use thiserror::Error;

use crate::config::ConfigError;

/// Errors returned by the training pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Dataset object missing, unreadable or not parseable as CSV
    #[error("dataset unavailable: {0}")]
    DataUnavailable(String),

    /// Required feature or target columns absent from the dataset header
    #[error("schema mismatch: missing columns {}", .missing.join(", "))]
    SchemaMismatch { missing: Vec<String> },

    /// Encoding, fitting, evaluation or artifact persistence failed
    #[error("training error: {0}")]
    Training(String),

    #[error("tracking backend error: {0}")]
    TrackingBackend(#[from] TrackingError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl PipelineError {
    /// Process exit code for this error kind
    pub fn exit_code(&self) -> u8 {
        match self {
            PipelineError::Config(_) => 2,
            PipelineError::DataUnavailable(_) => 3,
            PipelineError::SchemaMismatch { .. } => 4,
            PipelineError::Training(_) => 5,
            PipelineError::TrackingBackend(_) => 6,
        }
    }
}

impl From<ForestError> for PipelineError {
    fn from(err: ForestError) -> Self {
        PipelineError::Training(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
