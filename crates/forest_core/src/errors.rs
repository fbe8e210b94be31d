//! Error types for the forest model crate

use thiserror::Error;

/// Errors raised while encoding features, fitting or (de)serializing models
#[derive(Error, Debug)]
pub enum ForestError {
    /// Input matrix or target vector is unusable
    #[error("Invalid training input: {0}")]
    InvalidInput(String),

    /// A feature cell could not be encoded into a finite number
    #[error("Cannot encode feature '{feature}' in row {row}: {reason}")]
    Encoding {
        row: usize,
        feature: String,
        reason: String,
    },

    /// Model structure failed validation
    #[error("Model validation failed: {0}")]
    ValidationFailed(String),

    /// Prediction called with a vector of the wrong width
    #[error("Feature width mismatch: expected {expected}, got {actual}")]
    WidthMismatch { expected: usize, actual: usize },

    /// Artifact bytes are corrupt, truncated or of the wrong kind
    #[error("Invalid artifact: {0}")]
    InvalidArtifact(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Binary codec error
    #[error("Binary codec error: {0}")]
    Codec(#[from] bincode::Error),
}

/// Result type for forest operations
pub type Result<T> = std::result::Result<T, ForestError>;
