//! Error types for the tracking module

use thiserror::Error;

/// Errors raised by tracking backends
#[derive(Error, Debug)]
pub enum TrackingError {
    /// Backend unreachable, timed out or answered with a server error
    #[error("Tracking backend unavailable: {0}")]
    Unavailable(String),

    /// Backend refused the write (duplicate key, closed run, bad request)
    #[error("Tracking write rejected: {0}")]
    Rejected(String),

    /// Run, experiment or model unknown to the backend
    #[error("Not found: {0}")]
    NotFound(String),

    /// Local store failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl TrackingError {
    /// Whether retrying the same call may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, TrackingError::Unavailable(_))
    }
}

impl From<serde_json::Error> for TrackingError {
    fn from(err: serde_json::Error) -> Self {
        TrackingError::Serialization(err.to_string())
    }
}

/// Result type for tracking operations
pub type Result<T> = std::result::Result<T, TrackingError>;
