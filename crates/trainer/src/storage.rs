//! Object storage access
//!
//! The loader reads one object through the [`ObjectStore`] trait. Two
//! implementations ship: a directory tree on local disk and a path-style
//! HTTP client for S3-compatible endpoints (public buckets or presigned
//! gateways; requests are not signed).

use reqwest::blocking::Client;
use reqwest::StatusCode;
use std::fmt;
use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Bucket + key of one stored object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectLocation {
    pub bucket: String,
    pub key: String,
}

impl ObjectLocation {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }
}

impl fmt::Display for ObjectLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bucket, self.key)
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object {0} not found")]
    NotFound(String),

    /// Timeout, connection failure, throttling or server error
    #[error("transient storage failure: {0}")]
    Transient(String),

    #[error("storage failure: {0}")]
    Permanent(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }

    fn from_io(location: &ObjectLocation, err: io::Error) -> Self {
        match err.kind() {
            ErrorKind::NotFound => StoreError::NotFound(location.to_string()),
            ErrorKind::TimedOut | ErrorKind::Interrupted | ErrorKind::WouldBlock => {
                StoreError::Transient(format!("{}: {}", location, err))
            }
            _ => StoreError::Permanent(format!("{}: {}", location, err)),
        }
    }
}

/// Read access to blob storage
pub trait ObjectStore {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Fetch the full object body
    fn get(&self, location: &ObjectLocation) -> Result<Vec<u8>, StoreError>;
}

/// Objects stored as files at `<root>/<bucket>/<key>`
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, location: &ObjectLocation) -> PathBuf {
        let mut path = self.root.join(&location.bucket);
        for segment in location.key.split('/').filter(|s| !s.is_empty()) {
            path.push(segment);
        }
        path
    }

    /// Write an object, creating intermediate directories
    pub fn put(&self, location: &ObjectLocation, bytes: &[u8]) -> Result<(), StoreError> {
        let path = self.path_for(location);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| StoreError::from_io(location, e))?;
        }
        fs::write(&path, bytes).map_err(|e| StoreError::from_io(location, e))
    }
}

impl ObjectStore for LocalObjectStore {
    fn name(&self) -> &'static str {
        "local"
    }

    fn get(&self, location: &ObjectLocation) -> Result<Vec<u8>, StoreError> {
        if location.key.split('/').any(|s| s == "..") {
            return Err(StoreError::Permanent(format!(
                "{}: key escapes the bucket",
                location
            )));
        }
        let path = self.path_for(location);
        debug!(path = %path.display(), "Reading object from disk");
        fs::read(&path).map_err(|e| StoreError::from_io(location, e))
    }
}

/// Path-style HTTP GET against an S3-compatible endpoint
pub struct HttpObjectStore {
    client: Client,
    endpoint: String,
}

impl HttpObjectStore {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StoreError::Permanent(format!("HTTP client setup failed: {}", e)))?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }

    pub fn url_for(&self, location: &ObjectLocation) -> String {
        format!(
            "{}/{}/{}",
            self.endpoint,
            location.bucket,
            location.key.trim_start_matches('/')
        )
    }
}

fn classify_status(status: StatusCode, location: &ObjectLocation) -> StoreError {
    if status == StatusCode::NOT_FOUND {
        StoreError::NotFound(location.to_string())
    } else if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        StoreError::Transient(format!("{}: HTTP {}", location, status.as_u16()))
    } else {
        StoreError::Permanent(format!("{}: HTTP {}", location, status.as_u16()))
    }
}

impl ObjectStore for HttpObjectStore {
    fn name(&self) -> &'static str {
        "http"
    }

    fn get(&self, location: &ObjectLocation) -> Result<Vec<u8>, StoreError> {
        let url = self.url_for(location);
        debug!(url = %url, "Fetching object over HTTP");

        let response = self.client.get(&url).send().map_err(|e| {
            if e.is_timeout() || e.is_connect() || e.is_request() {
                StoreError::Transient(format!("{}: {}", location, e))
            } else {
                StoreError::Permanent(format!("{}: {}", location, e))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(status, location));
        }
        let body = response
            .bytes()
            .map_err(|e| StoreError::Transient(format!("{}: {}", location, e)))?;
        Ok(body.to_vec())
    }
}
