//! MLflow REST API client
//!
//! Talks to an MLflow tracking server (REST API 2.0) with a blocking
//! `reqwest` client. Artifacts are uploaded through the server's
//! `mlflow-artifacts` proxy, so the server must run with artifact serving
//! enabled.
//!
//! `log_model` is safe to repeat: the artifact PUT overwrites the same path,
//! and a registry version already created for the run and source is
//! returned instead of publishing another one.
//!
//! Status mapping: connection failures, timeouts, HTTP 429 and 5xx are
//! transient ([`TrackingError::Unavailable`]); any other non-success status
//! is [`TrackingError::Rejected`], except `RESOURCE_DOES_NOT_EXIST` which is
//! [`TrackingError::NotFound`].

use chrono::Utc;
use parking_lot::Mutex;
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, instrument};

use crate::backend::TrackingBackend;
use crate::errors::{Result, TrackingError};
use crate::types::{
    ArtifactRef, ExperimentContext, ModelArtifact, ModelRegistration, RunId, RunStatus,
};

const API_PREFIX: &str = "api/2.0/mlflow";
const ARTIFACTS_PREFIX: &str = "api/2.0/mlflow-artifacts/artifacts";

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    error_code: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct ExperimentResponse {
    experiment: ExperimentInfo,
}

#[derive(Debug, Deserialize)]
struct ExperimentInfo {
    experiment_id: String,
}

#[derive(Debug, Deserialize)]
struct CreateExperimentResponse {
    experiment_id: String,
}

#[derive(Debug, Deserialize)]
struct CreateRunResponse {
    run: RunPayload,
}

#[derive(Debug, Deserialize)]
struct RunPayload {
    info: RunInfo,
}

#[derive(Debug, Deserialize)]
struct RunInfo {
    run_id: String,
}

#[derive(Debug, Deserialize)]
struct CreateModelVersionResponse {
    model_version: ModelVersionInfo,
}

#[derive(Debug, Deserialize)]
struct ModelVersionInfo {
    version: String,
    #[serde(default)]
    source: String,
    #[serde(default)]
    run_id: String,
}

#[derive(Debug, Deserialize)]
struct SearchModelVersionsResponse {
    #[serde(default)]
    model_versions: Vec<ModelVersionInfo>,
}

pub struct MlflowTracker {
    client: Client,
    base_url: String,
    /// Experiment id per open run, needed for artifact paths
    run_experiments: Mutex<HashMap<RunId, String>>,
}

impl MlflowTracker {
    pub fn new(tracking_uri: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TrackingError::Unavailable(format!("HTTP client setup failed: {}", e)))?;
        Ok(Self {
            client,
            base_url: tracking_uri.trim_end_matches('/').to_string(),
            run_experiments: Mutex::new(HashMap::new()),
        })
    }

    pub fn tracking_uri(&self) -> &str {
        &self.base_url
    }

    fn api_url(&self, endpoint: &str) -> String {
        format!("{}/{}/{}", self.base_url, API_PREFIX, endpoint)
    }

    fn artifact_url(&self, experiment_id: &str, run: &RunId, artifact: &ModelArtifact) -> String {
        format!(
            "{}/{}/{}/{}/artifacts/{}/{}",
            self.base_url,
            ARTIFACTS_PREFIX,
            experiment_id,
            run,
            artifact.logical_name,
            artifact.file_name
        )
    }

    fn send(&self, request: RequestBuilder) -> Result<Value> {
        let response = request.send().map_err(transport_error)?;
        let status = response.status();
        let body = response.text().map_err(transport_error)?;
        if status.is_success() {
            if body.trim().is_empty() {
                return Ok(Value::Null);
            }
            return Ok(serde_json::from_str(&body)?);
        }
        Err(status_error(status, &body))
    }

    fn post<T: DeserializeOwned>(&self, endpoint: &str, body: Value) -> Result<T> {
        let value = self.send(self.client.post(self.api_url(endpoint)).json(&body))?;
        Ok(serde_json::from_value(value)?)
    }

    fn post_unit(&self, endpoint: &str, body: Value) -> Result<()> {
        self.send(self.client.post(self.api_url(endpoint)).json(&body))?;
        Ok(())
    }

    fn get_or_create_experiment(&self, name: &str) -> Result<String> {
        let lookup = self.send(
            self.client
                .get(self.api_url("experiments/get-by-name"))
                .query(&[("experiment_name", name)]),
        );
        match lookup {
            Ok(value) => {
                let found: ExperimentResponse = serde_json::from_value(value)?;
                Ok(found.experiment.experiment_id)
            }
            Err(TrackingError::NotFound(_)) => {
                let created: CreateExperimentResponse =
                    self.post("experiments/create", json!({ "name": name }))?;
                info!(experiment = name, experiment_id = %created.experiment_id, "Created MLflow experiment");
                Ok(created.experiment_id)
            }
            Err(e) => Err(e),
        }
    }

    fn experiment_for(&self, run: &RunId) -> Result<String> {
        if let Some(id) = self.run_experiments.lock().get(run) {
            return Ok(id.clone());
        }
        let value = self.send(
            self.client
                .get(self.api_url("runs/get"))
                .query(&[("run_id", run.as_str())]),
        )?;
        let id = value["run"]["info"]["experiment_id"]
            .as_str()
            .ok_or_else(|| TrackingError::Serialization("runs/get without experiment_id".into()))?
            .to_string();
        self.run_experiments.lock().insert(run.clone(), id.clone());
        Ok(id)
    }

    fn register(&self, name: &str, run: &RunId, source: &str) -> Result<u32> {
        match self.post_unit("registered-models/create", json!({ "name": name })) {
            Ok(()) => info!(model = name, "Created registered model"),
            Err(TrackingError::Rejected(msg)) if msg.contains("RESOURCE_ALREADY_EXISTS") => {
                debug!(model = name, "Registered model already exists")
            }
            Err(e) => return Err(e),
        }

        // A create whose response was lost has already published a version
        if let Some(existing) = self.find_version(name, run, source)? {
            debug!(model = name, version = existing, "Model version already registered for run");
            return Ok(existing);
        }

        let created: CreateModelVersionResponse = self.post(
            "model-versions/create",
            json!({ "name": name, "source": source, "run_id": run.as_str() }),
        )?;
        parse_version(&created.model_version.version)
    }

    /// Version of `name` already created from `source` by `run`, if any
    fn find_version(&self, name: &str, run: &RunId, source: &str) -> Result<Option<u32>> {
        let filter = format!("name='{}' and run_id='{}'", name, run);
        let value = self.send(
            self.client
                .get(self.api_url("model-versions/search"))
                .query(&[("filter", filter.as_str())]),
        )?;
        if value.is_null() {
            return Ok(None);
        }
        let found: SearchModelVersionsResponse = serde_json::from_value(value)?;
        let mut versions = Vec::new();
        for info in found
            .model_versions
            .iter()
            .filter(|v| v.run_id == run.as_str() && v.source == source)
        {
            versions.push(parse_version(&info.version)?);
        }
        Ok(versions.into_iter().min())
    }
}

fn parse_version(raw: &str) -> Result<u32> {
    raw.parse()
        .map_err(|_| TrackingError::Serialization(format!("non-numeric model version {:?}", raw)))
}

/// Registry source URI for an artifact logged through the proxy
pub fn model_source(experiment_id: &str, run: &RunId, logical_name: &str) -> String {
    format!(
        "mlflow-artifacts:/{}/{}/artifacts/{}",
        experiment_id, run, logical_name
    )
}

fn transport_error(err: reqwest::Error) -> TrackingError {
    TrackingError::Unavailable(err.to_string())
}

fn status_error(status: StatusCode, body: &str) -> TrackingError {
    let detail = match serde_json::from_str::<ApiError>(body) {
        Ok(api) if !api.error_code.is_empty() => format!("{}: {}", api.error_code, api.message),
        _ => body.chars().take(200).collect(),
    };
    let message = format!("HTTP {}: {}", status.as_u16(), detail);

    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        TrackingError::Unavailable(message)
    } else if detail.starts_with("RESOURCE_DOES_NOT_EXIST") {
        TrackingError::NotFound(message)
    } else {
        TrackingError::Rejected(message)
    }
}

impl TrackingBackend for MlflowTracker {
    fn name(&self) -> &'static str {
        "mlflow"
    }

    #[instrument(skip(self, ctx), fields(experiment = %ctx.experiment_name))]
    fn start_run(&self, ctx: &ExperimentContext, run_name: Option<&str>) -> Result<RunId> {
        let experiment_id = self.get_or_create_experiment(&ctx.experiment_name)?;
        let mut body = json!({
            "experiment_id": experiment_id,
            "start_time": Utc::now().timestamp_millis(),
        });
        if let Some(name) = run_name {
            body["run_name"] = json!(name);
        }
        let created: CreateRunResponse = self.post("runs/create", body)?;
        let run_id = RunId::new(created.run.info.run_id);
        self.run_experiments
            .lock()
            .insert(run_id.clone(), experiment_id);
        Ok(run_id)
    }

    fn log_param(&self, run: &RunId, key: &str, value: &str) -> Result<()> {
        self.post_unit(
            "runs/log-parameter",
            json!({ "run_id": run.as_str(), "key": key, "value": value }),
        )
    }

    fn log_metric(&self, run: &RunId, key: &str, value: f64) -> Result<()> {
        self.post_unit(
            "runs/log-metric",
            json!({
                "run_id": run.as_str(),
                "key": key,
                "value": value,
                "timestamp": Utc::now().timestamp_millis(),
                "step": 0,
            }),
        )
    }

    fn set_tag(&self, run: &RunId, key: &str, value: &str) -> Result<()> {
        self.post_unit(
            "runs/set-tag",
            json!({ "run_id": run.as_str(), "key": key, "value": value }),
        )
    }

    #[instrument(skip(self, artifact), fields(logical_name = %artifact.logical_name, size = artifact.bytes.len()))]
    fn log_model(
        &self,
        run: &RunId,
        artifact: &ModelArtifact,
        registered_name: Option<&str>,
    ) -> Result<ModelRegistration> {
        let experiment_id = self.experiment_for(run)?;
        let url = self.artifact_url(&experiment_id, run, artifact);
        self.send(
            self.client
                .put(&url)
                .header("Content-Type", "application/octet-stream")
                .body(artifact.bytes.clone()),
        )?;
        debug!(url = %url, "Uploaded artifact");

        let source = model_source(&experiment_id, run, &artifact.logical_name);
        let version = match registered_name {
            Some(name) => Some(self.register(name, run, &source)?),
            None => None,
        };

        Ok(ModelRegistration {
            artifact: ArtifactRef {
                logical_name: artifact.logical_name.clone(),
                uri: source,
                size_bytes: artifact.size_bytes(),
                checksum: artifact.checksum.clone(),
            },
            registered_name: registered_name.map(str::to_string),
            version,
        })
    }

    fn end_run(&self, run: &RunId, status: RunStatus) -> Result<()> {
        self.post_unit(
            "runs/update",
            json!({
                "run_id": run.as_str(),
                "status": status.as_mlflow(),
                "end_time": Utc::now().timestamp_millis(),
            }),
        )?;
        self.run_experiments.lock().remove(run);
        Ok(())
    }
}
