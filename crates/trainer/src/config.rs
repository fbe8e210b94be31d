//! Pipeline configuration
//!
//! Every constant the training job depends on lives here, with defaults
//! matching the production job. Values are layered with the `config` crate:
//!
//! 1. built-in defaults ([`PipelineConfig::default`])
//! 2. an optional file (`--config`, TOML/YAML/JSON by extension)
//! 3. `READINESS__<SECTION>__<FIELD>` environment variables
//!
//! e.g. `READINESS__TRACKING__KIND=mlflow` or
//! `READINESS__DATASET__FEATURE_COLUMNS=age,monthly_income`.

use ::config::{Config, Environment, File as ConfigFile};
use readiness_forest::{ForestParams, MaxFeatures};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "READINESS";

/// Feature columns the production model is trained on
pub const DEFAULT_FEATURE_COLUMNS: [&str; 8] = [
    "age",
    "monthly_income",
    "epf_balance",
    "debt_amount",
    "household_size",
    "medical_expense_monthly",
    "mental_stress_level",
    "has_chronic_disease",
];

pub const DEFAULT_TARGET_COLUMN: &str = "retirement_readiness_score";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    /// Objects are files at `<root>/<bucket>/<key>`
    Local,
    /// Objects are fetched from `<endpoint>/<bucket>/<key>`
    Http,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub kind: StorageKind,
    pub root: PathBuf,
    pub endpoint: String,
    pub bucket: String,
    pub key: String,
    pub timeout_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            kind: StorageKind::Local,
            root: PathBuf::from("data"),
            endpoint: "https://s3.amazonaws.com".to_string(),
            bucket: "retirement-readiness-data".to_string(),
            key: "data/retirement_dataset.csv".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    pub feature_columns: Vec<String>,
    pub target_column: String,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            feature_columns: DEFAULT_FEATURE_COLUMNS.iter().map(|c| c.to_string()).collect(),
            target_column: DEFAULT_TARGET_COLUMN.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitConfig {
    /// Share of rows held out for validation, in (0, 1)
    pub validation_ratio: f64,
    pub seed: u64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            validation_ratio: 0.2,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestConfig {
    pub n_estimators: usize,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub bootstrap: bool,
    pub seed: u64,
}

impl Default for ForestConfig {
    fn default() -> Self {
        let params = ForestParams::default();
        Self {
            n_estimators: params.n_estimators,
            max_depth: params.max_depth,
            min_samples_split: params.min_samples_split,
            min_samples_leaf: params.min_samples_leaf,
            bootstrap: params.bootstrap,
            seed: params.seed,
        }
    }
}

impl ForestConfig {
    pub fn to_params(&self) -> ForestParams {
        ForestParams {
            n_estimators: self.n_estimators,
            max_depth: self.max_depth,
            min_samples_split: self.min_samples_split,
            min_samples_leaf: self.min_samples_leaf,
            max_features: MaxFeatures::All,
            bootstrap: self.bootstrap,
            seed: self.seed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackingKind {
    /// `sled` store under `root`
    Local,
    /// MLflow tracking server at `uri`
    Mlflow,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    pub kind: TrackingKind,
    pub root: PathBuf,
    pub uri: String,
    pub timeout_secs: u64,
    pub experiment_name: String,
    pub registered_model_name: String,
    pub run_name: Option<String>,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            kind: TrackingKind::Local,
            root: PathBuf::from("mlruns"),
            uri: "http://127.0.0.1:5000".to_string(),
            timeout_secs: 30,
            experiment_name: "retirement-prediction".to_string(),
            registered_model_name: "retirement_rf_model".to_string(),
            run_name: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactsConfig {
    /// Where the fitted encoder is written
    pub encoder_path: PathBuf,
    /// Optional local copy of the trained model
    pub model_path: Option<PathBuf>,
    /// Artifact path of the model inside the run
    pub model_logical_name: String,
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            encoder_path: PathBuf::from("models/feature_encoder.bin"),
            model_path: None,
            model_logical_name: "model".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub multiplier: f64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 500,
            multiplier: 2.0,
            max_backoff_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Compact,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}

/// Complete configuration of one training invocation
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub storage: StorageConfig,
    pub dataset: DatasetConfig,
    pub split: SplitConfig,
    pub forest: ForestConfig,
    pub tracking: TrackingConfig,
    pub artifacts: ArtifactsConfig,
    pub retry: RetryConfig,
    pub logging: LoggingConfig,
}

impl PipelineConfig {
    /// Load defaults, then `path` (if given), then the process environment
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_env(path, None)
    }

    /// Like [`load`](Self::load) but reads overrides from `env` instead of the
    /// process environment when given
    pub fn load_with_env(
        path: Option<&Path>,
        env: Option<HashMap<String, String>>,
    ) -> Result<Self, ConfigError> {
        let defaults = Config::try_from(&PipelineConfig::default())?;
        let mut builder = Config::builder().add_source(defaults);

        if let Some(path) = path {
            if !path.exists() {
                return Err(ConfigError::Invalid(format!(
                    "configuration file {} not found",
                    path.display()
                )));
            }
            builder = builder.add_source(ConfigFile::from(path));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("dataset.feature_columns")
                .source(env),
        );

        let config: PipelineConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the pipeline cannot run with, listing every problem
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();

        if self.storage.bucket.trim().is_empty() {
            problems.push("storage.bucket is empty".to_string());
        }
        if self.storage.key.trim().is_empty() {
            problems.push("storage.key is empty".to_string());
        }
        if self.storage.kind == StorageKind::Http && self.storage.endpoint.trim().is_empty() {
            problems.push("storage.endpoint is empty".to_string());
        }
        if self.storage.timeout_secs == 0 {
            problems.push("storage.timeout_secs must be > 0".to_string());
        }

        if self.dataset.feature_columns.is_empty() {
            problems.push("dataset.feature_columns is empty".to_string());
        }
        let mut seen = BTreeSet::new();
        for column in &self.dataset.feature_columns {
            if column.trim().is_empty() {
                problems.push("dataset.feature_columns contains an empty name".to_string());
            } else if !seen.insert(column.as_str()) {
                problems.push(format!("dataset.feature_columns lists {} twice", column));
            }
        }
        if self.dataset.target_column.trim().is_empty() {
            problems.push("dataset.target_column is empty".to_string());
        } else if seen.contains(self.dataset.target_column.as_str()) {
            problems.push(format!(
                "target column {} is also listed as a feature",
                self.dataset.target_column
            ));
        }

        let ratio = self.split.validation_ratio;
        if !(ratio > 0.0 && ratio < 1.0) {
            problems.push(format!("split.validation_ratio {} outside (0, 1)", ratio));
        }

        if let Err(e) = self.forest.to_params().validate() {
            problems.push(format!("forest: {}", e));
        }

        if self.tracking.experiment_name.trim().is_empty() {
            problems.push("tracking.experiment_name is empty".to_string());
        }
        if self.tracking.registered_model_name.trim().is_empty() {
            problems.push("tracking.registered_model_name is empty".to_string());
        }
        if self.tracking.kind == TrackingKind::Mlflow && self.tracking.uri.trim().is_empty() {
            problems.push("tracking.uri is empty".to_string());
        }
        if self.tracking.timeout_secs == 0 {
            problems.push("tracking.timeout_secs must be > 0".to_string());
        }

        if self.artifacts.encoder_path.as_os_str().is_empty() {
            problems.push("artifacts.encoder_path is empty".to_string());
        }
        if self.artifacts.model_logical_name.trim().is_empty() {
            problems.push("artifacts.model_logical_name is empty".to_string());
        }

        if self.retry.max_attempts == 0 {
            problems.push("retry.max_attempts must be >= 1".to_string());
        }
        if self.retry.multiplier.is_nan() || self.retry.multiplier < 1.0 {
            problems.push(format!("retry.multiplier {} must be >= 1", self.retry.multiplier));
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(problems.join("; ")))
        }
    }

    pub fn storage_timeout(&self) -> Duration {
        Duration::from_secs(self.storage.timeout_secs)
    }

    pub fn tracking_timeout(&self) -> Duration {
        Duration::from_secs(self.tracking.timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn no_env() -> Option<HashMap<String, String>> {
        Some(HashMap::new())
    }

    #[test]
    fn test_defaults_match_production_job() {
        let config = PipelineConfig::load_with_env(None, no_env()).unwrap();
        assert_eq!(config, PipelineConfig::default());
        assert_eq!(config.storage.bucket, "retirement-readiness-data");
        assert_eq!(config.storage.key, "data/retirement_dataset.csv");
        assert_eq!(config.dataset.feature_columns.len(), 8);
        assert_eq!(config.split.validation_ratio, 0.2);
        assert_eq!(config.split.seed, 42);
        assert_eq!(config.forest.n_estimators, 100);
        assert_eq!(config.forest.max_depth, 10);
        assert_eq!(config.tracking.experiment_name, "retirement-prediction");
        assert_eq!(config.tracking.registered_model_name, "retirement_rf_model");
        assert_eq!(
            config.artifacts.encoder_path,
            PathBuf::from("models/feature_encoder.bin")
        );
    }

    #[test]
    fn test_file_then_env_layering() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("readiness.toml");
        fs::write(
            &path,
            r#"
[storage]
bucket = "staging-bucket"

[forest]
n_estimators = 20

[tracking]
kind = "mlflow"
"#,
        )
        .unwrap();

        let env: HashMap<String, String> = [
            ("READINESS__FOREST__MAX_DEPTH", "4"),
            ("READINESS__DATASET__FEATURE_COLUMNS", "age,debt_amount"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let config = PipelineConfig::load_with_env(Some(&path), Some(env)).unwrap();
        assert_eq!(config.storage.bucket, "staging-bucket");
        assert_eq!(config.storage.key, "data/retirement_dataset.csv");
        assert_eq!(config.forest.n_estimators, 20);
        assert_eq!(config.forest.max_depth, 4);
        assert_eq!(config.tracking.kind, TrackingKind::Mlflow);
        assert_eq!(config.dataset.feature_columns, vec!["age", "debt_amount"]);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let result = PipelineConfig::load_with_env(Some(&dir.path().join("nope.toml")), no_env());
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validation_collects_problems() {
        let mut config = PipelineConfig::default();
        config.split.validation_ratio = 1.5;
        config.forest.n_estimators = 0;
        config
            .dataset
            .feature_columns
            .push(DEFAULT_TARGET_COLUMN.to_string());
        config.dataset.feature_columns.push("age".to_string());

        let message = config.validate().unwrap_err().to_string();
        assert!(message.contains("validation_ratio"));
        assert!(message.contains("n_estimators"));
        assert!(message.contains("also listed as a feature"));
        assert!(message.contains("age twice"));
    }
}
