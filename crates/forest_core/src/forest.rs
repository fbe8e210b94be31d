//! Random forest regression model
//!
//! A fitted forest is immutable: predictions average the outputs of every
//! tree, and the canonical-JSON BLAKE3 hash identifies the exact fitted
//! structure (two fits on the same data with the same parameters produce
//! the same hash).

use serde::{Deserialize, Serialize};

use crate::errors::{ForestError, Result};
use crate::serde_canon::{hash_canonical_hex, to_canonical_json};
use crate::tree::RegressionTree;

/// Model format version
pub const FORMAT_VERSION: u32 = 1;

/// Strategy for the number of features examined at each split
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaxFeatures {
    /// Every feature at every split
    All,
    /// Square root of the feature count, rounded up
    Sqrt,
    /// Fraction of the feature count, rounded up
    Fraction(f64),
    /// Fixed count, capped at the feature count
    Fixed(usize),
}

impl MaxFeatures {
    /// Resolve to a concrete count in `1..=n_features`
    pub fn resolve(&self, n_features: usize) -> usize {
        let count = match *self {
            MaxFeatures::All => n_features,
            MaxFeatures::Sqrt => (n_features as f64).sqrt().ceil() as usize,
            MaxFeatures::Fraction(f) => (n_features as f64 * f).ceil() as usize,
            MaxFeatures::Fixed(n) => n,
        };
        count.clamp(1, n_features.max(1))
    }
}

/// Hyperparameters a forest was fitted with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_estimators: usize,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub max_features: MaxFeatures,
    pub bootstrap: bool,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: 10,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::All,
            bootstrap: true,
            seed: 42,
        }
    }
}

impl ForestParams {
    /// Reject parameter combinations that cannot grow a forest
    pub fn validate(&self) -> Result<()> {
        if self.n_estimators == 0 {
            return Err(ForestError::InvalidInput("n_estimators must be >= 1".into()));
        }
        if self.max_depth == 0 {
            return Err(ForestError::InvalidInput("max_depth must be >= 1".into()));
        }
        if self.min_samples_split < 2 {
            return Err(ForestError::InvalidInput(
                "min_samples_split must be >= 2".into(),
            ));
        }
        if self.min_samples_leaf == 0 {
            return Err(ForestError::InvalidInput(
                "min_samples_leaf must be >= 1".into(),
            ));
        }
        match self.max_features {
            MaxFeatures::Fraction(f) if !(f > 0.0 && f <= 1.0) => Err(ForestError::InvalidInput(
                format!("max_features fraction {} outside (0, 1]", f),
            )),
            MaxFeatures::Fixed(0) => Err(ForestError::InvalidInput(
                "max_features must be >= 1".into(),
            )),
            _ => Ok(()),
        }
    }
}

/// Fitted random forest regressor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForestModel {
    /// Model format version
    pub version: u32,

    /// Encoded input column names, in vector order
    pub feature_names: Vec<String>,

    /// Hyperparameters used for fitting
    pub params: ForestParams,

    /// Fitted trees
    pub trees: Vec<RegressionTree>,
}

impl RandomForestModel {
    pub fn new(feature_names: Vec<String>, params: ForestParams, trees: Vec<RegressionTree>) -> Self {
        Self {
            version: FORMAT_VERSION,
            feature_names,
            params,
            trees,
        }
    }

    /// Width of the encoded feature vector the model expects
    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    pub fn num_trees(&self) -> usize {
        self.trees.len()
    }

    /// Validate model structure
    pub fn validate(&self) -> Result<()> {
        if self.version != FORMAT_VERSION {
            return Err(ForestError::ValidationFailed(format!(
                "Unsupported model version: {}",
                self.version
            )));
        }
        if self.trees.is_empty() {
            return Err(ForestError::ValidationFailed("model has no trees".into()));
        }
        if self.feature_names.is_empty() {
            return Err(ForestError::ValidationFailed("model has no features".into()));
        }

        for (i, tree) in self.trees.iter().enumerate() {
            tree.validate(self.n_features()).map_err(|e| {
                ForestError::ValidationFailed(format!("Tree {} validation failed: {}", i, e))
            })?;
        }

        Ok(())
    }

    /// Predict one encoded feature vector
    pub fn predict_one(&self, features: &[f64]) -> Result<f64> {
        if features.len() != self.n_features() {
            return Err(ForestError::WidthMismatch {
                expected: self.n_features(),
                actual: features.len(),
            });
        }
        if self.trees.is_empty() {
            return Err(ForestError::ValidationFailed("model has no trees".into()));
        }

        let sum: f64 = self.trees.iter().map(|tree| tree.evaluate(features)).sum();
        Ok(sum / self.trees.len() as f64)
    }

    /// Predict a batch of encoded feature vectors
    pub fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>> {
        rows.iter().map(|row| self.predict_one(row)).collect()
    }

    /// Serialize model to canonical JSON (sorted keys, no whitespace)
    pub fn to_canonical_json(&self) -> Result<String> {
        to_canonical_json(self)
    }

    /// BLAKE3 hash of the canonical JSON form, hex encoded
    pub fn hash_hex(&self) -> Result<String> {
        hash_canonical_hex(self)
    }
}
