//! Random forest trainer
//!
//! Fits `n_estimators` CART trees, each on its own bootstrap sample drawn
//! with replacement. Tree `i` uses an RNG seeded from `(seed, i)`, so the
//! fitted forest depends only on the data and the parameters.

use readiness_forest::{ForestError, ForestParams, RandomForestModel};
use tracing::{debug, info, instrument};

use crate::cart::{CartBuilder, TreeConfig};
use crate::deterministic::{derive_seed, SeededRng};

/// Random forest trainer
pub struct ForestTrainer {
    params: ForestParams,
}

impl ForestTrainer {
    pub fn new(params: ForestParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &ForestParams {
        &self.params
    }

    /// Fit a forest on an encoded feature matrix
    #[instrument(skip_all, fields(rows = features.len(), trees = self.params.n_estimators))]
    pub fn fit(
        &self,
        features: &[Vec<f64>],
        targets: &[f64],
        feature_names: Vec<String>,
    ) -> Result<RandomForestModel, ForestError> {
        self.params.validate()?;
        check_matrix(features, targets, feature_names.len())?;

        let n_samples = features.len();
        let n_features = feature_names.len();
        let tree_config = TreeConfig {
            max_depth: self.params.max_depth,
            min_samples_split: self.params.min_samples_split,
            min_samples_leaf: self.params.min_samples_leaf,
            max_features: self.params.max_features.resolve(n_features),
        };
        let builder = CartBuilder::new(features, targets, tree_config)?;

        let mut trees = Vec::with_capacity(self.params.n_estimators);
        for tree_idx in 0..self.params.n_estimators {
            let mut rng = SeededRng::new(derive_seed(self.params.seed, tree_idx as u64));
            let samples: Vec<usize> = if self.params.bootstrap {
                (0..n_samples).map(|_| rng.next_index(n_samples)).collect()
            } else {
                (0..n_samples).collect()
            };

            let tree = builder.build(&samples, &mut rng);
            debug!(
                tree = tree_idx + 1,
                nodes = tree.nodes.len(),
                depth = tree.depth(),
                "Tree fitted"
            );
            trees.push(tree);
        }

        let model = RandomForestModel::new(feature_names, self.params.clone(), trees);
        model.validate()?;

        info!(
            trees = model.num_trees(),
            features = n_features,
            samples = n_samples,
            "Forest fitted"
        );
        Ok(model)
    }
}

/// Reject empty, ragged or non-finite input before any tree is grown
fn check_matrix(features: &[Vec<f64>], targets: &[f64], width: usize) -> Result<(), ForestError> {
    if features.is_empty() {
        return Err(ForestError::InvalidInput("empty feature matrix".into()));
    }
    if width == 0 {
        return Err(ForestError::InvalidInput("feature matrix has no columns".into()));
    }
    if features.len() != targets.len() {
        return Err(ForestError::InvalidInput(format!(
            "{} feature rows but {} targets",
            features.len(),
            targets.len()
        )));
    }
    for (row_idx, row) in features.iter().enumerate() {
        if row.len() != width {
            return Err(ForestError::WidthMismatch {
                expected: width,
                actual: row.len(),
            });
        }
        if let Some(col) = row.iter().position(|v| !v.is_finite()) {
            return Err(ForestError::InvalidInput(format!(
                "non-finite feature value at row {}, column {}",
                row_idx, col
            )));
        }
    }
    if let Some(row_idx) = targets.iter().position(|v| !v.is_finite()) {
        return Err(ForestError::InvalidInput(format!(
            "non-finite target at row {}",
            row_idx
        )));
    }
    Ok(())
}
