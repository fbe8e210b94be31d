//! Feature selection and train/validation split

use readiness_forest::{FeatureRow, Scalar};
use tracing::{info, instrument};

use crate::config::PipelineConfig;
use crate::dataset::RawDataset;
use crate::deterministic::permutation;
use crate::errors::{PipelineError, Result};

/// Rows and targets for both sides of the split.
///
/// `train_rows[i]` pairs with `train_targets[i]` and came from dataset row
/// `train_indices[i]`; likewise for validation.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetSplit {
    pub train_rows: Vec<FeatureRow>,
    pub val_rows: Vec<FeatureRow>,
    pub train_targets: Vec<Scalar>,
    pub val_targets: Vec<Scalar>,
    pub train_indices: Vec<usize>,
    pub val_indices: Vec<usize>,
}

impl DatasetSplit {
    pub fn train_len(&self) -> usize {
        self.train_rows.len()
    }

    pub fn val_len(&self) -> usize {
        self.val_rows.len()
    }
}

/// Number of validation rows for `n` rows: `ceil(n * ratio)`
pub fn validation_size(n: usize, ratio: f64) -> usize {
    ((n as f64) * ratio).ceil().min(n as f64) as usize
}

pub struct FeaturePreparer {
    feature_columns: Vec<String>,
    target_column: String,
    validation_ratio: f64,
    seed: u64,
}

impl FeaturePreparer {
    pub fn new(
        feature_columns: Vec<String>,
        target_column: impl Into<String>,
        validation_ratio: f64,
        seed: u64,
    ) -> Self {
        Self {
            feature_columns,
            target_column: target_column.into(),
            validation_ratio,
            seed,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(
            config.dataset.feature_columns.clone(),
            config.dataset.target_column.clone(),
            config.split.validation_ratio,
            config.split.seed,
        )
    }

    /// Select the configured columns and split the rows.
    ///
    /// Fails with `SchemaMismatch` naming every absent column. The result
    /// depends only on the dataset, the ratio and the seed.
    #[instrument(skip_all, fields(rows = dataset.n_rows(), seed = self.seed))]
    pub fn prepare(&self, dataset: &RawDataset) -> Result<DatasetSplit> {
        let mut missing = Vec::new();
        let mut feature_positions = Vec::with_capacity(self.feature_columns.len());
        for name in &self.feature_columns {
            match dataset.column_index(name) {
                Some(pos) => feature_positions.push((name.as_str(), pos)),
                None => missing.push(name.clone()),
            }
        }
        let target_position = dataset.column_index(&self.target_column);
        if target_position.is_none() {
            missing.push(self.target_column.clone());
        }
        let target_position = match target_position {
            Some(pos) if missing.is_empty() => pos,
            _ => return Err(PipelineError::SchemaMismatch { missing }),
        };

        let select = |row: &[Scalar]| -> FeatureRow {
            feature_positions
                .iter()
                .map(|&(name, pos)| (name.to_string(), row[pos].clone()))
                .collect()
        };

        let n = dataset.n_rows();
        let order = permutation(n, self.seed);
        let n_val = validation_size(n, self.validation_ratio);
        let (val_indices, train_indices) = order.split_at(n_val);

        let rows = dataset.rows();
        let split = DatasetSplit {
            train_rows: train_indices.iter().map(|&i| select(&rows[i])).collect(),
            val_rows: val_indices.iter().map(|&i| select(&rows[i])).collect(),
            train_targets: train_indices
                .iter()
                .map(|&i| rows[i][target_position].clone())
                .collect(),
            val_targets: val_indices
                .iter()
                .map(|&i| rows[i][target_position].clone())
                .collect(),
            train_indices: train_indices.to_vec(),
            val_indices: val_indices.to_vec(),
        };

        info!(
            train_rows = split.train_len(),
            val_rows = split.val_len(),
            features = self.feature_columns.len(),
            "Dataset split"
        );
        Ok(split)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset(n: usize) -> RawDataset {
        let header = vec!["age".to_string(), "income".to_string(), "score".to_string()];
        let rows = (0..n)
            .map(|i| {
                vec![
                    Scalar::Number(20.0 + i as f64),
                    Scalar::Number(1000.0 * i as f64),
                    Scalar::Number(i as f64),
                ]
            })
            .collect();
        RawDataset::new(header, rows).unwrap()
    }

    fn preparer() -> FeaturePreparer {
        FeaturePreparer::new(vec!["age".into(), "income".into()], "score", 0.2, 42)
    }

    #[test]
    fn test_validation_size_rounds_up() {
        assert_eq!(validation_size(1000, 0.2), 200);
        assert_eq!(validation_size(10, 0.25), 3);
        assert_eq!(validation_size(7, 0.2), 2);
        assert_eq!(validation_size(1, 0.2), 1);
        assert_eq!(validation_size(0, 0.2), 0);
    }

    #[test]
    fn test_split_sizes_and_pairing() {
        let split = preparer().prepare(&dataset(50)).unwrap();
        assert_eq!(split.val_len(), 10);
        assert_eq!(split.train_len(), 40);

        for (row, (target, idx)) in split
            .train_rows
            .iter()
            .zip(split.train_targets.iter().zip(&split.train_indices))
        {
            assert_eq!(row["age"], Scalar::Number(20.0 + *idx as f64));
            assert_eq!(*target, Scalar::Number(*idx as f64));
            assert_eq!(row.len(), 2);
            assert!(!row.contains_key("score"));
        }
    }

    #[test]
    fn test_split_is_a_partition() {
        let split = preparer().prepare(&dataset(37)).unwrap();
        let mut all: Vec<usize> = split
            .train_indices
            .iter()
            .chain(&split.val_indices)
            .copied()
            .collect();
        all.sort_unstable();
        assert_eq!(all, (0..37).collect::<Vec<_>>());
    }

    #[test]
    fn test_split_is_deterministic() {
        let a = preparer().prepare(&dataset(100)).unwrap();
        let b = preparer().prepare(&dataset(100)).unwrap();
        assert_eq!(a, b);

        let other = FeaturePreparer::new(vec!["age".into(), "income".into()], "score", 0.2, 7)
            .prepare(&dataset(100))
            .unwrap();
        assert_ne!(a.val_indices, other.val_indices);
    }

    #[test]
    fn test_missing_columns_are_all_reported() {
        let preparer = FeaturePreparer::new(
            vec!["Age".into(), "income".into(), "epf_balance".into()],
            "retirement_readiness_score",
            0.2,
            42,
        );
        match preparer.prepare(&dataset(5)) {
            Err(PipelineError::SchemaMismatch { missing }) => assert_eq!(
                missing,
                vec!["Age", "epf_balance", "retirement_readiness_score"]
            ),
            other => panic!("expected SchemaMismatch, got {:?}", other),
        }
    }
}
