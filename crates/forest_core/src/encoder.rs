//! Dictionary feature encoder
//!
//! Maps feature rows (column name → cell) to fixed-order numeric vectors.
//! Numeric and boolean cells occupy a column named after their key; text
//! cells are one-hot encoded into a `key=value` column. The column
//! vocabulary is learned once by [`FeatureEncoder::fit`] and sorted, so the
//! same training rows always yield the same layout.
//!
//! [`FeatureEncoder::transform`] borrows the encoder immutably: encoding
//! validation or inference rows can never extend the vocabulary. Text
//! values that were not seen during fitting encode to all-zero one-hot
//! columns.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::errors::{ForestError, Result};
use crate::types::{FeatureRow, Scalar};

/// Fitted dictionary encoder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureEncoder {
    /// Output column names in vector order
    feature_names: Vec<String>,
    /// Output column name → position
    vocabulary: BTreeMap<String, usize>,
}

impl FeatureEncoder {
    /// Learn the column vocabulary from training rows only
    pub fn fit(rows: &[FeatureRow]) -> Result<Self> {
        if rows.is_empty() {
            return Err(ForestError::InvalidInput(
                "cannot fit encoder on zero rows".into(),
            ));
        }

        let mut names = BTreeSet::new();
        for (row_idx, row) in rows.iter().enumerate() {
            for (key, cell) in row {
                let (name, _) = encode_cell(row_idx, key, cell)?;
                names.insert(name);
            }
        }

        let feature_names: Vec<String> = names.into_iter().collect();
        let vocabulary = feature_names
            .iter()
            .enumerate()
            .map(|(idx, name)| (name.clone(), idx))
            .collect();

        tracing::debug!(columns = feature_names.len(), "fitted feature encoder");

        Ok(Self {
            feature_names,
            vocabulary,
        })
    }

    /// Encode rows with the fitted vocabulary
    pub fn transform(&self, rows: &[FeatureRow]) -> Result<Vec<Vec<f64>>> {
        rows.iter()
            .enumerate()
            .map(|(row_idx, row)| self.transform_row(row_idx, row))
            .collect()
    }

    /// Encode a single row; `row_idx` is only used in error messages
    pub fn transform_row(&self, row_idx: usize, row: &FeatureRow) -> Result<Vec<f64>> {
        let mut vector = vec![0.0; self.feature_names.len()];

        for (key, cell) in row {
            let (name, value) = encode_cell(row_idx, key, cell)?;
            if let Some(&position) = self.vocabulary.get(&name) {
                vector[position] = value;
            }
        }

        Ok(vector)
    }

    /// Output column names in vector order
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Encoded vector width
    pub fn width(&self) -> usize {
        self.feature_names.len()
    }
}

/// Output column and value for one cell
fn encode_cell(row_idx: usize, key: &str, cell: &Scalar) -> Result<(String, f64)> {
    match cell {
        Scalar::Number(value) if value.is_finite() => Ok((key.to_string(), *value)),
        Scalar::Number(_) => Err(ForestError::Encoding {
            row: row_idx,
            feature: key.to_string(),
            reason: "value is not finite".into(),
        }),
        Scalar::Bool(flag) => Ok((key.to_string(), f64::from(u8::from(*flag)))),
        Scalar::Text(text) => Ok((format!("{}={}", key, text), 1.0)),
        Scalar::Missing => Err(ForestError::Encoding {
            row: row_idx,
            feature: key.to_string(),
            reason: "value is missing".into(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[(&str, Scalar)]) -> FeatureRow {
        cells
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn training_rows() -> Vec<FeatureRow> {
        vec![
            row(&[
                ("age", Scalar::Number(40.0)),
                ("region", Scalar::Text("north".into())),
                ("has_chronic_disease", Scalar::Bool(true)),
            ]),
            row(&[
                ("age", Scalar::Number(55.0)),
                ("region", Scalar::Text("south".into())),
                ("has_chronic_disease", Scalar::Bool(false)),
            ]),
        ]
    }

    #[test]
    fn test_fit_sorts_vocabulary() {
        let encoder = FeatureEncoder::fit(&training_rows()).unwrap();
        assert_eq!(
            encoder.feature_names(),
            &["age", "has_chronic_disease", "region=north", "region=south"]
        );
    }

    #[test]
    fn test_transform_layout() {
        let rows = training_rows();
        let encoder = FeatureEncoder::fit(&rows).unwrap();
        let encoded = encoder.transform(&rows).unwrap();
        assert_eq!(encoded[0], vec![40.0, 1.0, 1.0, 0.0]);
        assert_eq!(encoded[1], vec![55.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_transform_does_not_learn_unseen_values() {
        let encoder = FeatureEncoder::fit(&training_rows()).unwrap();
        let before = encoder.clone();

        let unseen = vec![row(&[
            ("age", Scalar::Number(61.0)),
            ("region", Scalar::Text("east".into())),
            ("extra_column", Scalar::Number(9.0)),
        ])];
        let encoded = encoder.transform(&unseen).unwrap();

        assert_eq!(encoded[0], vec![61.0, 0.0, 0.0, 0.0]);
        assert_eq!(encoder, before);
    }

    #[test]
    fn test_missing_and_nan_are_rejected() {
        let missing = vec![row(&[("age", Scalar::Missing)])];
        assert!(matches!(
            FeatureEncoder::fit(&missing),
            Err(ForestError::Encoding { row: 0, .. })
        ));

        let encoder = FeatureEncoder::fit(&training_rows()).unwrap();
        let nan = vec![row(&[("age", Scalar::Number(f64::NAN))])];
        assert!(encoder.transform(&nan).is_err());
    }

    #[test]
    fn test_fit_requires_rows() {
        assert!(FeatureEncoder::fit(&[]).is_err());
    }
}
