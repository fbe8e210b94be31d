//! Regression evaluation metrics

use serde::{Deserialize, Serialize};

use crate::errors::{ForestError, Result};

/// Metrics computed on a held-out set
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegressionMetrics {
    /// Mean absolute error
    pub mae: f64,
    /// Coefficient of determination
    pub r2: f64,
    /// Number of evaluated samples
    pub samples: usize,
}

impl RegressionMetrics {
    /// Score predictions against the actual targets they were made for
    pub fn evaluate(actual: &[f64], predicted: &[f64]) -> Result<Self> {
        check_pairs(actual, predicted)?;
        Ok(Self {
            mae: mean_absolute_error(actual, predicted)?,
            r2: r2_score(actual, predicted)?,
            samples: actual.len(),
        })
    }
}

fn check_pairs(actual: &[f64], predicted: &[f64]) -> Result<()> {
    if actual.len() != predicted.len() {
        return Err(ForestError::InvalidInput(format!(
            "{} targets but {} predictions",
            actual.len(),
            predicted.len()
        )));
    }
    if actual.is_empty() {
        return Err(ForestError::InvalidInput(
            "cannot score an empty evaluation set".into(),
        ));
    }
    Ok(())
}

/// Mean absolute error
pub fn mean_absolute_error(actual: &[f64], predicted: &[f64]) -> Result<f64> {
    check_pairs(actual, predicted)?;
    let total: f64 = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).abs())
        .sum();
    Ok(total / actual.len() as f64)
}

/// Coefficient of determination.
///
/// A constant target gives 1.0 for a perfect fit and 0.0 otherwise instead
/// of dividing by zero.
pub fn r2_score(actual: &[f64], predicted: &[f64]) -> Result<f64> {
    check_pairs(actual, predicted)?;
    let mean = actual.iter().sum::<f64>() / actual.len() as f64;

    let residual: f64 = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).powi(2))
        .sum();
    let total: f64 = actual.iter().map(|a| (a - mean).powi(2)).sum();

    if total == 0.0 {
        return Ok(if residual == 0.0 { 1.0 } else { 0.0 });
    }
    Ok(1.0 - residual / total)
}
