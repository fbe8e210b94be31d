//! Cell values shared by the dataset loader and the feature encoder

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// One typed CSV cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Scalar {
    Number(f64),
    Bool(bool),
    Text(String),
    Missing,
}

impl Scalar {
    /// Type a raw CSV field: empty → `Missing`, numeric → `Number`,
    /// `true`/`false` in any case → `Bool`, anything else → `Text`.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Scalar::Missing;
        }
        if let Ok(value) = trimmed.parse::<f64>() {
            return Scalar::Number(value);
        }
        if trimmed.eq_ignore_ascii_case("true") {
            return Scalar::Bool(true);
        }
        if trimmed.eq_ignore_ascii_case("false") {
            return Scalar::Bool(false);
        }
        Scalar::Text(trimmed.to_string())
    }

    /// Value of a regression target: finite numbers only, never booleans
    pub fn as_target(&self) -> Option<f64> {
        match self {
            Scalar::Number(value) if value.is_finite() => Some(*value),
            _ => None,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Number(value) => write!(f, "{}", value),
            Scalar::Bool(flag) => write!(f, "{}", flag),
            Scalar::Text(text) => f.write_str(text),
            Scalar::Missing => f.write_str("<missing>"),
        }
    }
}

/// A feature row keyed by column name
pub type FeatureRow = BTreeMap<String, Scalar>;
