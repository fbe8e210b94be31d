//! Canonical JSON serialization for deterministic hashing
//!
//! Object keys are sorted recursively and the output carries no whitespace,
//! so two structurally equal values always hash to the same BLAKE3 digest.
//! Floats are written with serde_json's shortest round-trip formatting.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::errors::Result;

/// Serialize a value to canonical JSON (sorted keys, no whitespace)
pub fn to_canonical_json<T: Serialize>(value: &T) -> Result<String> {
    let canonical = canonicalize(serde_json::to_value(value)?);
    Ok(serde_json::to_string(&canonical)?)
}

fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));

            let mut sorted = Map::with_capacity(entries.len());
            for (key, val) in entries {
                sorted.insert(key, canonicalize(val));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}

/// BLAKE3 digest of the canonical JSON form, hex encoded (64 chars)
pub fn hash_canonical_hex<T: Serialize>(value: &T) -> Result<String> {
    let json = to_canonical_json(value)?;
    Ok(hex::encode(blake3::hash(json.as_bytes()).as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Serialize)]
    struct Sample {
        zeta: f64,
        alpha: Vec<u32>,
        middle: HashMap<String, i64>,
    }

    fn sample(order: &[(&str, i64)]) -> Sample {
        Sample {
            zeta: 0.5,
            alpha: vec![3, 1, 2],
            middle: order.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        }
    }

    #[test]
    fn test_keys_sorted_and_compact() {
        let json = to_canonical_json(&sample(&[("b", 2), ("a", 1)])).unwrap();
        assert_eq!(
            json,
            r#"{"alpha":[3,1,2],"middle":{"a":1,"b":2},"zeta":0.5}"#
        );
    }

    #[test]
    fn test_hash_ignores_insertion_order() {
        let h1 = hash_canonical_hex(&sample(&[("x", 1), ("y", 2), ("z", 3)])).unwrap();
        let h2 = hash_canonical_hex(&sample(&[("z", 3), ("x", 1), ("y", 2)])).unwrap();
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
    }

    #[test]
    fn test_hash_changes_with_data() {
        let h1 = hash_canonical_hex(&sample(&[("x", 1)])).unwrap();
        let h2 = hash_canonical_hex(&sample(&[("x", 2)])).unwrap();
        assert_ne!(h1, h2);
    }
}
