//! Shared fixtures for integration tests

#![allow(dead_code)]

use anyhow::Result;
use readiness_trainer::{LocalObjectStore, ObjectLocation, PipelineConfig, SeededRng};
use std::path::Path;

pub const HEADER: [&str; 9] = [
    "age",
    "monthly_income",
    "epf_balance",
    "debt_amount",
    "household_size",
    "medical_expense_monthly",
    "mental_stress_level",
    "has_chronic_disease",
    "retirement_readiness_score",
];

/// Synthetic survey CSV with a learnable score
pub fn synthetic_csv(rows: usize, seed: u64, header: &[&str]) -> String {
    let mut rng = SeededRng::new(seed);
    let mut csv = header.join(",");
    csv.push('\n');

    for _ in 0..rows {
        let age = 25 + rng.next_below(40);
        let income = 2_000 + rng.next_below(18_000);
        let epf = rng.next_below(600_000);
        let debt = rng.next_below(150_000);
        let household = 1 + rng.next_below(7);
        let medical = rng.next_below(2_000);
        let stress = 1 + rng.next_below(10);
        let chronic = rng.next_below(4) == 0;

        let score = 20.0 + epf as f64 / 12_000.0 + income as f64 / 1_000.0
            - debt as f64 / 10_000.0
            - stress as f64
            - if chronic { 8.0 } else { 0.0 }
            + rng.next_f64() * 4.0;
        let score = score.clamp(0.0, 100.0);

        csv.push_str(&format!(
            "{},{},{},{},{},{},{},{},{:.2}\n",
            age, income, epf, debt, household, medical, stress, chronic, score
        ));
    }
    csv
}

/// Config pointing every path into `root`
pub fn config_in(root: &Path) -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.storage.root = root.join("store");
    config.tracking.root = root.join("mlruns");
    config.artifacts.encoder_path = root.join("models").join("feature_encoder.bin");
    config.retry.initial_backoff_ms = 0;
    config.retry.max_backoff_ms = 0;
    config
}

/// Store the dataset where `config` expects it
pub fn seed_store(config: &PipelineConfig, csv: &str) -> Result<LocalObjectStore> {
    let store = LocalObjectStore::new(&config.storage.root);
    store.put(
        &ObjectLocation::new(&config.storage.bucket, &config.storage.key),
        csv.as_bytes(),
    )?;
    Ok(store)
}
