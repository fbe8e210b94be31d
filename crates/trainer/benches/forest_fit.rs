use criterion::{black_box, criterion_group, criterion_main, Criterion};
use readiness_forest::ForestParams;
use readiness_trainer::{ForestTrainer, SeededRng};

fn synthetic(rows: usize, width: usize) -> (Vec<Vec<f64>>, Vec<f64>, Vec<String>) {
    let mut rng = SeededRng::new(42);
    let features: Vec<Vec<f64>> = (0..rows)
        .map(|_| (0..width).map(|_| rng.next_f64() * 100.0).collect())
        .collect();
    let targets = features
        .iter()
        .map(|row| row.iter().enumerate().map(|(i, v)| v * (i + 1) as f64).sum::<f64>())
        .collect();
    let names = (0..width).map(|i| format!("f{}", i)).collect();
    (features, targets, names)
}

fn bench_forest_fit(c: &mut Criterion) {
    let (features, targets, names) = synthetic(800, 8);
    let trainer = ForestTrainer::new(ForestParams {
        n_estimators: 10,
        ..ForestParams::default()
    });

    c.bench_function("fit_10_trees_800x8", |b| {
        b.iter(|| {
            trainer
                .fit(black_box(&features), black_box(&targets), names.clone())
                .expect("fit")
        })
    });
}

criterion_group!(benches, bench_forest_fit);
criterion_main!(benches);
