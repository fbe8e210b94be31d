//! Retirement-readiness training job CLI
//!
//! Runs the pipeline once. The run id goes to stdout, logs to stderr, and
//! the exit code reflects the kind of failure.

use anyhow::{Context, Result};
use clap::Parser;
use readiness_trainer::logging::init_logging;
use readiness_trainer::{
    experiment_context, object_store_from_config, tracker_from_config, Pipeline, PipelineConfig,
    PipelineError,
};
use readiness_tracking::RunId;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "readiness-train")]
#[command(author = "Readiness Contributors")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Train and register the retirement-readiness model", long_about = None)]
struct Args {
    /// Configuration file (TOML, YAML or JSON); built-in defaults otherwise
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    match run(args) {
        Ok(run_id) => {
            println!("{}", run_id);
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("error: {:#}", err);
            let code = err
                .downcast_ref::<PipelineError>()
                .map(PipelineError::exit_code)
                .unwrap_or(1);
            ExitCode::from(code)
        }
    }
}

fn run(args: Args) -> Result<RunId> {
    let config = PipelineConfig::load(args.config.as_deref())
        .map_err(PipelineError::from)
        .context("Failed to load configuration")?;

    init_logging(&config.logging, args.verbose).context("Failed to set tracing subscriber")?;

    info!("Readiness trainer v{}", readiness_trainer::VERSION);
    match &args.config {
        Some(path) => info!("Config file: {}", path.display()),
        None => info!("Config file: (built-in defaults)"),
    }
    info!(
        "Dataset: {}/{} via {:?} storage",
        config.storage.bucket, config.storage.key, config.storage.kind
    );
    info!(
        "Tracking: {:?} backend, experiment {}",
        config.tracking.kind, config.tracking.experiment_name
    );

    let ctx = experiment_context(&config);
    let store = object_store_from_config(&config)?;
    let tracker = tracker_from_config(&config)?;

    let outcome = Pipeline::new(config, ctx, store.as_ref(), tracker.as_ref()).run()?;

    info!("✓ Training completed successfully");
    info!("  MAE: {:.4}", outcome.metrics.mae);
    info!("  R²: {:.4}", outcome.metrics.r2);
    info!("  Model hash: {}", outcome.model_hash);
    info!("  Encoder: {}", outcome.encoder_path.display());
    if let Some(version) = outcome.registration.version {
        info!("  Registered version: {}", version);
    }

    Ok(outcome.run_id)
}
