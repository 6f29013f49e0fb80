//! Train a three-party hidden-variable network on one target distribution.
//!
//! # Usage
//!
//! ```bash
//! cargo run --release -p lhv-learn --bin train-lhv -- \
//!   --config run.json \
//!   --target target.json \
//!   --output checkpoints/model.safetensors \
//!   --report reports/eval.json
//! ```
//!
//! Without `--config` the defaults apply; without `--target` the target is
//! uniform over the configured output sizes.

use std::path::PathBuf;

use anyhow::{Context, Result};
use candle_core::Device;
use clap::Parser;
use lhv_core::{JointDistribution, RunConfig};
use lhv_learn::{load_target, run_single_target};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "train-lhv")]
#[command(version)]
#[command(about = "Train a triangle hidden-variable network to reproduce a joint distribution")]
struct Cli {
    /// Run configuration (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Target distribution (JSON with `shape` and `probs`)
    #[arg(short, long)]
    target: Option<PathBuf>,

    /// Where to save the trained weights
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Where to write the evaluation report
    #[arg(short, long)]
    report: Option<PathBuf>,

    /// Resume from these weights, overriding `start_from` in the config
    #[arg(long)]
    start_from: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set subscriber")
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    let mut config = match &cli.config {
        Some(path) => RunConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {path:?}"))?,
        None => RunConfig::default(),
    };
    if let Some(path) = cli.start_from {
        config.training.start_from = Some(path);
    }

    let target = match &cli.target {
        Some(path) => {
            load_target(path).with_context(|| format!("Failed to load target from {path:?}"))?
        }
        None => JointDistribution::uniform(config.network.output_sizes())
            .context("Failed to build uniform target")?,
    };
    info!(shape = ?target.shape(), "target loaded");

    let outcome = run_single_target(config, &target, cli.output.as_deref(), &Device::Cpu)
        .context("Training run failed")?;

    if let Some(path) = &cli.report {
        outcome
            .evaluation
            .write_json(path)
            .with_context(|| format!("Failed to write report to {path:?}"))?;
        info!(path = %path.display(), "report written");
    }

    let evaluation = &outcome.evaluation;
    println!("\n=== Training Complete ===");
    println!("Optimizer:       {}", outcome.config.training.optimizer);
    println!("Steps:           {}", outcome.train.steps_completed);
    if let Some(loss) = evaluation.final_loss {
        println!("Final loss:      {loss:.6}");
    }
    if let Some(loss) = evaluation.validation_loss {
        println!("Validation loss: {loss:.6}");
    }
    println!("KL distance:     {:.6}", evaluation.kl_distance);
    println!("Euclidean:       {:.6}", evaluation.euclidean_distance);

    Ok(())
}
