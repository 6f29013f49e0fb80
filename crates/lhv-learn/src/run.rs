//! One training run against one target, from files to report.

use std::path::Path;

use candle_core::Device;
use lhv_core::{JointDistribution, LhvError, RunConfig};
use lhv_soft::training::{single_evaluation, single_run, Model, TrainReport};

use crate::report::EvaluationReport;

/// Offset from the run seed used for the evaluation batch, keeping it
/// apart from the weight, training and validation streams.
pub const EVALUATION_SEED_OFFSET: u64 = 3;

/// Result of [`run_single_target`].
#[derive(Debug)]
pub struct RunOutcome {
    /// The config as it actually ran (optimizer name normalized).
    pub config: RunConfig,
    pub model: Model,
    pub train: TrainReport,
    pub evaluation: EvaluationReport,
}

/// Reads a target distribution from JSON (`{"shape": [..], "probs": [..]}`).
///
/// # Errors
///
/// Returns [`LhvError::Io`] if the file cannot be read and
/// [`LhvError::InvalidDistribution`] if it does not parse or validate.
pub fn load_target(path: &Path) -> Result<JointDistribution, LhvError> {
    let text = std::fs::read_to_string(path).map_err(|source| LhvError::Io {
        context: format!("reading {}", path.display()),
        source,
    })?;
    serde_json::from_str(&text).map_err(|e| LhvError::InvalidDistribution {
        message: format!("{}: {e}", path.display()),
    })
}

/// Trains on `target`, evaluates once, and saves the weights to
/// `checkpoint` when given.
///
/// # Errors
///
/// Propagates errors from training, evaluation and checkpointing.
///
/// # Example
///
/// ```
/// use candle_core::Device;
/// use lhv_core::{JointDistribution, NetworkConfig, RunConfig, TrainConfig};
/// use lhv_learn::run_single_target;
///
/// let config = RunConfig {
///     network: NetworkConfig { latin_depth: 1, latin_width: 4, ..NetworkConfig::default() },
///     training: TrainConfig {
///         batch_size: 32,
///         batch_size_test: 64,
///         no_of_batches: 2,
///         no_of_validation_batches: 0,
///         max_queue_size: 0,
///         ..TrainConfig::default()
///     },
/// };
/// let target = JointDistribution::uniform([4, 4, 4]).unwrap();
/// let outcome = run_single_target(config, &target, None, &Device::Cpu).unwrap();
/// assert_eq!(outcome.evaluation.distribution.len(), 64);
/// ```
pub fn run_single_target(
    mut config: RunConfig,
    target: &JointDistribution,
    checkpoint: Option<&Path>,
    device: &Device,
) -> Result<RunOutcome, LhvError> {
    let (model, train) = single_run(&mut config, target, device)?;

    let seed = config.training.seed.wrapping_add(EVALUATION_SEED_OFFSET);
    let distribution = single_evaluation(&model, config.training.batch_size_test, seed)?;
    let evaluation = EvaluationReport::new(target, distribution, &train)?;
    tracing::info!(
        kl = evaluation.kl_distance,
        euclidean = evaluation.euclidean_distance,
        "evaluated"
    );

    if let Some(path) = checkpoint {
        model.save(path)?;
    }

    Ok(RunOutcome {
        config,
        model,
        train,
        evaluation,
    })
}
