//! One training run against one target distribution.
//!
//! ## Algorithm
//!
//! 1. Validate the run config and check the target shape against the
//!    network's output sizes.
//! 2. Build a fresh [`Model`], or load one from `start_from`.
//! 3. Resolve the optimizer name (unknown names fall back to SGD).
//! 4. `no_of_batches` training steps: sample, forward, joint KL loss plus
//!    kernel penalty, backward, update.
//! 5. `no_of_validation_batches` forward-only passes for a mean
//!    validation loss.
//!
//! Training, validation and evaluation draw from separate streams seeded
//! from `seed + 1`, `seed + 2` and the caller's evaluation seed; `seed`
//! itself initializes the weights.

use candle_core::{Device, Tensor};
use lhv_core::{JointDistribution, LhvError, OptimizerKind, RunConfig};

use crate::loss::{JointKlLoss, Loss};
use crate::optim::TrainOptimizer;
use crate::sampler::{prefetch, HiddenVariableSampler};
use crate::training::model::Model;

type BatchStream = Box<dyn Iterator<Item = Result<(Tensor, Tensor), LhvError>>>;

/// What happened during [`single_run`].
#[derive(Debug, Clone)]
pub struct TrainReport {
    /// Optimizer that actually ran.
    pub optimizer: OptimizerKind,

    /// Set when the configured optimizer name was not recognized.
    pub optimizer_warning: Option<String>,

    /// Joint KL loss per training step, before the kernel penalty.
    pub loss_history: Vec<f32>,

    /// Value the optimizer minimized per step: the joint KL loss plus the
    /// kernel penalty. Equal to `loss_history` without a regularizer.
    pub objective_history: Vec<f32>,

    /// Mean loss over the validation batches, if any ran.
    pub validation_loss: Option<f32>,

    pub steps_completed: usize,
}

impl TrainReport {
    /// Last training loss, or NaN if no step ran.
    pub fn final_loss(&self) -> f32 {
        self.loss_history.last().copied().unwrap_or(f32::NAN)
    }
}

/// `count` labeled batches, prefetched on a worker thread when
/// `queue_size > 0`.
fn labeled_batches(
    sampler: &HiddenVariableSampler,
    target: &JointDistribution,
    seed: u64,
    count: usize,
    queue_size: usize,
) -> Result<BatchStream, LhvError> {
    let stream = sampler.labeled(target, seed)?.take(count);
    Ok(if queue_size > 0 {
        Box::new(prefetch(stream, queue_size))
    } else {
        Box::new(stream)
    })
}

/// Trains a model to reproduce `target`.
///
/// `config` is updated in place when the optimizer falls back to SGD, so
/// the caller's copy records what ran.
///
/// # Errors
///
/// Returns [`LhvError::InvalidConfig`] for an invalid run config,
/// [`LhvError::InvalidDistribution`] if `target` does not have the
/// network's output shape, [`LhvError::Checkpoint`] if `start_from`
/// cannot be loaded, and [`LhvError::Internal`] on tensor failures.
///
/// # Example
///
/// ```
/// use candle_core::Device;
/// use lhv_core::{JointDistribution, NetworkConfig, RunConfig, TrainConfig};
/// use lhv_soft::training::single_run;
///
/// let mut config = RunConfig {
///     network: NetworkConfig { latin_depth: 1, latin_width: 4, ..NetworkConfig::default() },
///     training: TrainConfig {
///         batch_size: 64,
///         no_of_batches: 3,
///         no_of_validation_batches: 1,
///         max_queue_size: 0,
///         ..TrainConfig::default()
///     },
/// };
/// let target = JointDistribution::uniform([4, 4, 4]).unwrap();
/// let (_model, report) = single_run(&mut config, &target, &Device::Cpu).unwrap();
/// assert_eq!(report.loss_history.len(), 3);
/// ```
pub fn single_run(
    config: &mut RunConfig,
    target: &JointDistribution,
    device: &Device,
) -> Result<(Model, TrainReport), LhvError> {
    config.validate()?;
    let sizes = config.network.output_sizes();
    if target.shape() != sizes {
        return Err(LhvError::InvalidDistribution {
            message: format!(
                "target shape {:?} does not match network outputs {sizes:?}",
                target.shape()
            ),
        });
    }

    let map_err = |e: candle_core::Error| LhvError::Internal {
        message: format!("single_run: {e}"),
    };

    let loss = JointKlLoss::new(sizes);
    let model = match &config.training.start_from {
        Some(path) => {
            tracing::info!(path = %path.display(), "resuming from checkpoint");
            Model::load(&config.network, loss, path, device)?
        }
        None => Model::build(&config.network, loss, config.training.seed, device)?,
    };

    let (kind, optimizer_warning) = config.training.normalize_optimizer();
    if let Some(warning) = &optimizer_warning {
        tracing::warn!("{warning}");
    }
    let training = &config.training;
    let mut optimizer =
        TrainOptimizer::new(kind, model.context().var_map().all_vars(), training)?;

    let reg = config
        .network
        .kernel_reg
        .filter(|reg| !reg.is_zero());
    let sampler =
        HiddenVariableSampler::new(config.network.inputsize, training.batch_size, device)?;

    tracing::info!(
        optimizer = kind.name(),
        lr = training.lr,
        batch_size = training.batch_size,
        batches = training.no_of_batches,
        "training started"
    );

    let mut loss_history = Vec::with_capacity(training.no_of_batches);
    let mut objective_history = Vec::with_capacity(training.no_of_batches);
    let train_stream = labeled_batches(
        &sampler,
        target,
        training.seed.wrapping_add(1),
        training.no_of_batches,
        training.max_queue_size,
    )?;
    for (step, batch) in train_stream.enumerate() {
        let (x, y) = batch?;
        let pred = model.network().forward(&x)?;
        let kl = model.loss().compute(&y, &pred)?;
        let kl_val = kl.to_vec0::<f32>().map_err(map_err)?;
        loss_history.push(kl_val);

        let objective = match &reg {
            Some(reg) => (&kl + model.network().regularization(reg)?).map_err(map_err)?,
            None => kl,
        };
        let objective_val = objective.to_vec0::<f32>().map_err(map_err)?;
        objective_history.push(objective_val);

        let lr = optimizer.effective_learning_rate();
        optimizer.backward_step(&objective)?;
        tracing::debug!(step, loss = kl_val, objective = objective_val, lr, "train step");
    }

    let mut validation_total = 0.0f64;
    let mut validation_batches = 0usize;
    let validation_stream = labeled_batches(
        &sampler,
        target,
        training.seed.wrapping_add(2),
        training.no_of_validation_batches,
        training.max_queue_size,
    )?;
    for batch in validation_stream {
        let (x, y) = batch?;
        let pred = model.network().forward(&x)?;
        let value = model
            .loss()
            .compute(&y, &pred)?
            .to_vec0::<f32>()
            .map_err(map_err)?;
        validation_total += value as f64;
        validation_batches += 1;
    }
    let validation_loss =
        (validation_batches > 0).then(|| (validation_total / validation_batches as f64) as f32);

    let report = TrainReport {
        optimizer: kind,
        optimizer_warning,
        steps_completed: loss_history.len(),
        loss_history,
        objective_history,
        validation_loss,
    };
    tracing::info!(
        steps = report.steps_completed,
        final_loss = report.final_loss(),
        validation_loss = ?report.validation_loss,
        "training finished"
    );
    Ok((model, report))
}

/// Evaluates `model` on one batch of `batch_size_test` samples and returns
/// the flat estimated joint distribution.
///
/// # Errors
///
/// See [`Model::evaluate`].
pub fn single_evaluation<L: Loss>(
    model: &Model<L>,
    batch_size_test: usize,
    seed: u64,
) -> Result<Vec<f32>, LhvError> {
    model.evaluate(batch_size_test, seed)
}
