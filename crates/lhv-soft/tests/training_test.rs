//! Integration tests for the training driver: end-to-end runs, optimizer
//! fallback, checkpoint resume and convergence.

use std::path::PathBuf;

use candle_core::{Device, Tensor};
use lhv_core::{
    JointDistribution, KernelRegularizer, LhvError, NetworkConfig, OptimizerKind, RunConfig,
    TrainConfig,
};
use lhv_soft::loss::{JointKlLoss, Loss};
use lhv_soft::training::{single_evaluation, single_run, Model};

fn small_run_config() -> RunConfig {
    RunConfig {
        network: NetworkConfig {
            inputsize: 3,
            greek_depth: 0,
            latin_depth: 1,
            latin_width: 4,
            a_outputsize: 2,
            b_outputsize: 2,
            c_outputsize: 2,
            ..NetworkConfig::default()
        },
        training: TrainConfig {
            batch_size: 128,
            batch_size_test: 512,
            no_of_batches: 5,
            no_of_validation_batches: 2,
            ..TrainConfig::default()
        },
    }
}

fn uniform_target() -> JointDistribution {
    JointDistribution::new([2, 2, 2], vec![0.125; 8]).unwrap()
}

fn temp_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "lhv_training_{name}_{:?}",
        std::thread::current().id()
    ));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

/// A loss identical to [`JointKlLoss`] saved under another name.
#[derive(Debug)]
struct RenamedLoss(JointKlLoss);

impl Loss for RenamedLoss {
    fn id(&self) -> &str {
        "renamed_joint_kl"
    }

    fn compute(&self, y_true: &Tensor, y_pred: &Tensor) -> Result<Tensor, LhvError> {
        self.0.compute(y_true, y_pred)
    }
}

/// Five steps on a uniform (2,2,2) target: every loss finite and
/// non-negative, evaluation a normalized distribution.
#[test]
fn end_to_end_uniform_target() {
    let mut config = small_run_config();
    let (model, report) = single_run(&mut config, &uniform_target(), &Device::Cpu).unwrap();

    assert_eq!(report.steps_completed, 5);
    for (step, loss) in report.loss_history.iter().enumerate() {
        assert!(loss.is_finite(), "step {step}: loss {loss}");
        assert!(*loss >= -1e-6, "step {step}: loss {loss}");
    }

    let joint = single_evaluation(&model, config.training.batch_size_test, 7).unwrap();
    assert_eq!(joint.len(), 8);
    let total: f32 = joint.iter().sum();
    assert!((total - 1.0).abs() < 1e-4, "evaluation sums to {total}");
    assert!(joint.iter().all(|p| *p >= 0.0));
}

/// An unsupported optimizer name falls back to SGD and the config records it.
#[test]
fn unknown_optimizer_falls_back_to_sgd() {
    let mut config = small_run_config();
    config.training.optimizer = "rmsprop".to_string();

    let (_, report) = single_run(&mut config, &uniform_target(), &Device::Cpu).unwrap();

    assert_eq!(report.optimizer, OptimizerKind::Sgd);
    let warning = report.optimizer_warning.expect("fallback should warn");
    assert!(warning.contains("rmsprop"));
    assert_eq!(config.training.optimizer, "sgd");
}

/// Saving and resuming through `start_from` preserves the learned weights.
#[test]
fn resume_from_checkpoint_preserves_evaluation() {
    let dir = temp_dir("resume");
    let weights = dir.join("model.safetensors");

    let mut config = small_run_config();
    config.training.no_of_batches = 10;
    let (trained, _) = single_run(&mut config, &uniform_target(), &Device::Cpu).unwrap();
    trained.save(&weights).unwrap();
    let before = single_evaluation(&trained, 512, 11).unwrap();

    let mut resumed_config = small_run_config();
    resumed_config.training.no_of_batches = 0;
    resumed_config.training.no_of_validation_batches = 0;
    resumed_config.training.start_from = Some(weights.clone());
    let (resumed, report) =
        single_run(&mut resumed_config, &uniform_target(), &Device::Cpu).unwrap();
    let after = single_evaluation(&resumed, 512, 11).unwrap();

    assert_eq!(report.steps_completed, 0);
    for (b, a) in before.iter().zip(&after) {
        assert!((b - a).abs() < 1e-6, "before {b} after {a}");
    }

    let _ = std::fs::remove_dir_all(&dir);
}

/// Resuming under a new regularizer and init scaling keeps the saved weights.
#[test]
fn resume_with_changed_regularizer() {
    let dir = temp_dir("resume_reg");
    let weights = dir.join("model.safetensors");

    let mut config = small_run_config();
    let (trained, _) = single_run(&mut config, &uniform_target(), &Device::Cpu).unwrap();
    trained.save(&weights).unwrap();
    let before = single_evaluation(&trained, 512, 11).unwrap();

    let mut resumed_config = small_run_config();
    resumed_config.network.kernel_reg = Some(KernelRegularizer::l2(1e-4));
    resumed_config.network.weight_init_scaling = 2.0;
    resumed_config.training.no_of_batches = 0;
    resumed_config.training.no_of_validation_batches = 0;
    resumed_config.training.start_from = Some(weights.clone());
    let (resumed, _) = single_run(&mut resumed_config, &uniform_target(), &Device::Cpu).unwrap();
    let after = single_evaluation(&resumed, 512, 11).unwrap();

    for (b, a) in before.iter().zip(&after) {
        assert!((b - a).abs() < 1e-6, "before {b} after {a}");
    }

    let _ = std::fs::remove_dir_all(&dir);
}

/// Weights saved under one loss identifier do not load under another.
#[test]
fn loading_with_other_loss_id_fails() {
    let dir = temp_dir("loss_id");
    let weights = dir.join("model.safetensors");

    let config = small_run_config();
    let sizes = config.network.output_sizes();
    let model = Model::build(&config.network, JointKlLoss::new(sizes), 1, &Device::Cpu).unwrap();
    model.save(&weights).unwrap();

    let err = Model::load(
        &config.network,
        RenamedLoss(JointKlLoss::new(sizes)),
        &weights,
        &Device::Cpu,
    )
    .unwrap_err();
    assert!(matches!(err, LhvError::Checkpoint { .. }));

    let _ = std::fs::remove_dir_all(&dir);
}

/// A missing `start_from` checkpoint is fatal, not a silent fresh start.
#[test]
fn missing_start_from_is_an_error() {
    let mut config = small_run_config();
    config.training.start_from = Some(temp_dir("missing").join("absent.safetensors"));
    let err = single_run(&mut config, &uniform_target(), &Device::Cpu).unwrap_err();
    assert!(matches!(err, LhvError::Checkpoint { .. }));
}

/// An `inputsize` other than three is rejected before anything is built.
#[test]
fn wrong_inputsize_fails_fast() {
    let mut config = small_run_config();
    config.network.inputsize = 4;
    let err = single_run(&mut config, &uniform_target(), &Device::Cpu).unwrap_err();
    assert!(matches!(err, LhvError::InvalidConfig { .. }));
}

/// SGD pulls the estimate toward a skewed product distribution.
#[test]
fn sgd_training_reduces_loss() {
    let marginal = [0.8f32, 0.2];
    let mut probs = Vec::with_capacity(8);
    for a in marginal {
        for b in marginal {
            for c in marginal {
                probs.push(a * b * c);
            }
        }
    }
    let target = JointDistribution::new([2, 2, 2], probs).unwrap();

    let mut config = small_run_config();
    config.training = TrainConfig {
        batch_size: 256,
        no_of_batches: 60,
        no_of_validation_batches: 0,
        optimizer: "sgd".to_string(),
        lr: 0.5,
        momentum: 0.25,
        decay: 0.0,
        ..config.training
    };

    let (_, report) = single_run(&mut config, &target, &Device::Cpu).unwrap();

    let early_avg: f32 = report.loss_history[..5].iter().sum::<f32>() / 5.0;
    let late_avg: f32 = report.loss_history[55..].iter().sum::<f32>() / 5.0;
    assert!(
        late_avg < early_avg,
        "loss should decrease: early_avg={early_avg}, late_avg={late_avg}"
    );
}
