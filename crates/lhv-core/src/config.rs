//! Run configuration.
//!
//! Network shape and training schedule are plain `serde` structs so a
//! whole run can be described by one JSON file. Every field has a
//! default; a file only needs to name what it overrides.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::LhvError;
use crate::PARTY_COUNT;

/// Element-wise activation applied after a fully-connected layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    Relu,
    Elu,
    Tanh,
    Sigmoid,
    Gelu,
    /// Identity.
    Linear,
    /// Normalizes the last axis into a probability vector.
    Softmax,
}

/// Penalty added to the loss for every kernel matrix:
/// `l1 * sum(|W|) + l2 * sum(W^2)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KernelRegularizer {
    #[serde(default)]
    pub l1: f64,
    #[serde(default)]
    pub l2: f64,
}

impl KernelRegularizer {
    /// Pure L2 penalty.
    pub fn l2(factor: f64) -> Self {
        Self { l1: 0.0, l2: factor }
    }

    /// True when neither term contributes.
    pub fn is_zero(&self) -> bool {
        self.l1 == 0.0 && self.l2 == 0.0
    }
}

/// Shape of the three-party network.
///
/// # Example
///
/// ```
/// use lhv_core::NetworkConfig;
///
/// let config = NetworkConfig::default();
/// config.validate().unwrap();
/// assert_eq!(config.joint_len(), 64);
/// assert_eq!(config.party_sources[0], vec![1, 2]);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Number of hidden variables (alpha, beta, gamma).
    pub inputsize: usize,

    /// Fully-connected layers applied to each hidden variable on its own
    /// before routing. Zero means the variable is passed through.
    pub greek_depth: usize,
    pub greek_width: usize,

    /// Fully-connected layers in each party's tower.
    pub latin_depth: usize,
    pub latin_width: usize,

    /// Hidden-layer activation.
    pub activ: Activation,
    /// Output-layer activation; must yield probability vectors.
    pub activ2: Activation,

    pub kernel_reg: Option<KernelRegularizer>,

    /// Scale of the fan-in variance-scaling initializer used by the
    /// party towers. Larger outputs per party often need a larger scale.
    pub weight_init_scaling: f64,

    pub a_outputsize: usize,
    pub b_outputsize: usize,
    pub c_outputsize: usize,

    /// Hidden variables fed to Alice, Bob and Charlie, in that order.
    /// Party `p` may never see variable `p`.
    pub party_sources: [Vec<usize>; PARTY_COUNT],
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            inputsize: 3,
            greek_depth: 0,
            greek_width: 1,
            latin_depth: 3,
            latin_width: 30,
            activ: Activation::Relu,
            activ2: Activation::Softmax,
            kernel_reg: None,
            weight_init_scaling: 1.0,
            a_outputsize: 4,
            b_outputsize: 4,
            c_outputsize: 4,
            party_sources: triangle_sources(),
        }
    }
}

/// Triangle routing: each party sees the two sources it is not opposite to.
pub fn triangle_sources() -> [Vec<usize>; PARTY_COUNT] {
    [vec![1, 2], vec![2, 0], vec![0, 1]]
}

impl NetworkConfig {
    /// Output sizes of Alice, Bob and Charlie.
    pub fn output_sizes(&self) -> [usize; PARTY_COUNT] {
        [self.a_outputsize, self.b_outputsize, self.c_outputsize]
    }

    /// Width of the concatenated network output.
    pub fn concat_len(&self) -> usize {
        self.output_sizes().iter().sum()
    }

    /// Number of entries in the flattened joint distribution.
    pub fn joint_len(&self) -> usize {
        self.output_sizes().iter().product()
    }

    /// Width of one pre-processed hidden-variable group.
    pub fn group_width(&self) -> usize {
        if self.greek_depth == 0 {
            1
        } else {
            self.greek_width
        }
    }

    /// True when `other` builds the same weight set with the same routing
    /// and activations. Regularizer and init scaling only matter before
    /// weights exist, so they are ignored.
    pub fn same_architecture(&self, other: &NetworkConfig) -> bool {
        self.inputsize == other.inputsize
            && self.greek_depth == other.greek_depth
            && self.group_width() == other.group_width()
            && self.latin_depth == other.latin_depth
            && self.latin_width == other.latin_width
            && self.activ == other.activ
            && self.activ2 == other.activ2
            && self.output_sizes() == other.output_sizes()
            && self.party_sources == other.party_sources
    }

    /// Checks every structural precondition of the network.
    ///
    /// # Errors
    ///
    /// Returns [`LhvError::InvalidConfig`] when `inputsize` is not 3, a
    /// width or output size is zero, or the routing is malformed.
    pub fn validate(&self) -> Result<(), LhvError> {
        if self.inputsize != PARTY_COUNT {
            return Err(LhvError::config(format!(
                "inputsize must be {PARTY_COUNT} (one hidden variable per party), got {}",
                self.inputsize
            )));
        }
        if self.greek_depth > 0 && self.greek_width == 0 {
            return Err(LhvError::config("greek_width must be positive"));
        }
        if self.latin_depth > 0 && self.latin_width == 0 {
            return Err(LhvError::config("latin_width must be positive"));
        }
        if self.output_sizes().contains(&0) {
            return Err(LhvError::config(format!(
                "output sizes must be positive, got {:?}",
                self.output_sizes()
            )));
        }
        if !(self.weight_init_scaling > 0.0) {
            return Err(LhvError::config(format!(
                "weight_init_scaling must be positive, got {}",
                self.weight_init_scaling
            )));
        }
        for (party, sources) in self.party_sources.iter().enumerate() {
            if sources.is_empty() {
                return Err(LhvError::config(format!(
                    "party {party} receives no hidden variables"
                )));
            }
            for &source in sources {
                if source >= self.inputsize {
                    return Err(LhvError::config(format!(
                        "party {party} routed to hidden variable {source}, only {} exist",
                        self.inputsize
                    )));
                }
                if source == party {
                    return Err(LhvError::config(format!(
                        "party {party} may not see its own hidden variable"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Optimizers the trainer knows how to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimizerKind {
    Adadelta,
    /// SGD with Nesterov momentum.
    Sgd,
}

impl OptimizerKind {
    /// Case-insensitive lookup; `None` for anything unsupported.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "adadelta" => Some(Self::Adadelta),
            "sgd" => Some(Self::Sgd),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Adadelta => "adadelta",
            Self::Sgd => "sgd",
        }
    }
}

/// Training schedule and optimizer settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    pub batch_size: usize,
    /// Batch size of the single evaluation pass.
    pub batch_size_test: usize,
    pub no_of_batches: usize,
    pub no_of_validation_batches: usize,

    /// Optimizer name, see [`OptimizerKind`].
    pub optimizer: String,
    pub lr: f64,
    /// Time-based learning-rate decay: `lr / (1 + decay * step)`.
    pub decay: f64,
    pub momentum: f64,

    /// Checkpoint to resume from.
    pub start_from: Option<PathBuf>,

    pub seed: u64,

    /// Capacity of the prefetch queue; 0 samples on the training thread.
    pub max_queue_size: usize,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            batch_size: 6000,
            batch_size_test: 6000,
            no_of_batches: 5000,
            no_of_validation_batches: 100,
            optimizer: "adadelta".to_string(),
            lr: 0.5,
            decay: 0.001,
            momentum: 0.25,
            start_from: None,
            seed: 42,
            max_queue_size: 10,
        }
    }
}

impl TrainConfig {
    /// Resolves the optimizer name, falling back to SGD.
    ///
    /// When the name is not recognized the field is rewritten to `"sgd"`
    /// so anything reading the config afterwards sees what actually ran,
    /// and the warning text is returned for the caller to report.
    ///
    /// # Example
    ///
    /// ```
    /// use lhv_core::{OptimizerKind, TrainConfig};
    ///
    /// let mut config = TrainConfig { optimizer: "rmsprop".into(), ..TrainConfig::default() };
    /// let (kind, warning) = config.normalize_optimizer();
    /// assert_eq!(kind, OptimizerKind::Sgd);
    /// assert!(warning.is_some());
    /// assert_eq!(config.optimizer, "sgd");
    /// ```
    pub fn normalize_optimizer(&mut self) -> (OptimizerKind, Option<String>) {
        match OptimizerKind::from_name(&self.optimizer) {
            Some(kind) => (kind, None),
            None => {
                let warning = format!(
                    "optimizer '{}' not recognized, using sgd instead",
                    self.optimizer
                );
                self.optimizer = OptimizerKind::Sgd.name().to_string();
                (OptimizerKind::Sgd, Some(warning))
            }
        }
    }

    /// # Errors
    ///
    /// Returns [`LhvError::InvalidConfig`] for zero batch sizes or a
    /// non-positive learning rate.
    pub fn validate(&self) -> Result<(), LhvError> {
        if self.batch_size == 0 || self.batch_size_test == 0 {
            return Err(LhvError::config("batch sizes must be positive"));
        }
        if !(self.lr > 0.0) {
            return Err(LhvError::config(format!(
                "learning rate must be positive, got {}",
                self.lr
            )));
        }
        if self.decay < 0.0 || self.momentum < 0.0 {
            return Err(LhvError::config("decay and momentum must be non-negative"));
        }
        Ok(())
    }
}

/// Everything needed for one training run on one target.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub network: NetworkConfig,
    pub training: TrainConfig,
}

impl RunConfig {
    /// Reads a JSON run file.
    ///
    /// # Errors
    ///
    /// Returns [`LhvError::Io`] if the file cannot be read and
    /// [`LhvError::InvalidConfig`] if it does not parse.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, LhvError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| LhvError::Io {
            context: format!("reading {}", path.display()),
            source,
        })?;
        serde_json::from_str(&text)
            .map_err(|e| LhvError::config(format!("parsing {}: {e}", path.display())))
    }

    /// Writes the config as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns [`LhvError::Io`] on write failure.
    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<(), LhvError> {
        let path = path.as_ref();
        let text = serde_json::to_string_pretty(self).map_err(|e| LhvError::Internal {
            message: format!("serializing run config: {e}"),
        })?;
        std::fs::write(path, text).map_err(|source| LhvError::Io {
            context: format!("writing {}", path.display()),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), LhvError> {
        self.network.validate()?;
        self.training.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_network_is_valid_triangle() {
        let config = NetworkConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.output_sizes(), [4, 4, 4]);
        assert_eq!(config.concat_len(), 12);
    }

    #[test]
    fn inputsize_other_than_three_rejected() {
        let config = NetworkConfig {
            inputsize: 4,
            ..NetworkConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(LhvError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn self_routing_rejected() {
        let mut config = NetworkConfig::default();
        config.party_sources[1] = vec![1, 2];
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("its own hidden variable"));
    }

    #[test]
    fn out_of_range_source_rejected() {
        let mut config = NetworkConfig::default();
        config.party_sources[0] = vec![1, 3];
        assert!(config.validate().is_err());
    }

    #[test]
    fn single_source_routing_allowed() {
        let mut config = NetworkConfig::default();
        config.party_sources = [vec![1], vec![2], vec![0]];
        assert!(config.validate().is_ok());
    }

    #[test]
    fn group_width_tracks_greek_depth() {
        let mut config = NetworkConfig::default();
        assert_eq!(config.group_width(), 1);
        config.greek_depth = 2;
        config.greek_width = 5;
        assert_eq!(config.group_width(), 5);
    }

    #[test]
    fn architecture_ignores_training_only_fields() {
        let base = NetworkConfig::default();

        let retuned = NetworkConfig {
            kernel_reg: Some(KernelRegularizer::l2(1e-4)),
            weight_init_scaling: 2.0,
            // Unused while greek_depth is zero.
            greek_width: 9,
            ..base.clone()
        };
        assert!(base.same_architecture(&retuned));

        let wider = NetworkConfig {
            latin_width: base.latin_width + 1,
            ..base.clone()
        };
        assert!(!base.same_architecture(&wider));

        let rerouted = NetworkConfig {
            party_sources: [vec![1], vec![2], vec![0]],
            ..base.clone()
        };
        assert!(!base.same_architecture(&rerouted));

        let tanh = NetworkConfig {
            activ: Activation::Tanh,
            ..base.clone()
        };
        assert!(!base.same_architecture(&tanh));
    }

    #[test]
    fn known_optimizers_left_untouched() {
        let mut config = TrainConfig {
            optimizer: "AdaDelta".to_string(),
            ..TrainConfig::default()
        };
        let (kind, warning) = config.normalize_optimizer();
        assert_eq!(kind, OptimizerKind::Adadelta);
        assert!(warning.is_none());
        assert_eq!(config.optimizer, "AdaDelta");
    }

    #[test]
    fn unknown_optimizer_falls_back_to_sgd() {
        let mut config = TrainConfig {
            optimizer: "rmsprop".to_string(),
            ..TrainConfig::default()
        };
        let (kind, warning) = config.normalize_optimizer();
        assert_eq!(kind, OptimizerKind::Sgd);
        assert!(warning.unwrap().contains("rmsprop"));
        assert_eq!(config.optimizer, "sgd");
    }

    #[test]
    fn partial_json_fills_defaults() {
        let json = r#"{"network": {"latin_width": 8, "activ": "tanh"}, "training": {"optimizer": "sgd"}}"#;
        let config: RunConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.network.latin_width, 8);
        assert_eq!(config.network.activ, Activation::Tanh);
        assert_eq!(config.network.latin_depth, 3);
        assert_eq!(config.training.optimizer, "sgd");
        assert_eq!(config.training.batch_size, 6000);
    }

    #[test]
    fn run_config_file_roundtrip() {
        let tid = std::thread::current().id();
        let path = std::env::temp_dir().join(format!("lhv_run_config_{tid:?}.json"));
        let mut config = RunConfig::default();
        config.network.kernel_reg = Some(KernelRegularizer::l2(1e-4));
        config.training.start_from = Some(PathBuf::from("weights.safetensors"));

        config.to_file(&path).unwrap();
        let loaded = RunConfig::from_file(&path).unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(loaded, config);
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = RunConfig::from_file("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, LhvError::Io { .. }));
    }

    #[test]
    fn zero_batch_rejected() {
        let config = TrainConfig {
            batch_size: 0,
            ..TrainConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
