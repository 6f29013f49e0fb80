//! Trained model handle and the per-run context that owns its weights.

use std::path::Path;

use candle_core::Device;
use candle_nn::VarMap;
use lhv_core::{LhvError, NetworkConfig};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::checkpoint;
use crate::loss::{JointKlLoss, Loss};
use crate::network::TriangleNetwork;
use crate::sampler::HiddenVariableSampler;

/// All mutable state of one run: the variable store and its device.
///
/// A context is created per run and dropped with its [`Model`], so no
/// weights or optimizer state carry over between independent runs.
pub struct RunContext {
    var_map: VarMap,
    device: Device,
}

impl std::fmt::Debug for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "RunContext({} vars, device={:?})",
            self.var_map.all_vars().len(),
            self.device
        )
    }
}

impl RunContext {
    pub fn new(device: &Device) -> Self {
        Self {
            var_map: VarMap::new(),
            device: device.clone(),
        }
    }

    pub fn var_map(&self) -> &VarMap {
        &self.var_map
    }

    pub fn device(&self) -> &Device {
        &self.device
    }
}

/// A network bound to its run context and the loss it is trained with.
///
/// # Example
///
/// ```
/// use candle_core::Device;
/// use lhv_core::NetworkConfig;
/// use lhv_soft::loss::JointKlLoss;
/// use lhv_soft::training::Model;
///
/// let config = NetworkConfig { latin_depth: 1, latin_width: 4, ..NetworkConfig::default() };
/// let loss = JointKlLoss::new(config.output_sizes());
/// let model = Model::build(&config, loss, 0, &Device::Cpu).unwrap();
/// let joint = model.evaluate(32, 1).unwrap();
/// assert_eq!(joint.len(), 64);
/// ```
#[derive(Debug)]
pub struct Model<L: Loss = JointKlLoss> {
    context: RunContext,
    network: TriangleNetwork,
    loss: L,
}

impl<L: Loss> Model<L> {
    /// Builds a freshly initialized model in a new run context.
    ///
    /// # Errors
    ///
    /// Propagates [`TriangleNetwork::new_trainable`] errors.
    pub fn build(config: &NetworkConfig, loss: L, seed: u64, device: &Device) -> Result<Self, LhvError> {
        let context = RunContext::new(device);
        let network = TriangleNetwork::new_trainable(&context.var_map, config, seed, device)?;
        tracing::info!(network = ?network, loss = loss.id(), "built model");
        Ok(Self {
            context,
            network,
            loss,
        })
    }

    /// Builds a model from `config` and restores weights saved by
    /// [`Model::save`]. The checkpoint must have been saved with a loss
    /// whose identifier equals `loss.id()`.
    ///
    /// # Errors
    ///
    /// Returns [`LhvError::Checkpoint`] on a loss or architecture mismatch
    /// or unreadable weights.
    pub fn load(
        config: &NetworkConfig,
        loss: L,
        weights: &Path,
        device: &Device,
    ) -> Result<Self, LhvError> {
        let mut context = RunContext::new(device);
        let network = TriangleNetwork::new_trainable(&context.var_map, config, 0, device)?;
        checkpoint::load(&mut context.var_map, config, loss.id(), weights)?;
        Ok(Self {
            context,
            network,
            loss,
        })
    }

    /// Writes the weights and manifest to `weights`.
    ///
    /// # Errors
    ///
    /// See [`checkpoint::save`].
    pub fn save(&self, weights: &Path) -> Result<(), LhvError> {
        checkpoint::save(
            &self.context.var_map,
            self.network.config(),
            self.loss.id(),
            weights,
        )
    }

    /// Runs one evaluation batch of `batch_size` hidden-variable samples
    /// drawn from `seed` and returns the flattened estimated joint
    /// distribution, computed off-graph.
    ///
    /// # Errors
    ///
    /// Returns [`LhvError::InvalidConfig`] for a zero batch size and
    /// [`LhvError::Internal`] on tensor failures.
    pub fn evaluate(&self, batch_size: usize, seed: u64) -> Result<Vec<f32>, LhvError> {
        let map_err = |e: candle_core::Error| LhvError::Internal {
            message: format!("Model::evaluate: {e}"),
        };

        let config = self.network.config();
        let sampler = HiddenVariableSampler::new(config.inputsize, batch_size, self.device())?;
        let input = sampler.sample_batch(&mut StdRng::seed_from_u64(seed))?;
        let pred = self
            .network
            .forward(&input)?
            .flatten_all()
            .and_then(|t| t.to_vec1::<f32>())
            .map_err(map_err)?;
        lhv_core::joint::joint_distribution(&pred, batch_size, config.output_sizes())
    }

    pub fn network(&self) -> &TriangleNetwork {
        &self.network
    }

    pub fn loss(&self) -> &L {
        &self.loss
    }

    pub fn context(&self) -> &RunContext {
        &self.context
    }

    pub fn device(&self) -> &Device {
        &self.context.device
    }
}
