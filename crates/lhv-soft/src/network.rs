//! The three-party hidden-variable network.
//!
//! Architecture, for the default triangle routing:
//!
//! ```text
//! input [N, 3] ─┬─ alpha ─ greek MLP ─┐
//!               ├─ beta  ─ greek MLP ─┼─ route ─┬─ (beta, gamma)  ─ Alice tower   ─ softmax(A) ─┐
//!               └─ gamma ─ greek MLP ─┘         ├─ (gamma, alpha) ─ Bob tower     ─ softmax(B) ─┼─ concat [N, A+B+C]
//!                                               └─ (alpha, beta)  ─ Charlie tower ─ softmax(C) ─┘
//! ```
//!
//! No weights are shared: each hidden variable has its own greek MLP and
//! each party its own tower and output head.

use candle_core::{DType, Device, Tensor, Var};
use candle_nn::{Init, Linear, Module, VarBuilder, VarMap};
use lhv_core::{Activation, KernelRegularizer, LhvError, NetworkConfig, PARTY_COUNT, PARTY_NAMES};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::activation;
use crate::init::KernelInit;

const HIDDEN_VARIABLE_NAMES: [&str; PARTY_COUNT] = ["alpha", "beta", "gamma"];

/// A fully-connected layer plus its activation.
struct Dense {
    linear: Linear,
    kernel: Tensor,
    activation: Activation,
}

impl Dense {
    fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        activation::apply(self.activation, &self.linear.forward(xs)?)
    }
}

/// Everything [`Dense`] construction needs besides the layer shape.
struct LayerFactory<'a> {
    var_map: &'a VarMap,
    vb: VarBuilder<'a>,
    rng: StdRng,
    device: Device,
}

impl LayerFactory<'_> {
    fn dense(
        &mut self,
        name: &str,
        in_dim: usize,
        out_dim: usize,
        init: KernelInit,
        activation: Activation,
    ) -> Result<Dense, LhvError> {
        let map_err = |e: candle_core::Error| LhvError::Internal {
            message: format!("TriangleNetwork layer {name}: {e}"),
        };

        let data = init.sample(in_dim, out_dim, &mut self.rng);
        let kernel = Var::from_vec(data, (out_dim, in_dim), &self.device).map_err(map_err)?;
        self.var_map
            .data()
            .lock()
            .map_err(|_| LhvError::Internal {
                message: "TriangleNetwork: VarMap lock poisoned".to_string(),
            })?
            .insert(format!("{name}.weight"), kernel.clone());

        let bias = self
            .vb
            .pp(name)
            .get_with_hints(out_dim, "bias", Init::Const(0.0))
            .map_err(map_err)?;

        let kernel = kernel.as_tensor().clone();
        Ok(Dense {
            linear: Linear::new(kernel.clone(), Some(bias)),
            kernel,
            activation,
        })
    }
}

/// Hidden-variable network producing concatenated per-party distributions.
///
/// # Example
///
/// ```
/// use candle_core::{Device, Tensor};
/// use candle_nn::VarMap;
/// use lhv_core::NetworkConfig;
/// use lhv_soft::network::TriangleNetwork;
///
/// let device = Device::Cpu;
/// let var_map = VarMap::new();
/// let config = NetworkConfig { latin_depth: 1, latin_width: 4, ..NetworkConfig::default() };
/// let net = TriangleNetwork::new_trainable(&var_map, &config, 0, &device).unwrap();
///
/// let input = Tensor::zeros((5, 3), candle_core::DType::F32, &device).unwrap();
/// let out = net.forward(&input).unwrap();
/// assert_eq!(out.dims(), &[5, 12]);
/// ```
pub struct TriangleNetwork {
    greek: Vec<Vec<Dense>>,
    towers: Vec<Vec<Dense>>,
    heads: Vec<Dense>,
    config: NetworkConfig,
    device: Device,
}

impl std::fmt::Debug for TriangleNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "TriangleNetwork(greek {}x{}, latin {}x{}, outputs {:?}, {} params, device={:?})",
            self.config.greek_depth,
            self.config.greek_width,
            self.config.latin_depth,
            self.config.latin_width,
            self.config.output_sizes(),
            self.param_count(),
            self.device
        )
    }
}

impl TriangleNetwork {
    /// Creates a trainable network whose parameters live in `var_map`.
    ///
    /// Parameter names are stable (`greek_alpha.layer_0.weight`,
    /// `party_bob.out.bias`, ...) so a checkpoint saved from one network
    /// loads into another built from the same config.
    ///
    /// # Errors
    ///
    /// Returns [`LhvError::InvalidConfig`] if the config fails
    /// [`NetworkConfig::validate`], [`LhvError::Internal`] if parameter
    /// creation fails.
    pub fn new_trainable(
        var_map: &VarMap,
        config: &NetworkConfig,
        seed: u64,
        device: &Device,
    ) -> Result<Self, LhvError> {
        config.validate()?;

        let mut factory = LayerFactory {
            var_map,
            vb: VarBuilder::from_varmap(var_map, DType::F32, device),
            rng: StdRng::seed_from_u64(seed),
            device: device.clone(),
        };

        let mut greek = Vec::with_capacity(config.inputsize);
        for source_name in HIDDEN_VARIABLE_NAMES {
            let mut layers = Vec::with_capacity(config.greek_depth);
            let mut width = 1;
            for depth in 0..config.greek_depth {
                layers.push(factory.dense(
                    &format!("greek_{source_name}.layer_{depth}"),
                    width,
                    config.greek_width,
                    KernelInit::GlorotUniform,
                    config.activ,
                )?);
                width = config.greek_width;
            }
            greek.push(layers);
        }

        let tower_init = KernelInit::VarianceScaling {
            scale: config.weight_init_scaling,
        };
        let mut towers = Vec::with_capacity(PARTY_COUNT);
        let mut heads = Vec::with_capacity(PARTY_COUNT);
        for (party, party_name) in PARTY_NAMES.iter().enumerate() {
            let mut width = config.party_sources[party].len() * config.group_width();
            let mut layers = Vec::with_capacity(config.latin_depth);
            for depth in 0..config.latin_depth {
                layers.push(factory.dense(
                    &format!("party_{party_name}.layer_{depth}"),
                    width,
                    config.latin_width,
                    tower_init,
                    config.activ,
                )?);
                width = config.latin_width;
            }
            towers.push(layers);
            heads.push(factory.dense(
                &format!("party_{party_name}.out"),
                width,
                config.output_sizes()[party],
                KernelInit::GlorotUniform,
                config.activ2,
            )?);
        }

        Ok(Self {
            greek,
            towers,
            heads,
            config: config.clone(),
            device: device.clone(),
        })
    }

    /// Per-party output distributions, Alice first.
    ///
    /// Input shape: `[N, inputsize]`. Output: three tensors of shape
    /// `[N, a_outputsize]`, `[N, b_outputsize]`, `[N, c_outputsize]`.
    ///
    /// # Errors
    ///
    /// Returns [`LhvError::ShapeMismatch`] if the input is not
    /// `[N, inputsize]`, [`LhvError::Internal`] on tensor failures.
    pub fn forward_parties(&self, input: &Tensor) -> Result<Vec<Tensor>, LhvError> {
        let map_err = |e: candle_core::Error| LhvError::Internal {
            message: format!("TriangleNetwork forward: {e}"),
        };

        let (_, width) = input.dims2().map_err(map_err)?;
        if width != self.config.inputsize {
            return Err(LhvError::ShapeMismatch {
                context: "TriangleNetwork input width".to_string(),
                expected: self.config.inputsize,
                got: width,
            });
        }

        let mut groups = Vec::with_capacity(self.greek.len());
        for (source, layers) in self.greek.iter().enumerate() {
            let mut h = input
                .narrow(1, source, 1)
                .and_then(|t| t.contiguous())
                .map_err(map_err)?;
            for layer in layers {
                h = layer.forward(&h).map_err(map_err)?;
            }
            groups.push(h);
        }

        let mut outputs = Vec::with_capacity(PARTY_COUNT);
        for party in 0..PARTY_COUNT {
            let routed: Vec<&Tensor> = self.config.party_sources[party]
                .iter()
                .map(|&source| &groups[source])
                .collect();
            let mut h = Tensor::cat(&routed, 1).map_err(map_err)?;
            for layer in &self.towers[party] {
                h = layer.forward(&h).map_err(map_err)?;
            }
            outputs.push(self.heads[party].forward(&h).map_err(map_err)?);
        }
        Ok(outputs)
    }

    /// Batched forward pass producing the concatenated prediction
    /// `[N, a_outputsize + b_outputsize + c_outputsize]`.
    ///
    /// # Errors
    ///
    /// See [`TriangleNetwork::forward_parties`].
    pub fn forward(&self, input: &Tensor) -> Result<Tensor, LhvError> {
        let parties = self.forward_parties(input)?;
        Tensor::cat(&parties, 1).map_err(|e| LhvError::Internal {
            message: format!("TriangleNetwork concat: {e}"),
        })
    }

    /// Kernel penalty `l1 * sum|W| + l2 * sum W^2` over every layer, as a
    /// scalar tensor that participates in backprop.
    ///
    /// # Errors
    ///
    /// Returns [`LhvError::Internal`] on tensor failures.
    pub fn regularization(&self, reg: &KernelRegularizer) -> Result<Tensor, LhvError> {
        let map_err = |e: candle_core::Error| LhvError::Internal {
            message: format!("TriangleNetwork regularization: {e}"),
        };

        let mut total = Tensor::new(0.0f32, &self.device).map_err(map_err)?;
        for kernel in self.kernels() {
            if reg.l1 != 0.0 {
                let l1 = kernel.abs().and_then(|k| k.sum_all()).map_err(map_err)?;
                total = (total + l1.affine(reg.l1, 0.0).map_err(map_err)?).map_err(map_err)?;
            }
            if reg.l2 != 0.0 {
                let l2 = kernel.sqr().and_then(|k| k.sum_all()).map_err(map_err)?;
                total = (total + l2.affine(reg.l2, 0.0).map_err(map_err)?).map_err(map_err)?;
            }
        }
        Ok(total)
    }

    fn layers(&self) -> impl Iterator<Item = &Dense> {
        self.greek
            .iter()
            .flatten()
            .chain(self.towers.iter().flatten())
            .chain(self.heads.iter())
    }

    fn kernels(&self) -> impl Iterator<Item = &Tensor> {
        self.layers().map(|layer| &layer.kernel)
    }

    /// Total number of weights and biases.
    pub fn param_count(&self) -> usize {
        self.layers()
            .map(|layer| {
                layer.kernel.elem_count()
                    + layer.linear.bias().map(|b| b.elem_count()).unwrap_or(0)
            })
            .sum()
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    pub fn device(&self) -> &Device {
        &self.device
    }
}
