//! Optimizers for the hidden-variable trainer.
//!
//! Both implement [`candle_nn::Optimizer`] and share a time-based decay
//! schedule: the learning rate used at update `t` (counting from zero) is
//! `lr / (1 + decay * t)`.

use candle_core::backprop::GradStore;
use candle_core::{Tensor, Var};
use candle_nn::Optimizer;
use lhv_core::{LhvError, OptimizerKind, TrainConfig};

fn decayed(lr: f64, decay: f64, iterations: usize) -> f64 {
    lr / (1.0 + decay * iterations as f64)
}

/// Parameters for [`NesterovSgd`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamsNesterovSgd {
    pub lr: f64,
    pub momentum: f64,
    pub decay: f64,
}

impl Default for ParamsNesterovSgd {
    fn default() -> Self {
        Self {
            lr: 0.01,
            momentum: 0.0,
            decay: 0.0,
        }
    }
}

#[derive(Debug)]
struct VarVelocity {
    var: Var,
    velocity: Var,
}

/// Stochastic gradient descent with Nesterov momentum.
///
/// Per parameter: `v = m*v - lr*g`, then `w = w + m*v - lr*g`.
#[derive(Debug)]
pub struct NesterovSgd {
    vars: Vec<VarVelocity>,
    params: ParamsNesterovSgd,
    iterations: usize,
}

impl Optimizer for NesterovSgd {
    type Config = ParamsNesterovSgd;

    fn new(vars: Vec<Var>, params: ParamsNesterovSgd) -> candle_core::Result<Self> {
        let vars = vars
            .into_iter()
            .filter(|var| var.dtype().is_float())
            .map(|var| {
                let velocity = Var::zeros(var.shape(), var.dtype(), var.device())?;
                Ok(VarVelocity { var, velocity })
            })
            .collect::<candle_core::Result<Vec<_>>>()?;
        Ok(Self {
            vars,
            params,
            iterations: 0,
        })
    }

    fn learning_rate(&self) -> f64 {
        self.params.lr
    }

    fn set_learning_rate(&mut self, lr: f64) {
        self.params.lr = lr;
    }

    fn step(&mut self, grads: &GradStore) -> candle_core::Result<()> {
        let lr = decayed(self.params.lr, self.params.decay, self.iterations);
        let momentum = self.params.momentum;
        for VarVelocity { var, velocity } in &self.vars {
            let Some(grad) = grads.get(var) else {
                continue;
            };
            let scaled = grad.affine(lr, 0.0)?;
            let v = velocity.affine(momentum, 0.0)?.sub(&scaled)?;
            let update = v.affine(momentum, 0.0)?.sub(&scaled)?;
            var.set(&var.add(&update)?)?;
            velocity.set(&v)?;
        }
        self.iterations += 1;
        Ok(())
    }
}

/// Parameters for [`Adadelta`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamsAdadelta {
    pub lr: f64,
    pub rho: f64,
    pub eps: f64,
    pub decay: f64,
}

impl Default for ParamsAdadelta {
    fn default() -> Self {
        Self {
            lr: 1.0,
            rho: 0.95,
            eps: 1e-7,
            decay: 0.0,
        }
    }
}

#[derive(Debug)]
struct VarAdadelta {
    var: Var,
    accum_grad: Var,
    accum_update: Var,
}

/// Adadelta with a learning-rate multiplier.
#[derive(Debug)]
pub struct Adadelta {
    vars: Vec<VarAdadelta>,
    params: ParamsAdadelta,
    iterations: usize,
}

impl Optimizer for Adadelta {
    type Config = ParamsAdadelta;

    fn new(vars: Vec<Var>, params: ParamsAdadelta) -> candle_core::Result<Self> {
        let vars = vars
            .into_iter()
            .filter(|var| var.dtype().is_float())
            .map(|var| {
                let accum_grad = Var::zeros(var.shape(), var.dtype(), var.device())?;
                let accum_update = Var::zeros(var.shape(), var.dtype(), var.device())?;
                Ok(VarAdadelta {
                    var,
                    accum_grad,
                    accum_update,
                })
            })
            .collect::<candle_core::Result<Vec<_>>>()?;
        Ok(Self {
            vars,
            params,
            iterations: 0,
        })
    }

    fn learning_rate(&self) -> f64 {
        self.params.lr
    }

    fn set_learning_rate(&mut self, lr: f64) {
        self.params.lr = lr;
    }

    fn step(&mut self, grads: &GradStore) -> candle_core::Result<()> {
        let lr = decayed(self.params.lr, self.params.decay, self.iterations);
        let ParamsAdadelta { rho, eps, .. } = self.params;
        for slot in &self.vars {
            let Some(grad) = grads.get(&slot.var) else {
                continue;
            };
            let accum_grad = slot
                .accum_grad
                .affine(rho, 0.0)?
                .add(&grad.sqr()?.affine(1.0 - rho, 0.0)?)?;
            let update = slot
                .accum_update
                .affine(1.0, eps)?
                .sqrt()?
                .div(&accum_grad.affine(1.0, eps)?.sqrt()?)?
                .mul(grad)?;
            let accum_update = slot
                .accum_update
                .affine(rho, 0.0)?
                .add(&update.sqr()?.affine(1.0 - rho, 0.0)?)?;
            slot.var.set(&slot.var.sub(&update.affine(lr, 0.0)?)?)?;
            slot.accum_grad.set(&accum_grad)?;
            slot.accum_update.set(&accum_update)?;
        }
        self.iterations += 1;
        Ok(())
    }
}

/// The optimizer a training run was configured with.
#[derive(Debug)]
pub enum TrainOptimizer {
    Sgd(NesterovSgd),
    Adadelta(Adadelta),
}

impl TrainOptimizer {
    /// Builds the optimizer for `kind` from the run's learning rate, decay
    /// and momentum. Momentum only affects SGD.
    ///
    /// # Errors
    ///
    /// Returns [`LhvError::Internal`] if optimizer state cannot be allocated.
    pub fn new(kind: OptimizerKind, vars: Vec<Var>, config: &TrainConfig) -> Result<Self, LhvError> {
        let map_err = |e: candle_core::Error| LhvError::Internal {
            message: format!("TrainOptimizer::new: {e}"),
        };
        Ok(match kind {
            OptimizerKind::Sgd => Self::Sgd(
                NesterovSgd::new(
                    vars,
                    ParamsNesterovSgd {
                        lr: config.lr,
                        momentum: config.momentum,
                        decay: config.decay,
                    },
                )
                .map_err(map_err)?,
            ),
            OptimizerKind::Adadelta => Self::Adadelta(
                Adadelta::new(
                    vars,
                    ParamsAdadelta {
                        lr: config.lr,
                        decay: config.decay,
                        ..ParamsAdadelta::default()
                    },
                )
                .map_err(map_err)?,
            ),
        })
    }

    pub fn kind(&self) -> OptimizerKind {
        match self {
            Self::Sgd(_) => OptimizerKind::Sgd,
            Self::Adadelta(_) => OptimizerKind::Adadelta,
        }
    }

    /// Learning rate the next update will use, after decay.
    pub fn effective_learning_rate(&self) -> f64 {
        match self {
            Self::Sgd(opt) => decayed(opt.params.lr, opt.params.decay, opt.iterations),
            Self::Adadelta(opt) => decayed(opt.params.lr, opt.params.decay, opt.iterations),
        }
    }

    /// Backpropagates `loss` and applies one update.
    ///
    /// # Errors
    ///
    /// Returns [`LhvError::Internal`] on backprop or update failure.
    pub fn backward_step(&mut self, loss: &Tensor) -> Result<(), LhvError> {
        let result = match self {
            Self::Sgd(opt) => opt.backward_step(loss),
            Self::Adadelta(opt) => opt.backward_step(loss),
        };
        result.map_err(|e| LhvError::Internal {
            message: format!("optimizer step: {e}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    fn quadratic(x: &Var) -> Tensor {
        x.as_tensor().sqr().unwrap().sum_all().unwrap()
    }

    fn value(x: &Var) -> f32 {
        x.as_tensor().to_vec1::<f32>().unwrap()[0]
    }

    #[test]
    fn decay_schedule() {
        assert_eq!(decayed(0.5, 0.0, 100), 0.5);
        assert!((decayed(1.0, 0.001, 1000) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn sgd_first_step_matches_formula() {
        let x = Var::from_slice(&[2.0f32], 1, &Device::Cpu).unwrap();
        let mut opt = NesterovSgd::new(
            vec![x.clone()],
            ParamsNesterovSgd {
                lr: 0.1,
                momentum: 0.5,
                decay: 0.0,
            },
        )
        .unwrap();
        opt.backward_step(&quadratic(&x)).unwrap();
        // g = 4, v = -0.4, w = 2 + 0.5 * -0.4 - 0.4
        assert!((value(&x) - 1.4).abs() < 1e-6, "x = {}", value(&x));
    }

    #[test]
    fn sgd_minimizes_quadratic() {
        let x = Var::from_slice(&[3.0f32], 1, &Device::Cpu).unwrap();
        let mut opt = NesterovSgd::new(
            vec![x.clone()],
            ParamsNesterovSgd {
                lr: 0.05,
                momentum: 0.25,
                decay: 0.001,
            },
        )
        .unwrap();
        for _ in 0..100 {
            opt.backward_step(&quadratic(&x)).unwrap();
        }
        assert!(value(&x).abs() < 1e-3, "x = {}", value(&x));
    }

    #[test]
    fn adadelta_moves_downhill() {
        let x = Var::from_slice(&[3.0f32], 1, &Device::Cpu).unwrap();
        let mut opt = Adadelta::new(vec![x.clone()], ParamsAdadelta::default()).unwrap();
        let mut last = value(&x);
        for _ in 0..20 {
            opt.backward_step(&quadratic(&x)).unwrap();
            let now = value(&x);
            assert!(now < last);
            last = now;
        }
    }

    #[test]
    fn train_optimizer_follows_kind() {
        let x = Var::from_slice(&[1.0f32], 1, &Device::Cpu).unwrap();
        let config = TrainConfig {
            lr: 0.2,
            decay: 1.0,
            ..TrainConfig::default()
        };
        let mut opt = TrainOptimizer::new(OptimizerKind::Sgd, vec![x.clone()], &config).unwrap();
        assert_eq!(opt.kind(), OptimizerKind::Sgd);
        assert!((opt.effective_learning_rate() - 0.2).abs() < 1e-12);
        opt.backward_step(&quadratic(&x)).unwrap();
        assert!((opt.effective_learning_rate() - 0.1).abs() < 1e-12);

        let opt = TrainOptimizer::new(OptimizerKind::Adadelta, vec![x], &config).unwrap();
        assert_eq!(opt.kind(), OptimizerKind::Adadelta);
    }
}
