//! Kernel initializers.
//!
//! candle's `Init` has no truncated normal, so kernels are sampled here
//! and registered in the `VarMap` directly.

use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::StandardNormal;

/// Standard deviation of a unit normal truncated to `[-2, 2]`.
const TRUNCATED_NORMAL_STD: f64 = 0.879_625_661_034_239_8;

/// How a kernel matrix is filled before training.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KernelInit {
    /// Uniform on `±sqrt(6 / (fan_in + fan_out))`.
    GlorotUniform,
    /// Truncated normal with variance `scale / fan_in`.
    VarianceScaling { scale: f64 },
}

impl KernelInit {
    /// Samples a `fan_out × fan_in` kernel in row-major order.
    pub fn sample(&self, fan_in: usize, fan_out: usize, rng: &mut StdRng) -> Vec<f32> {
        let n = fan_in * fan_out;
        match *self {
            Self::GlorotUniform => {
                let limit = (6.0 / (fan_in + fan_out) as f64).sqrt() as f32;
                (0..n).map(|_| rng.random_range(-limit..limit)).collect()
            }
            Self::VarianceScaling { scale } => {
                let std = (scale / fan_in.max(1) as f64).sqrt() / TRUNCATED_NORMAL_STD;
                (0..n)
                    .map(|_| (truncated_unit_normal(rng) * std) as f32)
                    .collect()
            }
        }
    }
}

/// Unit normal resampled until it lands within two standard deviations.
fn truncated_unit_normal(rng: &mut StdRng) -> f64 {
    loop {
        let z: f64 = rng.sample(StandardNormal);
        if z.abs() <= 2.0 {
            return z;
        }
    }
}
