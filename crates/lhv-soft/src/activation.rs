//! Activation functions on candle tensors.
//!
//! Every variant is built from ops candle can differentiate, so the
//! same path serves inference and training.

use candle_core::{Tensor, D};
use lhv_core::Activation;

/// Applies `activation` element-wise (row-wise for softmax).
pub fn apply(activation: Activation, xs: &Tensor) -> candle_core::Result<Tensor> {
    match activation {
        Activation::Relu => xs.relu(),
        Activation::Elu => xs.elu(1.0),
        Activation::Tanh => xs.tanh(),
        Activation::Sigmoid => (xs.neg()?.exp()? + 1.0)?.recip(),
        Activation::Gelu => xs.gelu_erf(),
        Activation::Linear => Ok(xs.clone()),
        Activation::Softmax => candle_nn::ops::softmax(xs, D::Minus1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    fn row(values: &[f32]) -> Tensor {
        Tensor::from_slice(values, (1, values.len()), &Device::Cpu).unwrap()
    }

    fn values(t: &Tensor) -> Vec<f32> {
        t.flatten_all().unwrap().to_vec1::<f32>().unwrap()
    }

    #[test]
    fn softmax_rows_are_distributions() {
        let xs = Tensor::from_slice(&[1.0f32, 2.0, 3.0, -5.0, 0.0, 5.0], (2, 3), &Device::Cpu).unwrap();
        let out = apply(Activation::Softmax, &xs).unwrap();
        for r in out.to_vec2::<f32>().unwrap() {
            assert!((r.iter().sum::<f32>() - 1.0).abs() < 1e-6);
            assert!(r.iter().all(|p| *p > 0.0));
        }
    }

    #[test]
    fn relu_clamps_negatives() {
        let out = values(&apply(Activation::Relu, &row(&[-1.0, 0.5])).unwrap());
        assert_eq!(out, vec![0.0, 0.5]);
    }

    #[test]
    fn sigmoid_of_zero_is_half() {
        let out = values(&apply(Activation::Sigmoid, &row(&[0.0, 50.0])).unwrap());
        assert!((out[0] - 0.5).abs() < 1e-6);
        assert!((out[1] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn linear_is_identity() {
        let out = values(&apply(Activation::Linear, &row(&[-2.0, 3.0])).unwrap());
        assert_eq!(out, vec![-2.0, 3.0]);
    }

    #[test]
    fn elu_saturates_at_minus_one() {
        let out = values(&apply(Activation::Elu, &row(&[-30.0, 2.0])).unwrap());
        assert!((out[0] + 1.0).abs() < 1e-6);
        assert_eq!(out[1], 2.0);
    }
}
