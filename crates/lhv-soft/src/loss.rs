//! Training objective.
//!
//! Labels arrive as a `[N, A*B*C]` batch whose rows are all the same
//! flattened target. Only row 0 is read; the repetition exists because
//! the training loop hands the loss one label row per input row. The
//! rows are checked for equality rather than trusted.

use candle_core::Tensor;
use lhv_core::{LhvError, PARTY_COUNT};

use crate::aggregate::joint_distribution;
use crate::metric::kl_distance;

/// Identifier stored next to saved weights for [`JointKlLoss`].
pub const JOINT_KL_LOSS_ID: &str = "joint_kl";

/// Maximum absolute difference tolerated between label rows.
pub const LABEL_ROW_TOLERANCE: f32 = 1e-6;

/// A scalar training objective over a label batch and a prediction batch.
pub trait Loss {
    /// Stable name recorded in checkpoints; loading requires a match.
    fn id(&self) -> &str;

    /// Computes the scalar loss.
    ///
    /// # Errors
    ///
    /// Implementations return [`LhvError`] for malformed inputs.
    fn compute(&self, y_true: &Tensor, y_pred: &Tensor) -> Result<Tensor, LhvError>;
}

/// KL distance of the target from the batch-estimated joint distribution.
///
/// # Example
///
/// ```
/// use candle_core::{Device, Tensor};
/// use lhv_soft::loss::{JointKlLoss, Loss};
///
/// let loss = JointKlLoss::new([2, 2, 2]);
/// // Every party uniform: the estimate equals the uniform target.
/// let y_pred = Tensor::full(0.5f32, (4, 6), &Device::Cpu).unwrap();
/// let y_true = Tensor::full(0.125f32, (4, 8), &Device::Cpu).unwrap();
/// let value = loss.compute(&y_true, &y_pred).unwrap().to_scalar::<f32>().unwrap();
/// assert!(value.abs() < 1e-6);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JointKlLoss {
    sizes: [usize; PARTY_COUNT],
}

impl JointKlLoss {
    pub fn new(sizes: [usize; PARTY_COUNT]) -> Self {
        Self { sizes }
    }

    pub fn sizes(&self) -> [usize; PARTY_COUNT] {
        self.sizes
    }

    /// Returns row 0 after confirming every other row matches it.
    fn target_row(&self, y_true: &Tensor) -> Result<Tensor, LhvError> {
        let map_err = |e: candle_core::Error| LhvError::Internal {
            message: format!("JointKlLoss labels: {e}"),
        };

        let (rows, width) = y_true.dims2().map_err(map_err)?;
        let joint_len: usize = self.sizes.iter().product();
        if width != joint_len {
            return Err(LhvError::ShapeMismatch {
                context: "JointKlLoss label width".to_string(),
                expected: joint_len,
                got: width,
            });
        }
        if rows == 0 {
            return Err(LhvError::config("JointKlLoss: empty label batch"));
        }

        let first = y_true.get(0).map_err(map_err)?;
        let deviations = y_true
            .broadcast_sub(&first)
            .and_then(|d| d.abs())
            .and_then(|d| d.max(1))
            .and_then(|d| d.to_vec1::<f32>())
            .map_err(map_err)?;
        if let Some((row, &deviation)) = deviations
            .iter()
            .enumerate()
            .find(|(_, d)| **d > LABEL_ROW_TOLERANCE)
        {
            return Err(LhvError::InconsistentLabels { row, deviation });
        }
        Ok(first)
    }
}

impl Loss for JointKlLoss {
    fn id(&self) -> &str {
        JOINT_KL_LOSS_ID
    }

    fn compute(&self, y_true: &Tensor, y_pred: &Tensor) -> Result<Tensor, LhvError> {
        let target = self.target_row(y_true)?;
        let estimate = joint_distribution(y_pred, self.sizes)?;
        kl_distance(&target, &estimate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{Device, Var};

    fn labels(target: &[f32], rows: usize) -> Tensor {
        let data: Vec<f32> = target.iter().copied().cycle().take(target.len() * rows).collect();
        Tensor::from_vec(data, (rows, target.len()), &Device::Cpu).unwrap()
    }

    #[test]
    fn perfect_prediction_has_zero_loss() {
        // Alice always 0, Bob always 1: joint puts all mass on (0, 1, c).
        let pred = Tensor::from_slice(&[1.0f32, 0.0, 0.0, 1.0, 0.3, 0.7], (1, 6), &Device::Cpu)
            .unwrap();
        let target = [0.0, 0.0, 0.3, 0.7, 0.0, 0.0, 0.0, 0.0];
        let value = JointKlLoss::new([2, 2, 2])
            .compute(&labels(&target, 3), &pred)
            .unwrap()
            .to_scalar::<f32>()
            .unwrap();
        assert!(value.abs() < 1e-5, "loss {value}");
    }

    #[test]
    fn mismatched_prediction_has_positive_loss() {
        let pred = Tensor::full(0.5f32, (2, 6), &Device::Cpu).unwrap();
        let target = [0.5, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.5];
        let value = JointKlLoss::new([2, 2, 2])
            .compute(&labels(&target, 2), &pred)
            .unwrap()
            .to_scalar::<f32>()
            .unwrap();
        assert!((value - 4.0f32.ln()).abs() < 1e-4, "loss {value}");
    }

    #[test]
    fn inconsistent_label_rows_rejected() {
        let mut data = vec![0.125f32; 24];
        data[16] = 0.25;
        data[17] = 0.0;
        let y_true = Tensor::from_vec(data, (3, 8), &Device::Cpu).unwrap();
        let y_pred = Tensor::full(0.5f32, (3, 6), &Device::Cpu).unwrap();
        let err = JointKlLoss::new([2, 2, 2]).compute(&y_true, &y_pred).unwrap_err();
        assert!(matches!(err, LhvError::InconsistentLabels { row: 2, .. }));
    }

    #[test]
    fn label_width_must_match_joint() {
        let y_true = Tensor::full(0.25f32, (2, 4), &Device::Cpu).unwrap();
        let y_pred = Tensor::full(0.5f32, (2, 6), &Device::Cpu).unwrap();
        assert!(JointKlLoss::new([2, 2, 2]).compute(&y_true, &y_pred).is_err());
    }

    #[test]
    fn gradient_reaches_predictions() {
        let var = Var::from_vec(vec![0.9f32, 0.1, 0.5, 0.5, 0.5, 0.5], (1, 6), &Device::Cpu)
            .unwrap();
        let y_true = Tensor::full(0.125f32, (1, 8), &Device::Cpu).unwrap();
        let loss = JointKlLoss::new([2, 2, 2])
            .compute(&y_true, var.as_tensor())
            .unwrap();
        let grads = loss.backward().unwrap();
        let grad = grads.get(var.as_tensor()).unwrap().to_vec2::<f32>().unwrap();
        // The under-weighted outcome is pulled up hardest.
        assert!(grad[0][0] < 0.0);
        assert!(grad[0][1] < grad[0][0]);
    }

    #[test]
    fn id_is_stable() {
        assert_eq!(JointKlLoss::new([2, 2, 2]).id(), "joint_kl");
    }
}
