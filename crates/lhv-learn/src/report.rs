//! Evaluation report written after a run for external plotting.

use std::path::Path;

use lhv_core::metric::{euclidean_distance, kl_distance};
use lhv_core::{JointDistribution, LhvError, PARTY_COUNT};
use lhv_soft::training::TrainReport;
use serde::{Deserialize, Serialize};

/// The evaluated joint distribution next to the target it was trained on.
///
/// `distribution` and `target` are flattened row-major over
/// `(alice, bob, charlie)` outcomes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub shape: [usize; PARTY_COUNT],
    pub target: Vec<f32>,
    pub distribution: Vec<f32>,
    /// KL distance of the target from the evaluated distribution.
    pub kl_distance: f32,
    pub euclidean_distance: f32,
    /// Optimizer that actually ran, after any fallback.
    pub optimizer: String,
    pub steps_completed: usize,
    pub final_loss: Option<f32>,
    pub validation_loss: Option<f32>,
}

impl EvaluationReport {
    /// # Errors
    ///
    /// Returns [`LhvError::ShapeMismatch`] if `distribution` does not have
    /// the target's length.
    pub fn new(
        target: &JointDistribution,
        distribution: Vec<f32>,
        train: &TrainReport,
    ) -> Result<Self, LhvError> {
        Ok(Self {
            shape: target.shape(),
            kl_distance: kl_distance(target.as_slice(), &distribution)?,
            euclidean_distance: euclidean_distance(target.as_slice(), &distribution)?,
            target: target.as_slice().to_vec(),
            distribution,
            optimizer: train.optimizer.name().to_string(),
            steps_completed: train.steps_completed,
            final_loss: train.loss_history.last().copied(),
            validation_loss: train.validation_loss,
        })
    }

    /// Writes the report as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns [`LhvError::Io`] on write failure.
    pub fn write_json(&self, path: &Path) -> Result<(), LhvError> {
        let text = serde_json::to_string_pretty(self).map_err(|e| LhvError::Internal {
            message: format!("serializing evaluation report: {e}"),
        })?;
        std::fs::write(path, text).map_err(|source| LhvError::Io {
            context: format!("writing {}", path.display()),
            source,
        })
    }
}
