//! Joint probability tensors over the three parties' outcomes.

use serde::{Deserialize, Serialize};

use crate::error::LhvError;
use crate::PARTY_COUNT;

/// Allowed deviation of a distribution's total mass from 1.
pub const NORMALIZATION_TOLERANCE: f32 = 1e-4;

/// A probability tensor of shape `(A, B, C)`, stored row-major.
///
/// Used both for the externally supplied target and for the estimate a
/// trained network produces. Entries are non-negative and sum to one.
///
/// # Example
///
/// ```
/// use lhv_core::JointDistribution;
///
/// let uniform = JointDistribution::uniform([2, 2, 2]).unwrap();
/// assert_eq!(uniform.len(), 8);
/// assert!((uniform.get(1, 0, 1) - 0.125).abs() < 1e-7);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawDistribution", into = "RawDistribution")]
pub struct JointDistribution {
    shape: [usize; PARTY_COUNT],
    probs: Vec<f32>,
}

#[derive(Serialize, Deserialize)]
struct RawDistribution {
    shape: [usize; PARTY_COUNT],
    probs: Vec<f32>,
}

impl TryFrom<RawDistribution> for JointDistribution {
    type Error = LhvError;

    fn try_from(raw: RawDistribution) -> Result<Self, Self::Error> {
        Self::new(raw.shape, raw.probs)
    }
}

impl From<JointDistribution> for RawDistribution {
    fn from(dist: JointDistribution) -> Self {
        Self {
            shape: dist.shape,
            probs: dist.probs,
        }
    }
}

impl JointDistribution {
    /// Wraps a flattened probability tensor after validating it.
    ///
    /// # Errors
    ///
    /// Returns [`LhvError::ShapeMismatch`] if `probs.len()` is not the
    /// product of `shape`, and [`LhvError::InvalidDistribution`] for
    /// negative, non-finite or unnormalized entries.
    pub fn new(shape: [usize; PARTY_COUNT], probs: Vec<f32>) -> Result<Self, LhvError> {
        let expected: usize = shape.iter().product();
        if expected == 0 {
            return Err(LhvError::InvalidDistribution {
                message: format!("shape {shape:?} has no entries"),
            });
        }
        if probs.len() != expected {
            return Err(LhvError::ShapeMismatch {
                context: format!("joint distribution of shape {shape:?}"),
                expected,
                got: probs.len(),
            });
        }
        if let Some(bad) = probs.iter().find(|p| !p.is_finite() || **p < 0.0) {
            return Err(LhvError::InvalidDistribution {
                message: format!("entry {bad} is not a probability"),
            });
        }
        let total: f32 = probs.iter().sum();
        if (total - 1.0).abs() > NORMALIZATION_TOLERANCE {
            return Err(LhvError::InvalidDistribution {
                message: format!("entries sum to {total}, expected 1"),
            });
        }
        Ok(Self { shape, probs })
    }

    /// The uniform distribution over all outcome triples.
    ///
    /// # Errors
    ///
    /// Returns [`LhvError::InvalidDistribution`] if any axis is empty.
    pub fn uniform(shape: [usize; PARTY_COUNT]) -> Result<Self, LhvError> {
        let n: usize = shape.iter().product();
        Self::new(shape, vec![1.0 / n.max(1) as f32; n])
    }

    pub fn shape(&self) -> [usize; PARTY_COUNT] {
        self.shape
    }

    pub fn len(&self) -> usize {
        self.probs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.probs.is_empty()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.probs
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.probs
    }

    /// Probability of outcomes `(a, b, c)`.
    ///
    /// # Panics
    ///
    /// Panics if an index is outside the shape.
    pub fn get(&self, a: usize, b: usize, c: usize) -> f32 {
        let [na, nb, nc] = self.shape;
        assert!(a < na && b < nb && c < nc, "outcome ({a}, {b}, {c}) outside {:?}", self.shape);
        self.probs[(a * nb + b) * nc + c]
    }

    /// Marginal distribution of one party (0 = Alice, 1 = Bob, 2 = Charlie).
    ///
    /// # Panics
    ///
    /// Panics if `party` is not below [`PARTY_COUNT`].
    pub fn marginal(&self, party: usize) -> Vec<f32> {
        assert!(party < PARTY_COUNT, "party {party} outside 0..{PARTY_COUNT}");
        let [_, nb, nc] = self.shape;
        let mut out = vec![0.0; self.shape[party]];
        for (idx, p) in self.probs.iter().enumerate() {
            let outcome = match party {
                0 => idx / (nb * nc),
                1 => (idx / nc) % nb,
                _ => idx % nc,
            };
            out[outcome] += p;
        }
        out
    }

    /// `batch` copies of the flattened distribution, one per row.
    ///
    /// This is the label batch the loss consumes. The repetition only
    /// satisfies a fixed-size label interface; the loss reads one row.
    pub fn broadcast_rows(&self, batch: usize) -> Vec<f32> {
        let mut rows = Vec::with_capacity(batch * self.probs.len());
        for _ in 0..batch {
            rows.extend_from_slice(&self.probs);
        }
        rows
    }
}
