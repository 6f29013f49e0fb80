//! Differentiable joint-distribution estimate.
//!
//! Slices the concatenated prediction back into Alice, Bob and Charlie,
//! gives each its own broadcast axis (`[N,A,1,1]`, `[N,1,B,1]`,
//! `[N,1,1,C]`), multiplies to get one outer product per sample and
//! averages over the batch. No sample is drawn from the joint itself; the
//! mean of the per-sample conditionals is the joint in the large-batch
//! limit.

use candle_core::Tensor;
use lhv_core::{LhvError, PARTY_COUNT};

/// Flattened `(A, B, C)` joint estimate from a `[N, A+B+C]` prediction.
///
/// # Errors
///
/// Returns [`LhvError::ShapeMismatch`] if the prediction width is not
/// `A+B+C`, [`LhvError::Internal`] on tensor failures.
pub fn joint_distribution(pred: &Tensor, sizes: [usize; PARTY_COUNT]) -> Result<Tensor, LhvError> {
    let map_err = |e: candle_core::Error| LhvError::Internal {
        message: format!("joint_distribution: {e}"),
    };

    let (batch, width) = pred.dims2().map_err(map_err)?;
    let [na, nb, nc] = sizes;
    if width != na + nb + nc {
        return Err(LhvError::ShapeMismatch {
            context: "joint_distribution prediction width".to_string(),
            expected: na + nb + nc,
            got: width,
        });
    }

    let party = |offset: usize, len: usize, shape: (usize, usize, usize, usize)| {
        pred.narrow(1, offset, len)
            .and_then(|t| t.contiguous())
            .and_then(|t| t.reshape(shape))
            .map_err(map_err)
    };
    let a = party(0, na, (batch, na, 1, 1))?;
    let b = party(na, nb, (batch, 1, nb, 1))?;
    let c = party(na + nb, nc, (batch, 1, 1, nc))?;

    a.broadcast_mul(&b)
        .and_then(|ab| ab.broadcast_mul(&c))
        .and_then(|abc| abc.mean(0))
        .and_then(|joint| joint.flatten_all())
        .map_err(map_err)
}
