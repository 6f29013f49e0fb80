//! Differentiable twin of [`lhv_core::metric::kl_distance`].

use candle_core::{Tensor, D};
use lhv_core::metric::PROB_EPSILON;
use lhv_core::LhvError;

/// `sum(p * ln(p / q))` over the last axis, after clipping both operands
/// to `[PROB_EPSILON, 1]`.
///
/// A 1-D input yields a scalar; a `[rows, n]` input yields one value per row.
///
/// # Errors
///
/// Returns [`LhvError::ShapeMismatch`] if the shapes differ,
/// [`LhvError::Internal`] on tensor failures.
pub fn kl_distance(p: &Tensor, q: &Tensor) -> Result<Tensor, LhvError> {
    if p.dims() != q.dims() {
        return Err(LhvError::ShapeMismatch {
            context: format!("kl_distance {:?} vs {:?}", p.dims(), q.dims()),
            expected: p.elem_count(),
            got: q.elem_count(),
        });
    }
    let map_err = |e: candle_core::Error| LhvError::Internal {
        message: format!("kl_distance: {e}"),
    };

    let p = p.clamp(PROB_EPSILON, 1.0f32).map_err(map_err)?;
    let q = q.clamp(PROB_EPSILON, 1.0f32).map_err(map_err)?;
    p.div(&q)
        .and_then(|ratio| ratio.log())
        .and_then(|log_ratio| p.mul(&log_ratio))
        .and_then(|terms| terms.sum(D::Minus1))
        .map_err(map_err)
}
