//! Distances between probability vectors, on plain slices.
//!
//! The differentiable twin of [`kl_distance`] lives in `lhv-soft` and
//! applies the same [`PROB_EPSILON`] clipping, so the two agree on
//! matching inputs.

use crate::error::LhvError;

/// Floor applied to probabilities before taking logarithms.
pub const PROB_EPSILON: f32 = 1e-7;

fn check_lengths(context: &str, p: &[f32], q: &[f32]) -> Result<(), LhvError> {
    if p.len() != q.len() {
        return Err(LhvError::ShapeMismatch {
            context: context.to_string(),
            expected: p.len(),
            got: q.len(),
        });
    }
    Ok(())
}

/// KL-style divergence `sum(p * ln(p / q))` of `p` from `q`.
///
/// Both operands are clipped to `[PROB_EPSILON, 1]` first so zeros never
/// reach the logarithm.
///
/// # Errors
///
/// Returns [`LhvError::ShapeMismatch`] if the slices differ in length.
///
/// # Example
///
/// ```
/// use lhv_core::metric::kl_distance;
///
/// let p = [0.5, 0.5];
/// assert!(kl_distance(&p, &p).unwrap().abs() < 1e-7);
/// assert!(kl_distance(&p, &[0.9, 0.1]).unwrap() > 0.0);
/// ```
pub fn kl_distance(p: &[f32], q: &[f32]) -> Result<f32, LhvError> {
    check_lengths("kl_distance", p, q)?;
    Ok(p.iter()
        .zip(q)
        .map(|(&p, &q)| {
            let p = p.clamp(PROB_EPSILON, 1.0);
            let q = q.clamp(PROB_EPSILON, 1.0);
            p * (p / q).ln()
        })
        .sum())
}

/// Row-wise [`kl_distance`] over two row-major `(rows, row_len)` buffers.
///
/// # Errors
///
/// Returns [`LhvError::ShapeMismatch`] if the buffers differ in length or
/// are not a whole number of rows.
pub fn kl_distance_rows(p: &[f32], q: &[f32], row_len: usize) -> Result<Vec<f32>, LhvError> {
    check_lengths("kl_distance_rows", p, q)?;
    if row_len == 0 || p.len() % row_len != 0 {
        return Err(LhvError::ShapeMismatch {
            context: "kl_distance_rows row length".to_string(),
            expected: row_len,
            got: p.len(),
        });
    }
    p.chunks(row_len)
        .zip(q.chunks(row_len))
        .map(|(p, q)| kl_distance(p, q))
        .collect()
}

/// Euclidean distance between two vectors; used for reporting only.
///
/// # Errors
///
/// Returns [`LhvError::ShapeMismatch`] if the slices differ in length.
pub fn euclidean_distance(p: &[f32], q: &[f32]) -> Result<f32, LhvError> {
    check_lengths("euclidean_distance", p, q)?;
    Ok(p.iter()
        .zip(q)
        .map(|(a, b)| (a - b) * (a - b))
        .sum::<f32>()
        .sqrt())
}
