//! Batch-averaged outer product of per-party predictions, on plain slices.
//!
//! Each row of a concatenated prediction holds Alice's, Bob's and
//! Charlie's output distributions for one hidden-variable sample. The
//! outer product of the three is that sample's conditional joint, and
//! averaging over the batch integrates out the hidden variables.

use crate::error::LhvError;
use crate::PARTY_COUNT;

/// Estimates the joint distribution from a row-major `(batch, A+B+C)`
/// prediction buffer. Returns the flattened `(A, B, C)` tensor.
///
/// # Errors
///
/// Returns [`LhvError::ShapeMismatch`] if `pred` is not `batch` rows of
/// `A+B+C` values, and [`LhvError::InvalidConfig`] for an empty batch.
///
/// # Example
///
/// ```
/// use lhv_core::joint::joint_distribution;
///
/// // One sample, deterministic outcomes a=1, b=0, c=1.
/// let pred = [0.0, 1.0, 1.0, 0.0, 0.0, 1.0];
/// let joint = joint_distribution(&pred, 1, [2, 2, 2]).unwrap();
/// assert_eq!(joint[0b101], 1.0);
/// assert_eq!(joint.iter().sum::<f32>(), 1.0);
/// ```
pub fn joint_distribution(
    pred: &[f32],
    batch: usize,
    sizes: [usize; PARTY_COUNT],
) -> Result<Vec<f32>, LhvError> {
    let [na, nb, nc] = sizes;
    let row_len = na + nb + nc;
    if batch == 0 {
        return Err(LhvError::config("joint_distribution: empty batch"));
    }
    if pred.len() != batch * row_len {
        return Err(LhvError::ShapeMismatch {
            context: "joint_distribution prediction".to_string(),
            expected: batch * row_len,
            got: pred.len(),
        });
    }

    let mut joint = vec![0.0f64; na * nb * nc];
    for row in pred.chunks(row_len) {
        let (a, rest) = row.split_at(na);
        let (b, c) = rest.split_at(nb);
        for (i, &pa) in a.iter().enumerate() {
            for (j, &pb) in b.iter().enumerate() {
                let pab = pa as f64 * pb as f64;
                let base = (i * nb + j) * nc;
                for (k, &pc) in c.iter().enumerate() {
                    joint[base + k] += pab * pc as f64;
                }
            }
        }
    }

    let scale = 1.0 / batch as f64;
    Ok(joint.into_iter().map(|p| (p * scale) as f32).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn softmaxish(seed: usize, n: usize) -> Vec<f32> {
        let raw: Vec<f32> = (0..n).map(|i| ((seed * 7 + i * 3) % 11) as f32 + 0.5).collect();
        let total: f32 = raw.iter().sum();
        raw.into_iter().map(|x| x / total).collect()
    }

    fn batch_of(batch: usize, sizes: [usize; 3]) -> Vec<f32> {
        let mut pred = Vec::new();
        for row in 0..batch {
            for (party, &n) in sizes.iter().enumerate() {
                pred.extend(softmaxish(row * 3 + party, n));
            }
        }
        pred
    }

    #[test]
    fn sums_to_one_for_various_shapes() {
        for sizes in [[4, 4, 4], [2, 3, 2], [1, 5, 3]] {
            let pred = batch_of(17, sizes);
            let joint = joint_distribution(&pred, 17, sizes).unwrap();
            assert_eq!(joint.len(), sizes.iter().product::<usize>());
            let total: f32 = joint.iter().sum();
            assert!((total - 1.0).abs() < 1e-5, "sizes {sizes:?} total {total}");
            assert!(joint.iter().all(|p| *p >= 0.0));
        }
    }

    #[test]
    fn single_row_is_outer_product() {
        let pred = [0.25, 0.75, 0.5, 0.5, 0.1, 0.9];
        let joint = joint_distribution(&pred, 1, [2, 2, 2]).unwrap();
        assert!((joint[0] - 0.25 * 0.5 * 0.1).abs() < 1e-7);
        assert!((joint[7] - 0.75 * 0.5 * 0.9).abs() < 1e-7);
    }

    #[test]
    fn averages_over_batch() {
        // Row 1: all mass on (0,0,0); row 2: all mass on (1,1,1).
        let pred = [1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0];
        let joint = joint_distribution(&pred, 2, [2, 2, 2]).unwrap();
        assert_eq!(joint[0], 0.5);
        assert_eq!(joint[7], 0.5);
        assert_eq!(joint.iter().filter(|p| **p == 0.0).count(), 6);
    }

    #[test]
    fn wrong_length_errors() {
        assert!(joint_distribution(&[0.5; 5], 1, [2, 2, 2]).is_err());
        assert!(joint_distribution(&[], 0, [2, 2, 2]).is_err());
    }
}
