//! Error type shared by every crate in the workspace.

use thiserror::Error;

/// Errors produced while configuring, training or evaluating a
/// hidden-variable network.
///
/// # Example
///
/// ```
/// use lhv_core::LhvError;
///
/// let err = LhvError::InvalidConfig {
///     message: "inputsize must be 3".to_string(),
/// };
/// assert!(err.to_string().contains("inputsize"));
/// ```
#[derive(Debug, Error)]
pub enum LhvError {
    /// A configuration precondition does not hold.
    #[error("invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// Two buffers or tensors that must agree in size do not.
    #[error("{context}: expected length {expected}, got {got}")]
    ShapeMismatch {
        context: String,
        expected: usize,
        got: usize,
    },

    /// A probability tensor is negative somewhere or does not sum to one.
    #[error("invalid distribution: {message}")]
    InvalidDistribution { message: String },

    /// Label batch rows are not all copies of the same target.
    #[error("label row {row} differs from row 0 by {deviation}")]
    InconsistentLabels { row: usize, deviation: f32 },

    /// Saving or restoring model weights failed.
    #[error("checkpoint error: {message}")]
    Checkpoint { message: String },

    /// Filesystem failure.
    #[error("I/O error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// Tensor backend failure or broken internal invariant.
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl LhvError {
    /// Shorthand for an [`LhvError::InvalidConfig`].
    pub fn config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }
}
