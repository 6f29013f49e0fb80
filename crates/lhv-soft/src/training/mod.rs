//! Training runs and evaluation.
//!
//! ## Lifecycle
//!
//! Each [`single_run`] owns a fresh [`RunContext`] (variable store and
//! device) inside the returned [`Model`]. Nothing is global, so
//! successive runs in one process start from clean state.
//!
//! ## Streams
//!
//! Batches come from [`crate::sampler::HiddenVariableSampler`]; the
//! driver bounds each infinite stream with `take`, so a run samples
//! exactly `no_of_batches + no_of_validation_batches` batches.

pub mod driver;
pub mod model;

pub use driver::{single_evaluation, single_run, TrainReport};
pub use model::{Model, RunContext};
