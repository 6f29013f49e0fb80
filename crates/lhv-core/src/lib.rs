//! # lhv-core
//!
//! Framework-free foundation for training neural networks that act as
//! local-hidden-variable models of a three-party (triangle) scenario.
//!
//! ## Key Components
//!
//! - [`NetworkConfig`] / [`TrainConfig`] / [`RunConfig`]: serde run description
//! - [`JointDistribution`]: validated `(A, B, C)` probability tensor
//! - [`metric`]: KL and Euclidean distances on slices
//! - [`joint`]: batch-averaged outer product of per-party predictions
//! - [`LhvError`]: the error type used across the workspace
//!
//! ## Architecture Rules
//!
//! - No tensor framework here. Differentiable code lives in `lhv-soft`.
//! - Numeric routines here are the reference the graph versions are
//!   tested against.

pub mod config;
pub mod distribution;
pub mod error;
pub mod joint;
pub mod metric;

pub use config::{
    triangle_sources, Activation, KernelRegularizer, NetworkConfig, OptimizerKind, RunConfig,
    TrainConfig,
};
pub use distribution::JointDistribution;
pub use error::LhvError;

/// Number of parties (Alice, Bob, Charlie) and of hidden variables.
pub const PARTY_COUNT: usize = 3;

/// Mean of the uniform source distribution on `[0, 1)`.
pub const UNIFORM_MEAN: f32 = 0.5;

/// Standard deviation of the uniform distribution on `[0, 1)`, `sqrt(1/12)`.
pub const UNIFORM_STD: f32 = 0.288_675_13;

/// Human-readable party names, indexed like the routing table.
pub const PARTY_NAMES: [&str; PARTY_COUNT] = ["alice", "bob", "charlie"];
