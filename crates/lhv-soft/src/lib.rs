//! # lhv-soft
//!
//! The differentiable side of the hidden-variable engine, on candle.
//!
//! Three parties (Alice, Bob, Charlie) each see two of three shared hidden
//! variables and output a distribution over their outcomes. Averaging
//! the outer product of the three outputs over a batch estimates the
//! joint distribution the hidden variables induce; training pulls that
//! estimate toward a target.
//!
//! ## Key Components
//!
//! - [`network::TriangleNetwork`]: per-variable greek layers, per-party
//!   latin towers and softmax heads
//! - [`aggregate::joint_distribution`]: graph version of the batch-averaged outer product
//! - [`metric::kl_distance`]: graph KL distance with probability clipping
//! - [`loss::JointKlLoss`]: the training objective
//! - [`sampler::HiddenVariableSampler`]: standardized uniform batches, optional prefetch
//! - [`optim`]: Nesterov SGD and Adadelta with time-based decay
//! - [`checkpoint`]: safetensors weights plus a loss/architecture manifest
//! - [`training::single_run`] / [`training::single_evaluation`]: the driver
//!
//! ## Architecture Rules
//!
//! - All tensor code lives here; `lhv-core` stays framework-free and
//!   provides the numeric reference implementations.
//! - CPU by default. `--features cuda` enables the candle CUDA backend.

pub use lhv_core;

pub mod activation;
pub mod aggregate;
pub mod checkpoint;
pub mod init;
pub mod loss;
pub mod metric;
pub mod network;
pub mod optim;
pub mod sampler;
pub mod training;
