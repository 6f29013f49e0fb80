//! # lhv-learn
//!
//! Run orchestration for the hidden-variable engine: read a run config
//! and a target, train, evaluate, write a report.
//!
//! ## Key Components
//!
//! - [`run_single_target`]: train, evaluate once, optionally checkpoint
//! - [`load_target`]: target distribution from JSON
//! - [`EvaluationReport`]: evaluated distribution plus KL and Euclidean distances
//!
//! The `train-lhv` binary wraps these behind a command line.
//!
//! ## Architecture Rules
//!
//! - Depends on `lhv-core` and `lhv-soft`.
//! - Multi-target sweeps are left to callers; each call is one run.

pub mod report;
pub mod run;

pub use report::EvaluationReport;
pub use run::{load_target, run_single_target, RunOutcome};

pub use lhv_core;
pub use lhv_soft;
