//! Robust parameter optimization via the Taguchi method.
//!
//! Given a target program with tunable parameters and numeric metrics, this
//! crate designs a fractional-factorial experiment over a catalogued
//! orthogonal array, executes the parameter combinations with repetitions,
//! and produces per-metric analyses: S/N ratios, main and interaction
//! effects, ANOVA with pooling, the optimal configuration, and a
//! confidence-bounded prediction of its performance.

pub mod analysis;
pub mod config;
pub mod error;
pub mod logging;
pub mod oa;
pub mod report;
pub mod run;
pub mod state;

pub use error::{EngineError, Result};
