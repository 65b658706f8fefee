//! Crate-wide error type.
//!
//! One enum covers every failure class the engine can surface; each variant
//! maps onto the process exit code documented for the CLI. Numerical
//! conditions discovered during analysis are *not* errors — they travel as
//! warnings on the affected report.

use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by the experiment engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The configuration file is invalid: duplicate factor names, missing
    /// mandatory fields, interactions over unknown factors, and so on.
    #[error("configuration error: {0}")]
    Config(String),

    /// No catalogued orthogonal array accommodates the factor set, or a
    /// factor/interaction could not be assigned to a column.
    #[error("design error: {0}")]
    Design(String),

    /// The target program could not be launched or its output could not be
    /// interpreted. The orchestrator downgrades this to an empty metric map;
    /// it only escapes as an error when the target executable is unusable.
    #[error("target runner error: {0}")]
    Runner(String),

    /// A state checkpoint could not be written or read back.
    #[error("failed to persist state to {}: {source}", path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A state file exists but cannot be reconciled with the experiment it
    /// claims to describe.
    #[error("state error: {0}")]
    State(String),

    /// Report rendering or writing failed.
    #[error("report error: {0}")]
    Report(String),

    /// A referenced file does not exist.
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// The run was cancelled cooperatively; state was persisted first.
    #[error("experiment cancelled; state saved to {}", .0.display())]
    Cancelled(PathBuf),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl EngineError {
    /// Process exit code for this error.
    ///
    /// `0` success, `1` unexpected, `2` argument error (owned by clap),
    /// `3` configuration, `4` design, `5` file not found, `6` operational.
    pub fn exit_code(&self) -> i32 {
        match self {
            EngineError::Config(_) => 3,
            EngineError::Design(_) => 4,
            EngineError::FileNotFound(_) => 5,
            EngineError::Runner(_)
            | EngineError::Persistence { .. }
            | EngineError::State(_)
            | EngineError::Report(_)
            | EngineError::Cancelled(_) => 6,
            EngineError::Io(_) | EngineError::Yaml(_) => 1,
        }
    }
}

/// Shorthand used throughout the crate.
pub type Result<T> = std::result::Result<T, EngineError>;
