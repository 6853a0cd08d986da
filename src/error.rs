//! Error types for the arena solvers.
//!
//! Only conditions a caller can act on are represented here: solver failures,
//! policy-file problems and rejected configuration. Inconsistencies inside the
//! transition model are defects and abort through `assert!` instead.

use std::time::Duration;

use thiserror::Error;

use crate::model::Action;

/// Failures reported by the simplex solver.
#[derive(Debug, Error)]
pub enum LpError {
    /// Phase I finished with artificial mass left over, or the final basis
    /// misses the right-hand side.
    #[error("linear program is infeasible (residual {residual:e})")]
    Infeasible { residual: f64 },

    /// An occupancy vector breaks flow conservation by more than the
    /// accepted residual.
    #[error("occupancy solution violates flow conservation by {residual:e}")]
    FlowViolation { residual: f64 },

    /// An entering column had no positive entry to bound the ratio test.
    #[error("linear program is unbounded along column {column}")]
    Unbounded { column: usize },

    #[error("simplex did not reach an optimum within {0} pivots")]
    PivotLimit(usize),

    #[error("simplex exceeded its time budget of {0:?}")]
    TimeBudget(Duration),

    /// The objective, matrix and right-hand side disagree in shape.
    #[error("inconsistent program dimensions: {0}")]
    Dimension(String),
}

/// Crate-wide error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Lp(#[from] LpError),

    #[error("policy file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("policy file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("policy holds {found} records, expected {expected}")]
    RecordCount { expected: usize, found: usize },

    #[error("policy record at position {position} carries index {index}")]
    RecordOrder { position: usize, index: usize },

    #[error("unknown action code {0}")]
    UnknownAction(u8),

    #[error("policy assigns {action} to state {index}, where it is not admissible")]
    IllegalAction { index: usize, action: Action },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
