//! Error types for recoverable failures.
//!
//! Covers input parsing, controller configuration, and LP solving. Failures
//! of the simulation kernel itself (a truck whose recorded state disagrees
//! with a firing event, a road queue popping out of order, an illegal
//! traffic-light configuration) are bugs, not conditions a caller can
//! handle, and panic with a message naming the broken invariant.

use thiserror::Error;

/// Top-level error for the crate.
#[derive(Debug, Error)]
pub enum HaulageError {
    /// The input file deviates from the expected format.
    #[error("parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    /// The input file could not be read.
    #[error("could not read input file: {0}")]
    Io(#[from] std::io::Error),

    /// A controller was constructed against an unsupported network shape.
    #[error("configuration error: {0}")]
    Config(String),

    /// The external MILP solver failed or returned a non-optimal status.
    #[error("LP solver error: {0}")]
    Solver(#[from] SolverError),
}

/// Failures from the external MILP solver invocation.
#[derive(Debug, Error)]
pub enum SolverError {
    /// The solver executable could not be launched.
    #[error("could not launch solver '{command}': {source}")]
    Launch {
        command: String,
        source: std::io::Error,
    },

    /// The solver ran but did not report an optimal solution.
    #[error("solver reported non-optimal status: {0}")]
    NonOptimal(String),

    /// The solver output did not contain the expected variable block.
    #[error("could not parse solver output: {0}")]
    Output(String),

    /// The model could not be written to disk for solving or post-mortem.
    #[error("could not persist LP model to '{path}': {source}")]
    Persist {
        path: String,
        source: std::io::Error,
    },
}

impl HaulageError {
    pub(crate) fn parse(line: usize, message: impl Into<String>) -> Self {
        HaulageError::Parse {
            line,
            message: message.into(),
        }
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        HaulageError::Config(message.into())
    }
}
