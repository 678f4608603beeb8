//! Error types for flowgraph-solver
//!
//! Only two things can fail hard: an invalid configuration at construction
//! time, and a task failure (panicking user flow function) during a solve.
//! Forced termination is deliberately not an error; partial results stay
//! readable and the cause is reported through `termination_reason()`.

use thiserror::Error;

/// Main error type for solver operations
#[derive(Debug, Error)]
pub enum SolverError {
    /// Invalid problem or solver configuration; fatal at construction
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A worker task failed; the first failure is preserved and the
    /// analysis is abandoned
    #[error("tabulation task failed: {0}")]
    TaskFailed(String),
}

impl SolverError {
    /// Create a configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        SolverError::Configuration(msg.into())
    }
}

/// Result type alias for solver operations
pub type Result<T> = std::result::Result<T, SolverError>;
