//! Error types for the parametric QP oracle.

use strategy_core::CoreError;
use thiserror::Error;

/// Errors that can occur while building or solving a parametric QP.
#[derive(Error, Debug)]
pub enum QpError {
    /// Problem validation failed
    #[error("Invalid problem: {0}")]
    InvalidProblem(String),

    /// Parameter vector has the wrong length
    #[error("Parameter has length {got}, expected {expected}")]
    ParameterLength {
        /// Length received.
        got: usize,
        /// Length required by the problem.
        expected: usize,
    },

    /// Strategy refers to a row the problem does not have
    #[error("Strategy row {row} out of range ({rows} inequality rows)")]
    InvalidStrategy {
        /// Offending row.
        row: usize,
        /// Number of inequality rows.
        rows: usize,
    },

    /// Oracle used before `populate`
    #[error("Oracle not populated")]
    NotPopulated,

    /// Factorization of the ADMM system failed
    #[error("Factorization failed: {0}")]
    Factorization(String),

    /// ADMM reached its iteration limit
    #[error("ADMM did not converge in {iters} iterations (primal res {prim_res:.2e}, dual res {dual_res:.2e})")]
    NotConverged {
        /// Iterations run.
        iters: usize,
        /// Final primal residual.
        prim_res: f64,
        /// Final dual residual.
        dual_res: f64,
    },
}

/// Result type for QP operations.
pub type QpResult<T> = Result<T, QpError>;

impl From<QpError> for CoreError {
    fn from(e: QpError) -> Self {
        CoreError::Oracle(e.to_string())
    }
}
