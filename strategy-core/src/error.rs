//! Error types for strategy filtering.

use thiserror::Error;

/// Errors that can occur while building or filtering a strategy encoding.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Labels and encoding disagree (upstream data corruption).
    #[error("Precondition violated: {0}")]
    Precondition(String),

    /// Settings rejected at construction.
    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    /// Problem oracle failed to populate or solve.
    #[error("Oracle failed: {0}")]
    Oracle(String),

    /// Sample set is malformed (empty, ragged, mismatched lengths).
    #[error("Invalid samples: {0}")]
    InvalidSamples(String),

    /// Worker pool could not be created.
    #[error("Thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Result type for strategy operations.
pub type CoreResult<T> = Result<T, CoreError>;
