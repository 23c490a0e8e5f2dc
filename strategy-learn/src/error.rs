//! Error types for learners and the optimizer pipeline.

use std::path::PathBuf;

use strategy_core::CoreError;
use thiserror::Error;

use crate::config::LearnerKind;

/// Errors from learners and the optimizer pipeline.
#[derive(Error, Debug)]
pub enum LearnError {
    /// The backend was compiled out
    #[error("{} learner not installed (enable the `{}` feature)", .0, .0.feature())]
    NotInstalled(LearnerKind),

    /// Configuration validation failed
    #[error("Invalid learner configuration: {0}")]
    InvalidConfig(String),

    /// Training data is inconsistent
    #[error("Invalid training data: {0}")]
    InvalidData(String),

    /// Model used before training or loading
    #[error("Learner has not been trained")]
    NotTrained,

    /// Persisted model does not exist
    #[error("Model file {} does not exist", .0.display())]
    MissingFile(PathBuf),

    /// Persisted model belongs to another backend
    #[error("Model file holds a {found} model, expected {expected}")]
    WrongModel {
        /// Backend that tried to load.
        expected: LearnerKind,
        /// Backend stored in the file.
        found: LearnerKind,
    },

    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Tensor operation failed in the neural network backend
    #[error("Tensor error: {0}")]
    Tensor(String),

    /// (De)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Error from the filter or the oracle
    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Result type for learner operations.
pub type LearnResult<T> = Result<T, LearnError>;
