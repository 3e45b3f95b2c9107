//! Error types for linop-krylov.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid dimensions: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("operator application failed: {0}")]
    Operator(String),
}

pub type Result<T> = std::result::Result<T, Error>;
