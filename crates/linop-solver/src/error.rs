//! Error types for linop-solver.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] linop_core::Error),

    #[error(transparent)]
    Krylov(#[from] linop_krylov::Error),

    #[error("shape mismatch: {0}")]
    Shape(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("operator contract violated: {0}")]
    Contract(String),

    #[error("invalid solver configuration: {0}")]
    Config(String),
}

impl Error {
    /// Whether the failure is an irreconcilable shape, raised before any
    /// numeric work.
    pub fn is_shape_error(&self) -> bool {
        match self {
            Error::Core(e) => e.is_shape_error(),
            Error::Krylov(linop_krylov::Error::DimensionMismatch { .. }) => true,
            Error::Shape(_) => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
