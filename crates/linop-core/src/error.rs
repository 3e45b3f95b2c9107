//! Error types for linop-core.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot broadcast shapes {left:?} and {right:?}")]
    Broadcast { left: Vec<usize>, right: Vec<usize> },

    #[error("invalid shape: {0}")]
    Shape(String),

    #[error("invalid matrix dimensions: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("axis {axis} out of range for a tensor of rank {ndim}")]
    Axis { axis: isize, ndim: usize },

    #[error("singular matrix")]
    SingularMatrix,

    #[error("matrix is not positive definite")]
    NotPositiveDefinite,
}

impl Error {
    /// Whether this error describes irreconcilable shapes rather than a
    /// numerical failure.
    pub fn is_shape_error(&self) -> bool {
        matches!(
            self,
            Error::Broadcast { .. }
                | Error::Shape(_)
                | Error::DimensionMismatch { .. }
                | Error::Axis { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
