//! Operator abstraction for the slice-level solvers.

use crate::error::{Error, Result};

/// A square linear operator computing `y = A * x` on real vectors.
///
/// `apply` is fallible so that operators backed by a larger runtime (batched
/// tensors, remote kernels) can report their own failures instead of
/// panicking inside the iteration.
pub trait RealOperator {
    /// Dimension of the operator (N x N).
    fn dim(&self) -> usize;

    /// Apply the operator: y = A * x.
    ///
    /// `x` and `y` both have length `dim()`.
    fn apply(&self, x: &[f64], y: &mut [f64]) -> Result<()>;
}

/// Dense square operator stored row-major.
#[derive(Debug, Clone)]
pub struct RowMajorOperator {
    n: usize,
    data: Vec<f64>,
}

impl RowMajorOperator {
    /// Wrap `n * n` row-major entries.
    pub fn new(n: usize, data: Vec<f64>) -> Result<Self> {
        if data.len() != n * n {
            return Err(Error::DimensionMismatch {
                expected: n * n,
                actual: data.len(),
            });
        }
        Ok(Self { n, data })
    }
}

impl RealOperator for RowMajorOperator {
    fn dim(&self) -> usize {
        self.n
    }

    fn apply(&self, x: &[f64], y: &mut [f64]) -> Result<()> {
        if x.len() != self.n || y.len() != self.n {
            return Err(Error::DimensionMismatch {
                expected: self.n,
                actual: x.len().min(y.len()),
            });
        }
        for (row, yi) in self.data.chunks_exact(self.n).zip(y.iter_mut()) {
            *yi = row.iter().zip(x).map(|(a, b)| a * b).sum();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_major_apply() {
        let op = RowMajorOperator::new(2, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(op.dim(), 2);

        let mut y = vec![0.0; 2];
        op.apply(&[1.0, 1.0], &mut y).unwrap();
        assert_eq!(y, vec![3.0, 7.0]);
    }

    #[test]
    fn row_major_rejects_bad_lengths() {
        assert!(RowMajorOperator::new(2, vec![1.0; 3]).is_err());

        let op = RowMajorOperator::new(2, vec![1.0; 4]).unwrap();
        let mut y = vec![0.0; 3];
        assert!(matches!(
            op.apply(&[1.0, 1.0, 1.0], &mut y),
            Err(Error::DimensionMismatch { expected: 2, .. })
        ));
    }
}
