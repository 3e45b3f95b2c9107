//! Batched dense tensors.
//!
//! A [`Tensor`] wraps an `ndarray::ArrayD<f64>` kept in standard (row-major)
//! layout. Linear-algebra methods read the last two axes as a matrix (rows,
//! columns) and treat every leading axis as a batch axis; batch axes
//! broadcast against each other with the rules from [`crate::bcast`].
//!
//! Products run on ndarray views. LU solves, Cholesky factors and inverses
//! run per matrix through nalgebra.

use nalgebra::DMatrix;
use ndarray::{Array2, Array3, ArrayD, ArrayView3, Axis, IxDyn, ShapeError, Zip};

use crate::bcast::broadcast_shapes;
use crate::error::{Error, Result};
use crate::rng;

/// Row-major batched `f64` array.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    array: ArrayD<f64>,
}

fn shape_error(err: ShapeError) -> Error {
    Error::Shape(err.to_string())
}

impl Tensor {
    // ------------------------------------------------------------------
    // Construction
    // ------------------------------------------------------------------

    /// Wrap an ndarray array, copying it into standard layout if needed.
    pub fn from_array(array: ArrayD<f64>) -> Self {
        if array.is_standard_layout() {
            Self { array }
        } else {
            Self {
                array: array.as_standard_layout().into_owned(),
            }
        }
    }

    /// Build a tensor from a shape and row-major data.
    pub fn new(shape: impl Into<Vec<usize>>, data: Vec<f64>) -> Result<Self> {
        let shape = shape.into();
        let len = data.len();
        let array = ArrayD::from_shape_vec(IxDyn(&shape), data).map_err(|_| {
            Error::Shape(format!("data length {} does not match shape {:?}", len, shape))
        })?;
        Ok(Self { array })
    }

    /// Tensor of zeros.
    pub fn zeros(shape: &[usize]) -> Self {
        Self::full(shape, 0.0)
    }

    /// Tensor filled with `value`.
    pub fn full(shape: &[usize], value: f64) -> Self {
        Self {
            array: ArrayD::from_elem(IxDyn(shape), value),
        }
    }

    /// Rank-0 tensor.
    pub fn scalar(value: f64) -> Self {
        Self::full(&[], value)
    }

    /// `n x n` identity matrix.
    pub fn eye(n: usize) -> Self {
        Self {
            array: Array2::eye(n).into_dyn(),
        }
    }

    /// Rank-1 tensor.
    pub fn from_vec(data: Vec<f64>) -> Self {
        Self {
            array: ndarray::Array1::from_vec(data).into_dyn(),
        }
    }

    /// Matrix from fixed-width rows.
    pub fn from_rows<const N: usize>(rows: &[[f64; N]]) -> Self {
        Self {
            array: Array2::from_shape_fn((rows.len(), N), |(i, j)| rows[i][j]).into_dyn(),
        }
    }

    /// Matrix from an nalgebra matrix.
    pub fn from_matrix(m: &DMatrix<f64>) -> Self {
        Self {
            array: to_array2(m).into_dyn(),
        }
    }

    /// Standard-normal random tensor, reproducible for a fixed seed.
    pub fn randn(shape: &[usize], seed: u64) -> Self {
        let mut flat = 0u64;
        let array = ArrayD::from_shape_simple_fn(IxDyn(shape), || {
            let value = rng::gaussian(seed, 0, flat);
            flat += 1;
            value
        });
        Self { array }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn shape(&self) -> &[usize] {
        self.array.shape()
    }

    pub fn ndim(&self) -> usize {
        self.array.ndim()
    }

    pub fn numel(&self) -> usize {
        self.array.len()
    }

    /// Elements in row-major order.
    pub fn data(&self) -> &[f64] {
        // every constructor keeps standard layout
        self.array.as_slice().unwrap_or(&[])
    }

    /// The underlying ndarray array.
    pub fn as_array(&self) -> &ArrayD<f64> {
        &self.array
    }

    /// Leading axes before the trailing matrix axes.
    pub fn batch_shape(&self) -> &[usize] {
        let shape = self.shape();
        &shape[..shape.len().saturating_sub(2)]
    }

    /// Resolve a possibly negative axis index.
    fn axis(&self, axis: isize) -> Result<usize> {
        resolve_axis(axis, self.ndim())
    }

    /// Length of a (possibly negative) axis.
    pub fn dim(&self, axis: isize) -> Result<usize> {
        Ok(self.shape()[self.axis(axis)?])
    }

    /// Convert a rank-2 tensor into an nalgebra matrix.
    pub fn to_matrix(&self) -> Result<DMatrix<f64>> {
        if self.ndim() != 2 {
            return Err(Error::Shape(format!(
                "expected a matrix, got shape {:?}",
                self.shape()
            )));
        }
        let m = self.array.view().into_dimensionality::<ndarray::Ix2>().map_err(shape_error)?;
        Ok(DMatrix::from_fn(m.nrows(), m.ncols(), |i, j| m[(i, j)]))
    }

    // ------------------------------------------------------------------
    // Shape manipulation
    // ------------------------------------------------------------------

    pub fn reshape(&self, shape: &[usize]) -> Result<Self> {
        if shape.iter().product::<usize>() != self.numel() {
            return Err(Error::Shape(format!(
                "cannot reshape {:?} into {:?}",
                self.shape(),
                shape
            )));
        }
        let array = self
            .array
            .clone()
            .into_shape_with_order(IxDyn(shape))
            .map_err(shape_error)?;
        Ok(Self { array })
    }

    /// Insert a length-1 axis. `axis` may range over `-(ndim + 1)..=ndim`.
    pub fn unsqueeze(&self, axis: isize) -> Result<Self> {
        let idx = resolve_axis(axis, self.ndim() + 1)?;
        Ok(Self::from_array(self.array.clone().insert_axis(Axis(idx))))
    }

    /// Remove a length-1 axis.
    pub fn squeeze(&self, axis: isize) -> Result<Self> {
        let idx = self.axis(axis)?;
        if self.shape()[idx] != 1 {
            return Err(Error::Shape(format!(
                "cannot squeeze axis {} of shape {:?}",
                axis,
                self.shape()
            )));
        }
        Ok(Self::from_array(self.array.clone().index_axis_move(Axis(idx), 0)))
    }

    /// Swap two axes.
    pub fn transpose(&self, a: isize, b: isize) -> Result<Self> {
        let (a, b) = (self.axis(a)?, self.axis(b)?);
        let mut view = self.array.view();
        view.swap_axes(a, b);
        Ok(Self {
            array: view.as_standard_layout().into_owned(),
        })
    }

    /// Transpose the trailing matrix axes.
    pub fn matrix_transpose(&self) -> Result<Self> {
        self.require_matrix("matrix_transpose")?;
        self.transpose(-2, -1)
    }

    /// Materialise this tensor broadcast to `shape`.
    pub fn broadcast_to(&self, shape: &[usize]) -> Result<Self> {
        let view = self.array.broadcast(IxDyn(shape)).ok_or_else(|| Error::Broadcast {
            left: self.shape().to_vec(),
            right: shape.to_vec(),
        })?;
        Ok(Self {
            array: view.as_standard_layout().into_owned(),
        })
    }

    // ------------------------------------------------------------------
    // Element-wise arithmetic
    // ------------------------------------------------------------------

    /// Combine two tensors element-wise with broadcasting.
    pub fn zip_with(&self, other: &Tensor, f: impl Fn(f64, f64) -> f64) -> Result<Self> {
        let shape = broadcast_shapes(&[self.shape(), other.shape()])?;
        let mismatch = || Error::Broadcast {
            left: self.shape().to_vec(),
            right: other.shape().to_vec(),
        };
        let lhs = self.array.broadcast(IxDyn(&shape)).ok_or_else(mismatch)?;
        let rhs = other.array.broadcast(IxDyn(&shape)).ok_or_else(mismatch)?;
        let array = Zip::from(lhs).and(rhs).map_collect(|&a, &b| f(a, b));
        Ok(Self::from_array(array))
    }

    pub fn add(&self, other: &Tensor) -> Result<Self> {
        self.zip_with(other, |a, b| a + b)
    }

    pub fn sub(&self, other: &Tensor) -> Result<Self> {
        self.zip_with(other, |a, b| a - b)
    }

    pub fn mul(&self, other: &Tensor) -> Result<Self> {
        self.zip_with(other, |a, b| a * b)
    }

    pub fn div(&self, other: &Tensor) -> Result<Self> {
        self.zip_with(other, |a, b| a / b)
    }

    pub fn map(&self, f: impl Fn(f64) -> f64) -> Self {
        Self {
            array: self.array.mapv(f),
        }
    }

    pub fn scale(&self, factor: f64) -> Self {
        self.map(|v| v * factor)
    }

    // ------------------------------------------------------------------
    // Reductions
    // ------------------------------------------------------------------

    /// Sum along one axis.
    pub fn sum_dim(&self, axis: isize, keepdim: bool) -> Result<Self> {
        let ax = Axis(self.axis(axis)?);
        let summed = self.array.sum_axis(ax);
        let array = if keepdim { summed.insert_axis(ax) } else { summed };
        Ok(Self::from_array(array))
    }

    /// Euclidean norm along one axis.
    pub fn norm_dim(&self, axis: isize, keepdim: bool) -> Result<Self> {
        Ok(self.map(|v| v * v).sum_dim(axis, keepdim)?.map(f64::sqrt))
    }

    /// Largest element (`-inf` for an empty tensor).
    pub fn max(&self) -> f64 {
        self.array.fold(f64::NEG_INFINITY, |acc, &v| acc.max(v))
    }

    pub fn all(&self, pred: impl Fn(f64) -> bool) -> bool {
        self.array.iter().all(|&v| pred(v))
    }

    /// `|a - b| <= atol + rtol * |b|` element-wise, with broadcasting.
    pub fn allclose(&self, other: &Tensor, rtol: f64, atol: f64) -> bool {
        match self.zip_with(other, |a, b| {
            if (a - b).abs() <= atol + rtol * b.abs() {
                1.0
            } else {
                0.0
            }
        }) {
            Ok(flags) => flags.all(|f| f == 1.0),
            Err(_) => false,
        }
    }

    // ------------------------------------------------------------------
    // Batched linear algebra
    // ------------------------------------------------------------------

    fn require_matrix(&self, op: &str) -> Result<(usize, usize)> {
        if self.ndim() < 2 {
            return Err(Error::Shape(format!(
                "{} requires at least 2 axes, got shape {:?}",
                op,
                self.shape()
            )));
        }
        let n = self.ndim();
        Ok((self.shape()[n - 2], self.shape()[n - 1]))
    }

    fn require_square(&self, op: &str) -> Result<usize> {
        let (r, c) = self.require_matrix(op)?;
        if r != c {
            return Err(Error::DimensionMismatch {
                expected: r,
                actual: c,
            });
        }
        Ok(r)
    }

    /// View the batch as a stack `(count, rows, cols)` of matrices.
    fn stack(&self) -> Result<ArrayView3<'_, f64>> {
        let (r, c) = self.require_matrix("batched operation")?;
        let count = self.batch_shape().iter().product();
        self.array
            .view()
            .into_shape_with_order((count, r, c))
            .map_err(shape_error)
    }

    fn from_stack(batch: &[usize], matrices: Vec<Array2<f64>>, rows: usize, cols: usize) -> Result<Self> {
        let mut stack = Array3::<f64>::zeros((matrices.len(), rows, cols));
        for (mut dst, src) in stack.outer_iter_mut().zip(&matrices) {
            dst.assign(src);
        }
        let mut shape = batch.to_vec();
        shape.extend_from_slice(&[rows, cols]);
        let array = stack.into_dyn().into_shape_with_order(IxDyn(&shape)).map_err(shape_error)?;
        Ok(Self { array })
    }

    /// Broadcast the batch axes of two matrix stacks against each other.
    fn broadcast_batches(&self, other: &Tensor) -> Result<(Vec<usize>, Tensor, Tensor)> {
        let (r1, c1) = self.require_matrix("batched operation")?;
        let (r2, c2) = other.require_matrix("batched operation")?;
        let batch = broadcast_shapes(&[self.batch_shape(), other.batch_shape()])?;

        let mut lhs_shape = batch.clone();
        lhs_shape.extend_from_slice(&[r1, c1]);
        let mut rhs_shape = batch.clone();
        rhs_shape.extend_from_slice(&[r2, c2]);

        Ok((batch, self.broadcast_to(&lhs_shape)?, other.broadcast_to(&rhs_shape)?))
    }

    /// Batched matrix product `(*A, n, k) @ (*B, k, m) -> (*AB, n, m)`.
    pub fn matmul(&self, other: &Tensor) -> Result<Self> {
        let (n, k) = self.require_matrix("matmul")?;
        let (k2, m) = other.require_matrix("matmul")?;
        if k != k2 {
            return Err(Error::DimensionMismatch {
                expected: k,
                actual: k2,
            });
        }

        let (batch, lhs, rhs) = self.broadcast_batches(other)?;
        let products = lhs
            .stack()?
            .outer_iter()
            .zip(rhs.stack()?.outer_iter())
            .map(|(a, b)| a.dot(&b))
            .collect();
        Self::from_stack(&batch, products, n, m)
    }

    /// Solve `self @ X = b` by LU decomposition for every batch entry.
    pub fn solve(&self, b: &Tensor) -> Result<Self> {
        let n = self.require_square("solve")?;
        let (nb, ncols) = b.require_matrix("solve")?;
        if nb != n {
            return Err(Error::DimensionMismatch {
                expected: n,
                actual: nb,
            });
        }

        let (batch, lhs, rhs) = self.broadcast_batches(b)?;
        let solutions = lhs
            .stack()?
            .outer_iter()
            .zip(rhs.stack()?.outer_iter())
            .map(|(a, b)| {
                to_dmatrix(a)
                    .lu()
                    .solve(&to_dmatrix(b))
                    .map(|x| to_array2(&x))
                    .ok_or(Error::SingularMatrix)
            })
            .collect::<Result<Vec<_>>>()?;
        Self::from_stack(&batch, solutions, n, ncols)
    }

    /// Lower Cholesky factor of every matrix in the batch.
    pub fn cholesky(&self) -> Result<Self> {
        let n = self.require_square("cholesky")?;
        let factors = self
            .stack()?
            .outer_iter()
            .map(|m| {
                to_dmatrix(m)
                    .cholesky()
                    .map(|c| to_array2(&c.l()))
                    .ok_or(Error::NotPositiveDefinite)
            })
            .collect::<Result<Vec<_>>>()?;
        Self::from_stack(self.batch_shape(), factors, n, n)
    }

    /// Inverse of every matrix in the batch.
    pub fn inverse(&self) -> Result<Self> {
        let n = self.require_square("inverse")?;
        let inverses = self
            .stack()?
            .outer_iter()
            .map(|m| {
                to_dmatrix(m)
                    .try_inverse()
                    .map(|inv| to_array2(&inv))
                    .ok_or(Error::SingularMatrix)
            })
            .collect::<Result<Vec<_>>>()?;
        Self::from_stack(self.batch_shape(), inverses, n, n)
    }

    /// `(*, n) -> (*, n, n)` with the input on the diagonal.
    pub fn diag_embed(&self) -> Result<Self> {
        let n = self.dim(-1)?;
        let count = self.numel() / n.max(1);
        let rows = self
            .array
            .view()
            .into_shape_with_order((count, n))
            .map_err(shape_error)?;

        let mut out = Array3::<f64>::zeros((count, n, n));
        for (mut m, row) in out.outer_iter_mut().zip(rows.outer_iter()) {
            m.diag_mut().assign(&row);
        }

        let mut shape = self.shape().to_vec();
        shape.push(n);
        let array = out.into_dyn().into_shape_with_order(IxDyn(&shape)).map_err(shape_error)?;
        Ok(Self { array })
    }
}

fn to_dmatrix(m: ndarray::ArrayView2<'_, f64>) -> DMatrix<f64> {
    DMatrix::from_fn(m.nrows(), m.ncols(), |i, j| m[(i, j)])
}

fn to_array2(m: &DMatrix<f64>) -> Array2<f64> {
    Array2::from_shape_fn(m.shape(), |(i, j)| m[(i, j)])
}

fn resolve_axis(axis: isize, ndim: usize) -> Result<usize> {
    let resolved = if axis < 0 { axis + ndim as isize } else { axis };
    if resolved < 0 || resolved as usize >= ndim {
        return Err(Error::Axis { axis, ndim });
    }
    Ok(resolved as usize)
}
