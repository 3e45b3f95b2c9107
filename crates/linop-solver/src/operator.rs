//! Linear operator abstraction.
//!
//! A linear operator is a possibly implicit map of shape `(*batch, nr, nc)`.
//! Implementors of [`LinearOperator`] only provide the forward and adjoint
//! products; the validated public surface (`mv`, `mm`, `rmv`, `rmm`,
//! `fullmatrix`, composition) lives on the shared handle [`LinOp`].
//!
//! Composite operators hold `Arc`-shared children and are never mutated after
//! construction, so one operator can back any number of solves.

use std::fmt;
use std::ops::{Add, Mul, Neg, Sub};
use std::sync::Arc;

use linop_core::{BatchShape, Tensor};

use crate::error::{Error, Result};

/// A named differentiable tensor held by an operator.
#[derive(Debug, Clone)]
pub struct ParamRef<'a> {
    pub name: String,
    pub value: &'a Tensor,
}

/// Operator implementation hooks.
///
/// `apply` receives `x` of shape `(*BX, nc, k)` and must return
/// `(*bcast(batch, BX), nr, k)`. `apply_adjoint` is the same with `nr` and
/// `nc` swapped. Inputs are validated by [`LinOp`] before either hook runs.
pub trait LinearOperator: fmt::Debug + Send + Sync {
    /// Full shape `(*batch, nr, nc)`.
    fn shape(&self) -> &[usize];

    /// Forward product `A @ x`.
    fn apply(&self, x: &Tensor) -> Result<Tensor>;

    /// Adjoint product `A^T @ x`.
    fn apply_adjoint(&self, x: &Tensor) -> Result<Tensor>;

    fn is_hermitian(&self) -> bool {
        false
    }

    /// Dense representation, if one is held without computing it.
    fn to_dense(&self) -> Option<Tensor> {
        None
    }

    /// Whether the operator is backed by an explicit dense matrix.
    fn is_materialized(&self) -> bool {
        false
    }

    /// Differentiable tensors, names prefixed with `prefix`.
    fn params(&self, _prefix: &str) -> Vec<ParamRef<'_>> {
        Vec::new()
    }

    /// The operator this one is the adjoint of.
    fn adjoint_source(&self) -> Option<&LinOp> {
        None
    }
}

/// Shared handle to a linear operator.
#[derive(Debug, Clone)]
pub struct LinOp(Arc<dyn LinearOperator>);

impl LinOp {
    /// Wrap a custom operator. Its shape must have the two matrix axes.
    pub fn new<T: LinearOperator + 'static>(op: T) -> Result<Self> {
        if op.shape().len() < 2 {
            return Err(Error::Shape(format!(
                "an operator needs at least 2 dimensions, got {:?}",
                op.shape()
            )));
        }
        Ok(Self::wrap(op))
    }

    fn wrap<T: LinearOperator + 'static>(op: T) -> Self {
        Self(Arc::new(op))
    }

    /// Wrap a dense (batched) matrix.
    pub fn from_matrix(mat: Tensor, is_hermitian: bool) -> Result<Self> {
        Ok(Self::wrap(MatrixOperator::new(mat, is_hermitian)?))
    }

    pub fn shape(&self) -> &[usize] {
        self.0.shape()
    }

    pub fn batch_shape(&self) -> &[usize] {
        let shape = self.shape();
        &shape[..shape.len() - 2]
    }

    pub fn nrows(&self) -> usize {
        let shape = self.shape();
        shape[shape.len() - 2]
    }

    pub fn ncols(&self) -> usize {
        let shape = self.shape();
        shape[shape.len() - 1]
    }

    pub fn is_square(&self) -> bool {
        self.nrows() == self.ncols()
    }

    pub fn is_hermitian(&self) -> bool {
        self.0.is_hermitian()
    }

    pub fn is_materialized(&self) -> bool {
        self.0.is_materialized()
    }

    /// Apply to vectors: `(*BX, nc) -> (*bcast, nr)`.
    pub fn mv(&self, x: &Tensor) -> Result<Tensor> {
        if x.ndim() == 0 {
            return Err(Error::Shape("mv expects at least one axis".into()));
        }
        let y = self.mm(&x.unsqueeze(-1)?)?;
        Ok(y.squeeze(-1)?)
    }

    /// Apply to column blocks: `(*BX, nc, k) -> (*bcast, nr, k)`.
    pub fn mm(&self, x: &Tensor) -> Result<Tensor> {
        self.check_input(x, self.ncols(), "mm")?;
        let y = self.0.apply(x)?;
        self.check_output(&y, self.nrows(), x, "mm")?;
        Ok(y)
    }

    /// Adjoint applied to vectors: `(*BX, nr) -> (*bcast, nc)`.
    pub fn rmv(&self, x: &Tensor) -> Result<Tensor> {
        if x.ndim() == 0 {
            return Err(Error::Shape("rmv expects at least one axis".into()));
        }
        let y = self.rmm(&x.unsqueeze(-1)?)?;
        Ok(y.squeeze(-1)?)
    }

    /// Adjoint applied to column blocks: `(*BX, nr, k) -> (*bcast, nc, k)`.
    pub fn rmm(&self, x: &Tensor) -> Result<Tensor> {
        if self.is_hermitian() {
            return self.mm(x);
        }
        self.check_input(x, self.nrows(), "rmm")?;
        let y = self.0.apply_adjoint(x)?;
        self.check_output(&y, self.ncols(), x, "rmm")?;
        Ok(y)
    }

    /// Dense matrix of shape `(*batch, nr, nc)`.
    ///
    /// Composite operators are materialised by applying them to the
    /// identity, which costs `nc` products and `O(nr * nc)` memory per batch
    /// entry.
    pub fn fullmatrix(&self) -> Result<Tensor> {
        match self.0.to_dense() {
            Some(dense) => Ok(dense),
            None => self.mm(&Tensor::eye(self.ncols())),
        }
    }

    pub fn add(&self, other: &LinOp) -> Result<LinOp> {
        Ok(LinOp::wrap(AddOperator::new(self.clone(), other.clone(), 1.0)?))
    }

    pub fn sub(&self, other: &LinOp) -> Result<LinOp> {
        Ok(LinOp::wrap(AddOperator::new(self.clone(), other.clone(), -1.0)?))
    }

    pub fn scale(&self, factor: f64) -> LinOp {
        LinOp::wrap(MulOperator::new(self.clone(), factor))
    }

    pub fn neg(&self) -> LinOp {
        self.scale(-1.0)
    }

    /// Operator product `self @ other`.
    pub fn matmul(&self, other: &LinOp) -> Result<LinOp> {
        Ok(LinOp::wrap(MatmulOperator::new(self.clone(), other.clone())?))
    }

    /// Adjoint operator.
    pub fn h(&self) -> LinOp {
        if self.is_hermitian() {
            return self.clone();
        }
        match self.0.adjoint_source() {
            Some(source) => source.clone(),
            None => LinOp::wrap(AdjointOperator::new(self.clone())),
        }
    }

    /// Differentiable tensors of the whole operator graph.
    pub fn params(&self) -> Vec<ParamRef<'_>> {
        self.0.params("")
    }

    /// Probe the operator with random inputs and verify that its products
    /// agree with each other and with the declared shape and symmetry.
    pub fn check(&self) -> Result<()> {
        self.check_with_seed(0x11ac_0e5e)
    }

    pub fn check_with_seed(&self, seed: u64) -> Result<()> {
        let (nr, nc) = (self.nrows(), self.ncols());
        let batch = BatchShape::new(self.batch_shape());

        let mut xshape = batch.to_vec();
        xshape.push(nc);
        let mut yshape = batch.to_vec();
        yshape.push(nr);
        let x = Tensor::randn(&xshape, seed);
        let y = Tensor::randn(&yshape, seed.wrapping_add(1));

        let ax = self.mv(&x)?;
        if ax.shape() != yshape.as_slice() {
            return Err(Error::Contract(format!(
                "mv returned shape {:?}, expected {:?}",
                ax.shape(),
                yshape
            )));
        }
        let ax_mm = self.mm(&x.unsqueeze(-1)?)?.squeeze(-1)?;
        ensure_close(&ax, &ax_mm, "mv and mm disagree")?;

        let aty = self.rmv(&y)?;
        if aty.shape() != xshape.as_slice() {
            return Err(Error::Contract(format!(
                "rmv returned shape {:?}, expected {:?}",
                aty.shape(),
                xshape
            )));
        }
        let aty_mm = self.rmm(&y.unsqueeze(-1)?)?.squeeze(-1)?;
        ensure_close(&aty, &aty_mm, "rmv and rmm disagree")?;

        // <y, A x> == <A^T y, x>
        let lhs = y.mul(&ax)?.sum_dim(-1, false)?;
        let rhs = aty.mul(&x)?.sum_dim(-1, false)?;
        ensure_close(&lhs, &rhs, "rmv is not the adjoint of mv")?;

        let xs = Tensor::randn(&batch.with_matrix(nc, 3), seed.wrapping_add(2));
        let dense = self.fullmatrix()?;
        ensure_close(&self.mm(&xs)?, &dense.matmul(&xs)?, "fullmatrix and mm disagree")?;

        if self.is_hermitian() {
            if nr != nc {
                return Err(Error::Contract(format!(
                    "hermitian operator must be square, got {} x {}",
                    nr, nc
                )));
            }
            ensure_close(
                &dense,
                &dense.matrix_transpose()?,
                "operator is declared hermitian but is not symmetric",
            )?;
        }

        Ok(())
    }

    fn check_input(&self, x: &Tensor, rows: usize, op: &str) -> Result<()> {
        if x.ndim() < 2 {
            return Err(Error::Shape(format!(
                "{} expects at least two axes, got shape {:?}",
                op,
                x.shape()
            )));
        }
        if x.shape()[x.ndim() - 2] != rows {
            return Err(Error::Shape(format!(
                "{} on an operator of shape {:?} got input of shape {:?}",
                op,
                self.shape(),
                x.shape()
            )));
        }
        BatchShape::broadcast(&[self.batch_shape(), x.batch_shape()])?;
        Ok(())
    }

    fn check_output(&self, y: &Tensor, rows: usize, x: &Tensor, op: &str) -> Result<()> {
        let cols = x.shape()[x.ndim() - 1];
        let ok = y.ndim() >= 2 && y.shape()[y.ndim() - 2] == rows && y.shape()[y.ndim() - 1] == cols;
        if !ok {
            return Err(Error::Contract(format!(
                "{} returned shape {:?}, expected trailing dims ({}, {})",
                op,
                y.shape(),
                rows,
                cols
            )));
        }
        Ok(())
    }

    fn prefixed_params(&self, prefix: &str) -> Vec<ParamRef<'_>> {
        self.0.params(prefix)
    }
}

fn ensure_close(a: &Tensor, b: &Tensor, what: &str) -> Result<()> {
    if a.allclose(b, 1e-6, 1e-8) {
        Ok(())
    } else {
        Err(Error::Contract(what.to_string()))
    }
}

fn full_shape(batch: &[usize], rows: usize, cols: usize) -> Vec<usize> {
    BatchShape::new(batch).with_matrix(rows, cols)
}

impl Add for &LinOp {
    type Output = Result<LinOp>;

    fn add(self, rhs: &LinOp) -> Result<LinOp> {
        LinOp::add(self, rhs)
    }
}

impl Sub for &LinOp {
    type Output = Result<LinOp>;

    fn sub(self, rhs: &LinOp) -> Result<LinOp> {
        LinOp::sub(self, rhs)
    }
}

impl Mul<f64> for &LinOp {
    type Output = LinOp;

    fn mul(self, rhs: f64) -> LinOp {
        self.scale(rhs)
    }
}

impl Neg for &LinOp {
    type Output = LinOp;

    fn neg(self) -> LinOp {
        LinOp::neg(self)
    }
}

// ----------------------------------------------------------------------
// Leaf
// ----------------------------------------------------------------------

/// Operator backed by a dense (batched) matrix.
#[derive(Debug, Clone)]
pub struct MatrixOperator {
    mat: Tensor,
    hermitian: bool,
}

impl MatrixOperator {
    /// Wrap `mat` of shape `(*batch, nr, nc)`.
    ///
    /// A matrix declared hermitian that is not symmetric is accepted, but a
    /// warning is logged: solvers will silently use the wrong adjoint.
    pub fn new(mat: Tensor, is_hermitian: bool) -> Result<Self> {
        let op = Self::new_quiet(mat, is_hermitian)?;
        if is_hermitian && !op.mat.allclose(&op.mat.matrix_transpose()?, 1e-5, 1e-8) {
            log::warn!(
                "matrix of shape {:?} is declared hermitian but is not symmetric",
                op.mat.shape()
            );
        }
        Ok(op)
    }

    /// Like [`MatrixOperator::new`] without the symmetry check.
    pub fn new_quiet(mat: Tensor, is_hermitian: bool) -> Result<Self> {
        if mat.ndim() < 2 {
            return Err(Error::Shape(format!(
                "operator matrix needs at least two axes, got shape {:?}",
                mat.shape()
            )));
        }
        let n = mat.ndim();
        if is_hermitian && mat.shape()[n - 2] != mat.shape()[n - 1] {
            return Err(Error::Shape(format!(
                "hermitian operator must be square, got shape {:?}",
                mat.shape()
            )));
        }
        Ok(Self {
            mat,
            hermitian: is_hermitian,
        })
    }

    pub fn matrix(&self) -> &Tensor {
        &self.mat
    }
}

impl LinearOperator for MatrixOperator {
    fn shape(&self) -> &[usize] {
        self.mat.shape()
    }

    fn apply(&self, x: &Tensor) -> Result<Tensor> {
        Ok(self.mat.matmul(x)?)
    }

    fn apply_adjoint(&self, x: &Tensor) -> Result<Tensor> {
        Ok(self.mat.matrix_transpose()?.matmul(x)?)
    }

    fn is_hermitian(&self) -> bool {
        self.hermitian
    }

    fn to_dense(&self) -> Option<Tensor> {
        Some(self.mat.clone())
    }

    fn is_materialized(&self) -> bool {
        true
    }

    fn params(&self, prefix: &str) -> Vec<ParamRef<'_>> {
        vec![ParamRef {
            name: format!("{}mat", prefix),
            value: &self.mat,
        }]
    }
}

// ----------------------------------------------------------------------
// Composites
// ----------------------------------------------------------------------

/// `a + mult * b` with `mult` either 1 or -1.
#[derive(Debug)]
pub struct AddOperator {
    a: LinOp,
    b: LinOp,
    mult: f64,
    shape: Vec<usize>,
}

impl AddOperator {
    pub fn new(a: LinOp, b: LinOp, mult: f64) -> Result<Self> {
        if (a.nrows(), a.ncols()) != (b.nrows(), b.ncols()) {
            return Err(Error::Shape(format!(
                "cannot add operators of shapes {:?} and {:?}",
                a.shape(),
                b.shape()
            )));
        }
        let batch = BatchShape::broadcast(&[a.batch_shape(), b.batch_shape()])?;
        let shape = batch.with_matrix(a.nrows(), a.ncols());
        Ok(Self { a, b, mult, shape })
    }
}

impl LinearOperator for AddOperator {
    fn shape(&self) -> &[usize] {
        &self.shape
    }

    fn apply(&self, x: &Tensor) -> Result<Tensor> {
        let bx = self.b.mm(x)?.scale(self.mult);
        Ok(self.a.mm(x)?.add(&bx)?)
    }

    fn apply_adjoint(&self, x: &Tensor) -> Result<Tensor> {
        let bx = self.b.rmm(x)?.scale(self.mult);
        Ok(self.a.rmm(x)?.add(&bx)?)
    }

    fn is_hermitian(&self) -> bool {
        self.a.is_hermitian() && self.b.is_hermitian()
    }

    fn params(&self, prefix: &str) -> Vec<ParamRef<'_>> {
        let mut params = self.a.prefixed_params(&format!("{}a.", prefix));
        params.extend(self.b.prefixed_params(&format!("{}b.", prefix)));
        params
    }
}

/// Scalar multiple of an operator.
#[derive(Debug)]
pub struct MulOperator {
    a: LinOp,
    factor: f64,
}

impl MulOperator {
    pub fn new(a: LinOp, factor: f64) -> Self {
        Self { a, factor }
    }
}

impl LinearOperator for MulOperator {
    fn shape(&self) -> &[usize] {
        self.a.shape()
    }

    fn apply(&self, x: &Tensor) -> Result<Tensor> {
        Ok(self.a.mm(x)?.scale(self.factor))
    }

    fn apply_adjoint(&self, x: &Tensor) -> Result<Tensor> {
        Ok(self.a.rmm(x)?.scale(self.factor))
    }

    fn is_hermitian(&self) -> bool {
        self.a.is_hermitian()
    }

    fn params(&self, prefix: &str) -> Vec<ParamRef<'_>> {
        self.a.prefixed_params(&format!("{}a.", prefix))
    }
}

/// Operator product `a @ b`.
#[derive(Debug)]
pub struct MatmulOperator {
    a: LinOp,
    b: LinOp,
    shape: Vec<usize>,
}

impl MatmulOperator {
    pub fn new(a: LinOp, b: LinOp) -> Result<Self> {
        if a.ncols() != b.nrows() {
            return Err(Error::Shape(format!(
                "cannot multiply operators of shapes {:?} and {:?}",
                a.shape(),
                b.shape()
            )));
        }
        let batch = BatchShape::broadcast(&[a.batch_shape(), b.batch_shape()])?;
        let shape = batch.with_matrix(a.nrows(), b.ncols());
        Ok(Self { a, b, shape })
    }
}

impl LinearOperator for MatmulOperator {
    fn shape(&self) -> &[usize] {
        &self.shape
    }

    fn apply(&self, x: &Tensor) -> Result<Tensor> {
        self.a.mm(&self.b.mm(x)?)
    }

    fn apply_adjoint(&self, x: &Tensor) -> Result<Tensor> {
        self.b.rmm(&self.a.rmm(x)?)
    }

    fn params(&self, prefix: &str) -> Vec<ParamRef<'_>> {
        let mut params = self.a.prefixed_params(&format!("{}a.", prefix));
        params.extend(self.b.prefixed_params(&format!("{}b.", prefix)));
        params
    }
}

/// Adjoint (transpose) of an operator.
#[derive(Debug)]
pub struct AdjointOperator {
    source: LinOp,
    shape: Vec<usize>,
}

impl AdjointOperator {
    pub fn new(source: LinOp) -> Self {
        let shape = full_shape(source.batch_shape(), source.ncols(), source.nrows());
        Self { source, shape }
    }
}

impl LinearOperator for AdjointOperator {
    fn shape(&self) -> &[usize] {
        &self.shape
    }

    fn apply(&self, x: &Tensor) -> Result<Tensor> {
        self.source.rmm(x)
    }

    fn apply_adjoint(&self, x: &Tensor) -> Result<Tensor> {
        self.source.mm(x)
    }

    fn is_hermitian(&self) -> bool {
        self.source.is_hermitian()
    }

    fn params(&self, prefix: &str) -> Vec<ParamRef<'_>> {
        self.source.prefixed_params(&format!("{}source.", prefix))
    }

    fn adjoint_source(&self) -> Option<&LinOp> {
        Some(&self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nonsym() -> LinOp {
        LinOp::from_matrix(Tensor::from_rows(&[[1.0, 2.0], [3.0, 4.0]]), false).unwrap()
    }

    fn sym() -> LinOp {
        LinOp::from_matrix(Tensor::from_rows(&[[2.0, 1.0], [1.0, 3.0]]), true).unwrap()
    }

    /// Diagonal operator that only knows how to apply itself.
    #[derive(Debug)]
    struct Diag {
        diag: Tensor,
        shape: Vec<usize>,
    }

    impl Diag {
        fn new(values: Vec<f64>) -> Self {
            let n = values.len();
            Self {
                diag: Tensor::new(vec![n, 1], values).unwrap(),
                shape: vec![n, n],
            }
        }
    }

    impl LinearOperator for Diag {
        fn shape(&self) -> &[usize] {
            &self.shape
        }

        fn apply(&self, x: &Tensor) -> Result<Tensor> {
            Ok(x.mul(&self.diag)?)
        }

        fn apply_adjoint(&self, x: &Tensor) -> Result<Tensor> {
            self.apply(x)
        }
    }

    #[test]
    fn mv_and_mm_shapes() {
        let a = nonsym();
        let x = Tensor::from_vec(vec![1.0, 1.0]);
        let y = a.mv(&x).unwrap();
        assert_eq!(y.shape(), &[2]);
        assert_eq!(y.data(), &[3.0, 7.0]);

        let xs = Tensor::zeros(&[5, 2, 3]);
        assert_eq!(a.mm(&xs).unwrap().shape(), &[5, 2, 3]);
    }

    #[test]
    fn mm_rejects_wrong_rows() {
        let a = nonsym();
        let err = a.mm(&Tensor::zeros(&[3, 1])).unwrap_err();
        assert!(err.is_shape_error());
    }

    #[test]
    fn mm_rejects_incompatible_batch() {
        let a = LinOp::from_matrix(Tensor::zeros(&[3, 2, 2]), false).unwrap();
        let err = a.mm(&Tensor::zeros(&[4, 2, 1])).unwrap_err();
        assert!(err.is_shape_error());
    }

    #[test]
    fn rmv_is_transpose() {
        let a = nonsym();
        let y = a.rmv(&Tensor::from_vec(vec![1.0, 0.0])).unwrap();
        assert_eq!(y.data(), &[1.0, 2.0]);
    }

    #[test]
    fn adjoint_law() {
        let a = nonsym();
        let x = Tensor::from_vec(vec![0.3, -1.2]);
        let via_h = a.h().mv(&x).unwrap();
        let via_rmv = a.rmv(&x).unwrap();
        assert!(via_h.allclose(&via_rmv, 1e-12, 1e-12));
    }

    #[test]
    fn adjoint_of_adjoint_is_source() {
        let a = nonsym();
        let ah = a.h();
        assert_eq!(ah.shape(), &[2, 2]);
        let back = ah.h();
        assert!(Arc::ptr_eq(&back.0, &a.0));

        let s = sym();
        assert!(Arc::ptr_eq(&s.h().0, &s.0));
    }

    #[test]
    fn composite_linearity() {
        let a = nonsym();
        let b = sym();
        let x = Tensor::from_rows(&[[1.0, 0.5], [-2.0, 3.0]]);

        let sum = (&a + &b).unwrap();
        let expected = a.mm(&x).unwrap().add(&b.mm(&x).unwrap()).unwrap();
        assert!(sum.mm(&x).unwrap().allclose(&expected, 1e-12, 1e-12));

        let diff = (&a - &b).unwrap();
        let expected = a.mm(&x).unwrap().sub(&b.mm(&x).unwrap()).unwrap();
        assert!(diff.mm(&x).unwrap().allclose(&expected, 1e-12, 1e-12));

        let v = Tensor::from_vec(vec![1.0, 2.0]);
        let scaled = &a * 2.5;
        let expected = a.mv(&v).unwrap().scale(2.5);
        assert!(scaled.mv(&v).unwrap().allclose(&expected, 1e-12, 1e-12));

        let negated = -&a;
        assert!(negated.mv(&v).unwrap().allclose(&a.mv(&v).unwrap().scale(-1.0), 0.0, 0.0));
    }

    #[test]
    fn matmul_composite() {
        let a = nonsym();
        let b = sym();
        let ab = a.matmul(&b).unwrap();
        let dense = a.fullmatrix().unwrap().matmul(&b.fullmatrix().unwrap()).unwrap();
        assert!(ab.fullmatrix().unwrap().allclose(&dense, 1e-12, 1e-12));
        assert!(!ab.is_hermitian());

        let tall = LinOp::from_matrix(Tensor::zeros(&[3, 2]), false).unwrap();
        assert!(tall.matmul(&tall).unwrap_err().is_shape_error());
    }

    #[test]
    fn add_rejects_mismatched_shapes() {
        let a = nonsym();
        let c = LinOp::from_matrix(Tensor::zeros(&[3, 3]), false).unwrap();
        assert!((&a + &c).unwrap_err().is_shape_error());

        let b3 = LinOp::from_matrix(Tensor::zeros(&[3, 2, 2]), false).unwrap();
        let b4 = LinOp::from_matrix(Tensor::zeros(&[4, 2, 2]), false).unwrap();
        assert!((&b3 + &b4).unwrap_err().is_shape_error());
    }

    #[test]
    fn hermitian_flags_propagate() {
        let s = sym();
        assert!((&s + &s).unwrap().is_hermitian());
        assert!((&s * 3.0).is_hermitian());
        assert!(!(&s + &nonsym()).unwrap().is_hermitian());
    }

    #[test]
    fn fullmatrix_of_implicit_operator() {
        let d = LinOp::new(Diag::new(vec![1.0, 2.0, 3.0])).unwrap();
        assert!(!d.is_materialized());
        let dense = d.fullmatrix().unwrap();
        let expected = Tensor::from_vec(vec![1.0, 2.0, 3.0]).diag_embed().unwrap();
        assert_eq!(dense, expected);
    }

    #[test]
    fn check_accepts_builtin_operators() {
        let a = nonsym();
        let b = sym();
        a.check().unwrap();
        b.check().unwrap();
        (&a + &b).unwrap().check().unwrap();
        (&a - &b).unwrap().check().unwrap();
        (&a * -0.5).check().unwrap();
        a.matmul(&b).unwrap().check().unwrap();
        a.h().check().unwrap();
        LinOp::new(Diag::new(vec![1.0, 4.0])).unwrap().check().unwrap();

        let batched = LinOp::from_matrix(Tensor::randn(&[3, 4, 2], 9), false).unwrap();
        batched.check().unwrap();
    }

    #[test]
    fn check_rejects_false_hermitian_claim() {
        let mat = Tensor::from_rows(&[[1.0, 2.0], [3.0, 4.0]]);
        let op = LinOp::new(MatrixOperator::new_quiet(mat, true).unwrap()).unwrap();
        assert!(matches!(op.check(), Err(Error::Contract(_))));
    }

    #[test]
    fn params_are_prefixed() {
        let a = nonsym();
        let b = sym();
        let op = (&(&a + &b).unwrap() * 2.0).h();
        let names: Vec<String> = op.params().into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["source.a.a.mat", "source.a.b.mat"]);
    }

    #[test]
    fn hermitian_requires_square() {
        assert!(MatrixOperator::new(Tensor::zeros(&[2, 3]), true).is_err());
        assert!(MatrixOperator::new(Tensor::from_vec(vec![1.0]), false).is_err());
    }

    #[test]
    fn new_rejects_operator_without_matrix_axes() {
        let mut flat = Diag::new(vec![1.0, 2.0, 3.0]);
        flat.shape = vec![3];
        let err = LinOp::new(flat).unwrap_err();
        assert!(matches!(err, Error::Shape(_)));
        assert!(err.is_shape_error());

        let mut scalar = Diag::new(vec![1.0]);
        scalar.shape = Vec::new();
        assert!(matches!(LinOp::new(scalar), Err(Error::Shape(_))));
    }
}
