//! Canonical form of a (possibly shifted) linear problem.
//!
//! The iterative solvers only ever see `apply(x) = rhs`. This module turns
//! `(A - M diag(E)) X = B` into that form:
//!
//! - without `E`, `apply` is `A.mm` and the columns of `B` stay in place;
//! - with `E`, the column axis of `B` is moved to a new leading batch axis,
//!   `(ncols, *BB, nr, 1)`, so that each column gets its own shift and
//!   `apply(x) = A x - E_col (M x)`; the solution must be moved back with
//!   [`LinearProblem::restore_columns`].
//!
//! If the operator is not positive definite (declared, or estimated by power
//! iteration) the problem is rewritten as the normal equations
//! `A^T A x = A^T b`.

use linop_core::{normalize_bcast_dims, BatchShape, Tensor};

use crate::error::{Error, Result};
use crate::operator::LinOp;
use crate::primitives::{column_norm, get_largest_eival, safedenom};

/// Strict broadcast of the batch dimensions taking part in a solve.
///
/// `E` joins when given; `M` only joins together with `E`, since it is
/// ignored otherwise.
pub fn get_batchdims(a: &LinOp, b: &Tensor, e: Option<&Tensor>, m: Option<&LinOp>) -> Result<BatchShape> {
    if b.ndim() < 2 {
        return Err(Error::Shape(format!(
            "right-hand side needs at least two axes, got shape {:?}",
            b.shape()
        )));
    }
    let mut dims: Vec<&[usize]> = vec![a.batch_shape(), b.batch_shape()];
    if let Some(e) = e {
        dims.push(e_batch(e)?);
        if let Some(m) = m {
            dims.push(m.batch_shape());
        }
    }
    Ok(BatchShape::broadcast(&dims)?)
}

fn e_batch(e: &Tensor) -> Result<&[usize]> {
    if e.ndim() == 0 {
        return Err(Error::Shape("shift E needs at least one axis".into()));
    }
    Ok(&e.shape()[..e.ndim() - 1])
}

/// Operator, right-hand side and bookkeeping for one solve.
#[derive(Debug, Clone)]
pub struct LinearProblem {
    a: LinOp,
    m: Option<LinOp>,
    /// Per-column shift, `(ncols, *BE, 1, 1)`.
    shift: Option<Tensor>,
    rhs: Tensor,
    col_swapped: bool,
    posdef: bool,
    x0_shape: Vec<usize>,
}

impl LinearProblem {
    /// Apply the canonical operator.
    pub fn apply(&self, x: &Tensor) -> Result<Tensor> {
        if self.posdef {
            self.shifted(x)
        } else {
            self.shifted_adjoint(&self.shifted(x)?)
        }
    }

    /// Right-hand side of the canonical problem.
    pub fn rhs(&self) -> &Tensor {
        &self.rhs
    }

    /// Whether the column axis was moved to the front.
    pub fn col_swapped(&self) -> bool {
        self.col_swapped
    }

    /// Whether the operator was taken as positive definite, i.e. the normal
    /// equations were not needed.
    pub fn posdef(&self) -> bool {
        self.posdef
    }

    /// Shape of the iterates (and of the unrestored solution).
    pub fn x0_shape(&self) -> &[usize] {
        &self.x0_shape
    }

    /// Move the columns of a canonical solution back to the last axis.
    pub fn restore_columns(&self, x: Tensor) -> Result<Tensor> {
        if self.col_swapped {
            Ok(x.transpose(0, -1)?.squeeze(0)?)
        } else {
            Ok(x)
        }
    }

    /// `A x - E (M x)`.
    fn shifted(&self, x: &Tensor) -> Result<Tensor> {
        let ax = self.a.mm(x)?;
        match &self.shift {
            None => Ok(ax),
            Some(e) => {
                let mx = match &self.m {
                    Some(m) => m.mm(x)?,
                    None => x.clone(),
                };
                Ok(ax.sub(&mx.mul(e)?)?)
            }
        }
    }

    /// `A^T x - E (M^T x)`.
    fn shifted_adjoint(&self, x: &Tensor) -> Result<Tensor> {
        let atx = self.a.rmm(x)?;
        match &self.shift {
            None => Ok(atx),
            Some(e) => {
                let mtx = match &self.m {
                    Some(m) => m.rmm(x)?,
                    None => x.clone(),
                };
                Ok(atx.sub(&mtx.mul(e)?)?)
            }
        }
    }
}

/// Build the canonical problem.
///
/// `posdef = None` estimates positive definiteness with two rounds of power
/// iteration seeded by `seed`. With `need_hermit`, an operator that is not
/// declared hermitian (together with `M`) is always solved through the
/// normal equations.
#[allow(clippy::too_many_arguments)]
pub fn setup_linear_problem(
    a: &LinOp,
    b: &Tensor,
    e: Option<&Tensor>,
    m: Option<&LinOp>,
    batchdims: &BatchShape,
    posdef: Option<bool>,
    need_hermit: bool,
    seed: u64,
) -> Result<LinearProblem> {
    if b.ndim() < 2 {
        return Err(Error::Shape(format!(
            "right-hand side needs at least two axes, got shape {:?}",
            b.shape()
        )));
    }
    let nr = b.dim(-2)?;
    let ncols = b.dim(-1)?;

    let (shift, rhs, col_swapped) = match e {
        None => (None, b.clone(), false),
        Some(e) => {
            let mut shapes: Vec<&[usize]> = vec![a.batch_shape(), b.batch_shape(), e_batch(e)?];
            if let Some(m) = m {
                shapes.push(m.batch_shape());
            }
            let padded = normalize_bcast_dims(&shapes)?;

            let mut e_shape = padded[2].clone();
            e_shape.push(e.dim(-1)?);
            // (ncols, *BE, 1, 1)
            let shift = e
                .reshape(&e_shape)?
                .unsqueeze(0)?
                .transpose(-1, 0)?
                .unsqueeze(-1)?;

            let mut b_shape = padded[1].clone();
            b_shape.extend_from_slice(&[nr, ncols]);
            // (ncols, *BB, nr, 1)
            let rhs = b.reshape(&b_shape)?.unsqueeze(0)?.transpose(-1, 0)?;

            (Some(shift), rhs, true)
        }
    };

    let x0_shape = if col_swapped {
        batchdims.with_leading_and_matrix(ncols, nr, 1)
    } else {
        batchdims.with_matrix(nr, ncols)
    };

    let mut problem = LinearProblem {
        a: a.clone(),
        m: m.cloned(),
        shift,
        rhs,
        col_swapped,
        posdef: true,
        x0_shape,
    };

    let mut posdef = posdef;
    if need_hermit {
        let is_hermit = a.is_hermitian() && m.map_or(true, |m| m.is_hermitian());
        if !is_hermit {
            posdef = Some(false);
        }
    }

    let posdef = match posdef {
        Some(p) => p,
        None => estimate_posdef(&problem, seed)?,
    };
    log::debug!(
        "linear problem: shape {:?}, col_swapped {}, posdef {}",
        problem.x0_shape,
        col_swapped,
        posdef
    );

    if !posdef {
        problem.rhs = problem.shifted_adjoint(&problem.rhs)?;
        problem.posdef = false;
    }
    Ok(problem)
}

/// Power-iteration test for positive definiteness of the shifted operator.
fn estimate_posdef(problem: &LinearProblem, seed: u64) -> Result<bool> {
    let x0 = Tensor::randn(&problem.x0_shape, seed);
    let x0 = x0.div(&safedenom(&column_norm(&x0)?, 1e-12))?;

    let largest = get_largest_eival(|x| problem.shifted(x), &x0)?;
    let negeival = largest.map(|v| if v <= 0.0 { 1.0 } else { 0.0 });
    if negeival.all(|v| v == 1.0) {
        return Ok(false);
    }

    let offset = largest.map(|v| v.max(0.0));
    let mostneg = get_largest_eival(|x| Ok(problem.shifted(x)?.sub(&x.mul(&offset)?)?), &x0)?;

    // -mostneg <= offset, or the dominant eigenvalue was already non-positive
    let bounded = mostneg.map(|v| -v).zip_with(&offset, |nm, off| if nm <= off { 1.0 } else { 0.0 })?;
    let ok = bounded.zip_with(&negeival, |a, b| a.max(b))?;
    Ok(ok.all(|v| v == 1.0))
}
