//! GMRES through the slice-level `linop-krylov` solver.
//!
//! Each (batch, column) system is copied out, solved on its own and copied
//! back. Only the plain problem `A X = B` with an unbatched `A` and a single
//! batch axis on `B` is supported.

use linop_core::Tensor;
use linop_krylov::{solve_gmres, GmresConfig, RealOperator};
use ndarray::{s, Array3, ArrayView1, Ix3};

use crate::error::{Error, Result};
use crate::operator::LinOp;
use crate::options::{Method, SolveOptions};
use crate::outcome::SolveOutcome;

/// Krylov restart length when none is configured.
const DEFAULT_RESTART: usize = 20;

/// Adapter exposing an unbatched square [`LinOp`] as a slice operator.
struct SliceOperator<'a> {
    op: &'a LinOp,
}

impl RealOperator for SliceOperator<'_> {
    fn dim(&self) -> usize {
        self.op.ncols()
    }

    fn apply(&self, x: &[f64], y: &mut [f64]) -> linop_krylov::Result<()> {
        let operator_err = |e: Error| linop_krylov::Error::Operator(e.to_string());
        let xt = Tensor::new(vec![self.dim(), 1], x.to_vec()).map_err(|e| operator_err(e.into()))?;
        let yt = self.op.mm(&xt).map_err(operator_err)?;
        y.copy_from_slice(yt.data());
        Ok(())
    }
}

/// Solve `A X = B` column by column with slice-level GMRES.
///
/// `A` must be an unbatched square operator `(na, na)` and `B` must have
/// exactly one batch axis, `(nbatch, na, ncols)`; `E` and `M` are not
/// supported. The iteration cap defaults to `2 * na` and the relative
/// tolerance is `opts.min_eps` with an absolute floor of `1e-12`. A system
/// that does not converge is logged and its partial solution is returned.
pub fn wrap_gmres(
    a: &LinOp,
    b: &Tensor,
    e: Option<&Tensor>,
    m: Option<&LinOp>,
    opts: &SolveOptions,
) -> Result<SolveOutcome> {
    if a.shape().len() != 2 || b.ndim() != 3 {
        return Err(Error::InvalidArgument(format!(
            "external gmres needs an unbatched operator and one batch axis on B, got {:?} and {:?}",
            a.shape(),
            b.shape()
        )));
    }
    if !a.is_square() {
        return Err(Error::Shape(format!(
            "external gmres needs a square operator, got {:?}",
            a.shape()
        )));
    }
    if e.is_some() || m.is_some() {
        return Err(Error::InvalidArgument(
            "external gmres only solves A X = B (no E or M)".into(),
        ));
    }

    let (nbatch, na, ncols) = (b.shape()[0], b.shape()[1], b.shape()[2]);
    if na != a.ncols() {
        return Err(Error::Shape(format!(
            "operator {:?} does not match right-hand side {:?}",
            a.shape(),
            b.shape()
        )));
    }

    let config = GmresConfig::default()
        .with_max_iter(opts.max_niter.unwrap_or(2 * na))
        .with_tol(opts.min_eps)
        .with_atol(1e-12)
        .with_restart(opts.restart.unwrap_or(DEFAULT_RESTART));
    let op = SliceOperator { op: a };

    let rhs = b
        .as_array()
        .view()
        .into_dimensionality::<Ix3>()
        .map_err(|e| Error::Shape(e.to_string()))?;
    let mut out = Array3::<f64>::zeros((nbatch, na, ncols));
    let mut converged = true;
    let mut iterations = 0;
    let mut residual: f64 = 0.0;

    for (i, j) in (0..nbatch).flat_map(|i| (0..ncols).map(move |j| (i, j))) {
        let column = rhs.slice(s![i, .., j]).to_vec();
        let bnorm = column.iter().map(|v| v * v).sum::<f64>().sqrt();
        let result = solve_gmres(&op, &column, &config)?;
        if !result.converged {
            log::warn!(
                "GMRES did not converge to {:.3e} after {} iterations (batch {}, column {}, residual {:.3e})",
                opts.min_eps,
                result.iterations,
                i,
                j,
                result.residual
            );
            converged = false;
        }
        iterations = iterations.max(result.iterations);
        residual = residual.max(result.residual * bnorm);

        out.slice_mut(s![i, .., j]).assign(&ArrayView1::from(&result.x));
    }

    Ok(SolveOutcome {
        x: Tensor::from_array(out.into_dyn()),
        converged,
        iterations,
        residual,
        method: Method::ExternalGmres,
    })
}
