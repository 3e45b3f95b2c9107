//! Direct solves through dense materialisation.
//!
//! These routines call [`LinOp::fullmatrix`] and are only suitable for small
//! operators: memory grows as `nr * nc` per batch entry.

use linop_core::{normalize_bcast_dims, Tensor};

use crate::error::{Error, Result};
use crate::operator::LinOp;

/// Solve `A X = B`, or `(A - M diag(E)) X = B` when `E` is given.
///
/// `M` is ignored without `E`. With `M`, the problem is whitened with the
/// Cholesky factor `M = L L^T` and solved as
/// `(L^-1 A L^-T - diag(E)) Y = L^-1 B`, `X = L^-T Y`.
///
/// A singular system fails with a core `SingularMatrix` error.
pub fn exactsolve(a: &LinOp, b: &Tensor, e: Option<&Tensor>, m: Option<&LinOp>) -> Result<Tensor> {
    match (e, m) {
        (None, _) => Ok(a.fullmatrix()?.solve(b)?),
        (Some(e), None) => solve_abe(&a.fullmatrix()?, b, e),
        (Some(e), Some(m)) => {
            let l = m.fullmatrix()?.cholesky()?;
            let linv = l.inverse()?;
            let linv_t = linv.matrix_transpose()?;
            let a2 = linv.matmul(&a.mm(&linv_t)?)?;
            let b2 = linv.matmul(b)?;
            let x2 = solve_abe(&a2, &b2, e)?;
            Ok(linv_t.matmul(&x2)?)
        }
    }
}

/// Solve `A X = B - X diag(E)`, i.e. `(A - e_j I) x_j = b_j` for every
/// column `j`.
///
/// Shapes: `A (*BA, na, na)`, `B (*BB, na, ncols)`, `E (*BE, ncols)`; the
/// result is `(*bcast, na, ncols)`.
pub fn solve_abe(a: &Tensor, b: &Tensor, e: &Tensor) -> Result<Tensor> {
    if a.ndim() < 2 || b.ndim() < 2 || e.ndim() < 1 {
        return Err(Error::Shape(format!(
            "solve_abe got shapes {:?}, {:?}, {:?}",
            a.shape(),
            b.shape(),
            e.shape()
        )));
    }
    let na = a.dim(-1)?;
    let ncols = b.dim(-1)?;
    if e.dim(-1)? != ncols {
        return Err(Error::Shape(format!(
            "shift has {} entries but the right-hand side has {} columns",
            e.dim(-1)?,
            ncols
        )));
    }

    let padded = normalize_bcast_dims(&[a.batch_shape(), b.batch_shape(), &e.shape()[..e.ndim() - 1]])?;
    let (bb, be) = (&padded[1], &padded[2]);

    // (ncols, *BE, 1)
    let mut e_shape = vec![1];
    e_shape.extend_from_slice(be);
    e_shape.push(ncols);
    let e_cols = e.reshape(&e_shape)?.transpose(0, -1)?;

    // (ncols, *BB, na, 1)
    let mut b_shape = vec![1];
    b_shape.extend_from_slice(bb);
    b_shape.extend_from_slice(&[na, ncols]);
    let b_cols = b.reshape(&b_shape)?.transpose(0, -1)?;

    // (ncols, *BE, na, na)
    let mut rep_shape = e_cols.shape().to_vec();
    if let Some(last) = rep_shape.last_mut() {
        *last = na;
    }
    let shift = e_cols.broadcast_to(&rep_shape)?.diag_embed()?;
    let ae = a.sub(&shift)?;

    let x = ae.solve(&b_cols)?;
    Ok(x.transpose(0, -1)?.squeeze(0)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: &Tensor, b: &Tensor, tol: f64) {
        assert_eq!(a.shape(), b.shape());
        for (x, y) in a.data().iter().zip(b.data()) {
            assert!((x - y).abs() < tol, "{:?} != {:?}", a, b);
        }
    }

    #[test]
    fn exact_two_by_two() {
        let a = LinOp::from_matrix(Tensor::from_rows(&[[1.0, 2.0], [3.0, 4.0]]), false).unwrap();
        let b = Tensor::from_rows(&[[5.0, 6.0], [7.0, 8.0]]);
        let x = exactsolve(&a, &b, None, None).unwrap();
        assert_close(&x, &Tensor::from_rows(&[[-3.0, -4.0], [4.0, 5.0]]), 1e-10);
    }

    #[test]
    fn solve_abe_two_by_two() {
        let a = Tensor::from_rows(&[[1.0, 2.0], [3.0, 4.0]]);
        let b = Tensor::from_rows(&[[5.0, 6.0], [7.0, 8.0]]);
        let e = Tensor::from_vec(vec![1.0, 2.0]);
        let x = solve_abe(&a, &b, &e).unwrap();
        assert_close(&x, &Tensor::from_rows(&[[-1.0 / 6.0, 0.5], [2.5, 3.25]]), 1e-10);
    }

    #[test]
    fn solve_abe_satisfies_shifted_equation() {
        let a = Tensor::randn(&[3, 4, 4], 1).add(&Tensor::eye(4).scale(6.0)).unwrap();
        let b = Tensor::randn(&[4, 2], 2);
        let e = Tensor::randn(&[3, 2], 3);
        let x = solve_abe(&a, &b, &e).unwrap();
        assert_eq!(x.shape(), &[3, 4, 2]);

        // A X - X diag(E) == B
        let ax = a.matmul(&x).unwrap();
        let xe = x.mul(&e.unsqueeze(-2).unwrap()).unwrap();
        let lhs = ax.sub(&xe).unwrap();
        let b_full = b.broadcast_to(&[3, 4, 2]).unwrap();
        assert_close(&lhs, &b_full, 1e-9);
    }

    #[test]
    fn exact_with_mass_matrix() {
        let a = LinOp::from_matrix(Tensor::from_rows(&[[4.0, 1.0, 0.0], [1.0, 5.0, 1.0], [0.0, 1.0, 6.0]]), true)
            .unwrap();
        let m = LinOp::from_matrix(Tensor::from_rows(&[[2.0, 0.5, 0.0], [0.5, 2.0, 0.0], [0.0, 0.0, 1.0]]), true)
            .unwrap();
        let b = Tensor::randn(&[3, 2], 7);
        let e = Tensor::from_vec(vec![0.3, -0.7]);
        let x = exactsolve(&a, &b, Some(&e), Some(&m)).unwrap();

        // A X - M X diag(E) == B
        let ax = a.mm(&x).unwrap();
        let mxe = m.mm(&x).unwrap().mul(&e.unsqueeze(-2).unwrap()).unwrap();
        assert_close(&ax.sub(&mxe).unwrap(), &b, 1e-9);
    }

    #[test]
    fn exact_ignores_mass_without_shift() {
        let a = LinOp::from_matrix(Tensor::from_rows(&[[1.0, 2.0], [3.0, 4.0]]), false).unwrap();
        let m = LinOp::from_matrix(Tensor::from_rows(&[[9.0, 0.0], [0.0, 9.0]]), true).unwrap();
        let b = Tensor::from_rows(&[[5.0], [7.0]]);
        let x = exactsolve(&a, &b, None, Some(&m)).unwrap();
        assert_close(&x, &Tensor::from_rows(&[[-3.0], [4.0]]), 1e-10);
    }

    #[test]
    fn exact_singular_fails() {
        let a = LinOp::from_matrix(Tensor::from_rows(&[[1.0, 2.0], [2.0, 4.0]]), true).unwrap();
        let b = Tensor::from_rows(&[[1.0], [1.0]]);
        let err = exactsolve(&a, &b, None, None).unwrap_err();
        assert!(matches!(err, Error::Core(linop_core::Error::SingularMatrix)));
    }

    #[test]
    fn solve_abe_rejects_batch_mismatch() {
        let a = Tensor::zeros(&[3, 2, 2]);
        let b = Tensor::zeros(&[4, 2, 1]);
        let e = Tensor::zeros(&[1]);
        assert!(solve_abe(&a, &b, &e).unwrap_err().is_shape_error());
    }
}
