//! Entry points that validate a problem and route it to a backend.
//!
//! `solve` is the function most callers want. It checks every shape before
//! any numeric work, picks a method and returns a [`SolveOutcome`] whose
//! `converged` flag tells whether the value is exact enough to use.

use linop_core::Tensor;

use crate::bicgstab::bicgstab;
use crate::cg::cg;
use crate::error::{Error, Result};
use crate::exact::exactsolve;
use crate::external::wrap_gmres;
use crate::gmres::gmres;
use crate::operator::LinOp;
use crate::options::{Method, SolveOptions};
use crate::outcome::SolveOutcome;
use crate::precond::Precond;
use crate::setup::get_batchdims;

/// Solve `(A - M diag(E)) X = B` without a preconditioner.
///
/// `A` is `(*BA, na, na)`, `B` is `(*BB, na, ncols)`, `E` is
/// `(*BE, ncols)` and `M` is `(*BM, na, na)`. `M` only takes part when `E`
/// is given. The result has the broadcast batch shape and `B`'s column
/// layout.
///
/// # Example
///
/// ```
/// use linop_core::Tensor;
/// use linop_solver::{solve, LinOp, Method, SolveOptions};
///
/// let a = LinOp::from_matrix(Tensor::from_rows(&[[1.0, 2.0], [3.0, 4.0]]), false).unwrap();
/// let b = Tensor::from_rows(&[[5.0, 6.0], [7.0, 8.0]]);
/// let out = solve(&a, &b, None, None, &SolveOptions::default()).unwrap();
///
/// assert_eq!(out.method, Method::Exact);
/// let x = out.into_converged().unwrap();
/// assert!(x.allclose(&Tensor::from_rows(&[[-3.0, -4.0], [4.0, 5.0]]), 1e-8, 1e-8));
/// ```
pub fn solve(
    a: &LinOp,
    b: &Tensor,
    e: Option<&Tensor>,
    m: Option<&LinOp>,
    opts: &SolveOptions,
) -> Result<SolveOutcome> {
    solve_preconditioned(a, b, e, m, &Precond::Identity, opts)
}

/// Like [`solve`], with a preconditioner for the iterative methods.
///
/// BiCGSTAB uses `precond` on the right. The exact and external GMRES
/// paths have no use for it and log when one is passed.
pub fn solve_preconditioned(
    a: &LinOp,
    b: &Tensor,
    e: Option<&Tensor>,
    m: Option<&LinOp>,
    precond: &Precond,
    opts: &SolveOptions,
) -> Result<SolveOutcome> {
    opts.validate()?;
    validate_problem(a, b, e, m)?;
    get_batchdims(a, b, e, m)?;

    let m = match (e, m) {
        (None, Some(_)) => {
            log::warn!("mass operator M is ignored because no shift E was given");
            None
        }
        _ => m,
    };

    let method = select_method(opts.method, a, m);
    log::debug!(
        "solving {:?} against {:?} with {} (shift: {}, mass: {})",
        a.shape(),
        b.shape(),
        method,
        e.is_some(),
        m.is_some()
    );

    match method {
        Method::Exact => {
            warn_unused_precond(precond, method);
            Ok(SolveOutcome::exact(exactsolve(a, b, e, m)?))
        }
        Method::Gmres => gmres(a, b, e, m, precond, opts),
        Method::Cg => cg(a, b, e, m, precond, opts),
        Method::Bicgstab => bicgstab(a, b, e, m, &Precond::Identity, precond, opts),
        Method::ExternalGmres => {
            warn_unused_precond(precond, method);
            wrap_gmres(a, b, e, m, opts)
        }
        Method::Auto => Err(Error::InvalidArgument("method was not resolved".into())),
    }
}

/// Resolve `Auto` to a concrete method.
///
/// Dense operators go to the exact solver. Otherwise hermitian problems use
/// CG and the rest BiCGSTAB.
pub fn select_method(method: Method, a: &LinOp, m: Option<&LinOp>) -> Method {
    if method != Method::Auto {
        return method;
    }
    let dense = a.is_materialized() && m.map_or(true, LinOp::is_materialized);
    if dense {
        Method::Exact
    } else if a.is_hermitian() && m.map_or(true, LinOp::is_hermitian) {
        Method::Cg
    } else {
        Method::Bicgstab
    }
}

fn validate_problem(a: &LinOp, b: &Tensor, e: Option<&Tensor>, m: Option<&LinOp>) -> Result<()> {
    if !a.is_square() {
        return Err(Error::Shape(format!(
            "the operator must be square, got {:?}",
            a.shape()
        )));
    }
    if b.ndim() < 2 {
        return Err(Error::Shape(format!(
            "B must have at least 2 dimensions, got {:?}",
            b.shape()
        )));
    }
    if a.ncols() != b.dim(-2)? {
        return Err(Error::Shape(format!(
            "mismatch shape of A {:?} and B {:?}",
            a.shape(),
            b.shape()
        )));
    }
    if let Some(m) = m {
        if !m.is_square() || m.nrows() != a.nrows() {
            return Err(Error::Shape(format!(
                "M must be square with the size of A, got {:?} and {:?}",
                m.shape(),
                a.shape()
            )));
        }
        if !m.is_hermitian() {
            return Err(Error::InvalidArgument(
                "the mass operator M must be hermitian".into(),
            ));
        }
    }
    if let Some(e) = e {
        if e.ndim() == 0 || e.dim(-1)? != b.dim(-1)? {
            return Err(Error::Shape(format!(
                "E {:?} must have one entry per column of B {:?}",
                e.shape(),
                b.shape()
            )));
        }
    }
    Ok(())
}

fn warn_unused_precond(precond: &Precond, method: Method) {
    if !precond.is_identity() {
        log::warn!("{} does not use a preconditioner, ignoring it", method);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::LinearOperator;

    /// Diagonal operator that never exposes its matrix.
    #[derive(Debug)]
    struct Diag {
        shape: Vec<usize>,
        diag: Vec<f64>,
    }

    impl Diag {
        fn op(diag: Vec<f64>) -> LinOp {
            let n = diag.len();
            LinOp::new(Self {
                shape: vec![n, n],
                diag,
            })
            .unwrap()
        }
    }

    impl LinearOperator for Diag {
        fn shape(&self) -> &[usize] {
            &self.shape
        }

        fn apply(&self, x: &Tensor) -> crate::Result<Tensor> {
            let n = self.diag.len();
            let d = Tensor::new(vec![n, 1], self.diag.clone())?;
            Ok(x.mul(&d)?)
        }

        fn apply_adjoint(&self, x: &Tensor) -> crate::Result<Tensor> {
            self.apply(x)
        }

        fn is_hermitian(&self) -> bool {
            true
        }
    }

    #[test]
    fn auto_picks_exact_for_dense() {
        let a = LinOp::from_matrix(Tensor::eye(3), true).unwrap();
        assert_eq!(select_method(Method::Auto, &a, None), Method::Exact);
        assert_eq!(select_method(Method::Cg, &a, None), Method::Cg);
    }

    #[test]
    fn auto_picks_cg_or_bicgstab_for_matrix_free() {
        let d = Diag::op(vec![1.0, 2.0, 3.0]);
        assert_eq!(select_method(Method::Auto, &d, None), Method::Cg);

        let upper = Tensor::from_rows(&[[1.0, 2.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]);
        let dense = LinOp::from_matrix(upper, false).unwrap();
        let composite = d.matmul(&dense).unwrap();
        assert_eq!(select_method(Method::Auto, &composite, None), Method::Bicgstab);
    }

    #[test]
    fn solve_matrix_free_hermitian() {
        let d = Diag::op(vec![2.0, 4.0, 8.0]);
        let b = Tensor::from_rows(&[[2.0], [4.0], [8.0]]);
        let opts = SolveOptions::default().with_rtol(1e-10).with_atol(1e-12);
        let out = solve(&d, &b, None, None, &opts).unwrap();
        assert_eq!(out.method, Method::Cg);
        assert!(out.converged);
        assert!(out.x.allclose(&Tensor::full(&[3, 1], 1.0), 1e-6, 1e-8));
    }

    #[test]
    fn solve_every_method_agrees() {
        let mat = Tensor::randn(&[5, 5], 1).add(&Tensor::eye(5).scale(10.0)).unwrap();
        let a = LinOp::from_matrix(mat, false).unwrap();
        let b = Tensor::randn(&[1, 5, 2], 2);
        let x = exactsolve(&a, &b, None, None).unwrap();

        for method in [Method::Gmres, Method::Cg, Method::Bicgstab, Method::ExternalGmres] {
            let opts = SolveOptions::default()
                .with_method(method)
                .with_rtol(1e-10)
                .with_atol(1e-12)
                .with_max_niter(200);
            let out = solve(&a, &b, None, None, &opts).unwrap();
            assert_eq!(out.method, method);
            assert!(out.x.allclose(&x, 1e-4, 1e-6), "{} gave {:?}", method, out.x);
        }
    }

    #[test]
    fn solve_ignores_mass_without_shift() {
        let a = LinOp::from_matrix(Tensor::from_rows(&[[2.0, 0.0], [0.0, 4.0]]), true).unwrap();
        let m = LinOp::from_matrix(Tensor::from_rows(&[[3.0, 0.0], [0.0, 3.0]]), true).unwrap();
        let b = Tensor::from_rows(&[[2.0], [4.0]]);
        let out = solve(&a, &b, None, Some(&m), &SolveOptions::default()).unwrap();
        assert!(out.x.allclose(&Tensor::full(&[2, 1], 1.0), 1e-10, 1e-12));
    }

    #[test]
    fn solve_rejects_bad_shapes_before_work() {
        let a = LinOp::from_matrix(Tensor::eye(3), true).unwrap();
        let rect = LinOp::from_matrix(Tensor::zeros(&[3, 2]), false).unwrap();
        let b = Tensor::zeros(&[3, 2]);
        let opts = SolveOptions::default();

        assert!(solve(&rect, &b, None, None, &opts).unwrap_err().is_shape_error());
        assert!(solve(&a, &Tensor::zeros(&[2, 2]), None, None, &opts)
            .unwrap_err()
            .is_shape_error());
        assert!(solve(&a, &b, Some(&Tensor::zeros(&[3])), None, &opts)
            .unwrap_err()
            .is_shape_error());

        let small_m = LinOp::from_matrix(Tensor::eye(2), true).unwrap();
        let e = Tensor::zeros(&[2]);
        assert!(solve(&a, &b, Some(&e), Some(&small_m), &opts)
            .unwrap_err()
            .is_shape_error());

        let batched = LinOp::from_matrix(Tensor::zeros(&[4, 3, 3]), true).unwrap();
        assert!(solve(&batched, &Tensor::zeros(&[5, 3, 2]), None, None, &opts)
            .unwrap_err()
            .is_shape_error());
    }

    #[test]
    fn solve_rejects_nonhermitian_mass() {
        let a = LinOp::from_matrix(Tensor::eye(2), true).unwrap();
        let m = LinOp::from_matrix(Tensor::from_rows(&[[1.0, 1.0], [0.0, 1.0]]), false).unwrap();
        let b = Tensor::zeros(&[2, 1]);
        let e = Tensor::zeros(&[1]);
        assert!(matches!(
            solve(&a, &b, Some(&e), Some(&m), &SolveOptions::default()),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn solve_rejects_invalid_options() {
        let a = LinOp::from_matrix(Tensor::eye(2), true).unwrap();
        let b = Tensor::zeros(&[2, 1]);
        let opts = SolveOptions::default().with_rtol(-1.0);
        assert!(matches!(solve(&a, &b, None, None, &opts), Err(Error::Config(_))));
    }
}
