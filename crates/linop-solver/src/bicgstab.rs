//! Batched BiCGSTAB with left and right preconditioning.

use linop_core::Tensor;

use crate::error::Result;
use crate::iterative::{prepare, stop_criterion, Tracker};
use crate::operator::LinOp;
use crate::options::{Method, SolveOptions};
use crate::outcome::SolveOutcome;
use crate::precond::Precond;
use crate::primitives::{dot, safedenom};

/// Solve `(A - M diag(E)) X = B` with BiCGSTAB.
///
/// Works on general (non-hermitian) operators; the normal equations are
/// only used when `posdef` is given as `false` or estimated so. The
/// iteration cap defaults to `10 * nr`.
#[allow(clippy::too_many_arguments)]
pub fn bicgstab(
    a: &LinOp,
    b: &Tensor,
    e: Option<&Tensor>,
    m: Option<&LinOp>,
    precond_l: &Precond,
    precond_r: &Precond,
    opts: &SolveOptions,
) -> Result<SolveOutcome> {
    let problem = prepare(a, b, e, m, opts, false)?;
    let max_niter = opts.max_niter.unwrap_or(10 * b.dim(-2)?);
    let eps = opts.eps;
    let every = opts.resid_calc_every;

    let rhs = problem.rhs();
    let mut x = Tensor::zeros(problem.x0_shape());
    let mut r = rhs.sub(&problem.apply(&x)?)?;
    let mut tracker = Tracker::new(stop_criterion(rhs, opts.rtol, opts.atol)?, &x, &r)?;
    if tracker.converged() {
        return tracker.finish(&problem, Method::Bicgstab, 0);
    }

    let r0hat = r.clone();
    let mut rho = dot(&r0hat, &r)?;
    let mut alpha = Tensor::scalar(1.0);
    let mut omega = Tensor::scalar(1.0);
    let mut v = Tensor::zeros(r.shape());
    let mut p = Tensor::zeros(r.shape());
    let mut iterations = 0;

    for k in 1..=max_niter {
        iterations = k;

        let rho_new = dot(&r0hat, &r)?;
        let beta = rho_new
            .div(&safedenom(&rho, eps))?
            .mul(&alpha.div(&safedenom(&omega, eps))?)?;
        p = r.add(&beta.mul(&p.sub(&omega.mul(&v)?)?)?)?;

        let y = precond_r.apply(&p)?;
        v = problem.apply(&y)?;
        alpha = rho_new.div(&safedenom(&dot(&r0hat, &v)?, eps))?;
        let h = x.add(&alpha.mul(&y)?)?;
        let s = r.sub(&alpha.mul(&v)?)?;

        let z = precond_r.apply(&s)?;
        let t = problem.apply(&z)?;
        let kt = precond_l.apply(&t)?;
        let ks = precond_l.apply(&s)?;
        omega = dot(&kt, &ks)?.div(&safedenom(&dot(&kt, &kt)?, eps))?;
        x = h.add(&omega.mul(&z)?)?;

        r = if every != 0 && k % every == 0 {
            rhs.sub(&problem.apply(&x)?)?
        } else {
            s.sub(&omega.mul(&t)?)?
        };

        if tracker.update(&x, &r)? {
            break;
        }
        rho = rho_new;
    }

    tracker.finish(&problem, Method::Bicgstab, iterations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exact::exactsolve;
    use crate::precond::setup_precond;

    fn nonsym(n: usize, seed: u64) -> Tensor {
        Tensor::randn(&[n, n], seed)
            .add(&Tensor::eye(n).scale(2.0 * n as f64))
            .unwrap()
    }

    fn opts() -> SolveOptions {
        SolveOptions::default().with_rtol(1e-10).with_atol(1e-12).with_posdef(true)
    }

    #[test]
    fn bicgstab_matches_exact() {
        let a = LinOp::from_matrix(nonsym(6, 1), false).unwrap();
        let b = Tensor::randn(&[6, 2], 2);
        let id = Precond::Identity;
        let out = bicgstab(&a, &b, None, None, &id, &id, &opts()).unwrap();
        let x = exactsolve(&a, &b, None, None).unwrap();

        assert!(out.converged, "residual {}", out.residual);
        assert_eq!(out.method, Method::Bicgstab);
        assert!(out.x.allclose(&x, 1e-4, 1e-6));
    }

    #[test]
    fn bicgstab_batched_operator() {
        let mats = Tensor::randn(&[3, 4, 4], 3).add(&Tensor::eye(4).scale(8.0)).unwrap();
        let a = LinOp::from_matrix(mats, false).unwrap();
        let b = Tensor::randn(&[4, 1], 4);
        let id = Precond::Identity;
        let out = bicgstab(&a, &b, None, None, &id, &id, &opts()).unwrap();
        assert_eq!(out.x.shape(), &[3, 4, 1]);
        let x = exactsolve(&a, &b, None, None).unwrap();
        assert!(out.x.allclose(&x, 1e-4, 1e-6));
    }

    #[test]
    fn bicgstab_with_shift_and_preconditioners() {
        let mat = nonsym(5, 5);
        let inv_diag: Vec<f64> = (0..5).map(|i| 1.0 / mat.data()[i * 5 + i]).collect();
        let jacobi = LinOp::from_matrix(Tensor::from_vec(inv_diag).diag_embed().unwrap(), true).unwrap();
        let a = LinOp::from_matrix(mat, false).unwrap();
        let b = Tensor::randn(&[5, 2], 6);
        let e = Tensor::from_vec(vec![0.5, -1.0]);

        let out = bicgstab(
            &a,
            &b,
            Some(&e),
            None,
            &Precond::Identity,
            &setup_precond(Some(&jacobi)),
            &opts(),
        )
        .unwrap();
        let x = exactsolve(&a, &b, Some(&e), None).unwrap();
        assert!(out.converged);
        assert!(out.x.allclose(&x, 1e-4, 1e-6));

        let left = bicgstab(
            &a,
            &b,
            Some(&e),
            None,
            &setup_precond(Some(&jacobi)),
            &Precond::Identity,
            &opts(),
        )
        .unwrap();
        assert!(left.x.allclose(&x, 1e-4, 1e-6));
    }

    #[test]
    fn bicgstab_zero_rhs() {
        let a = LinOp::from_matrix(nonsym(3, 7), false).unwrap();
        let b = Tensor::zeros(&[2, 3, 1]);
        let id = Precond::Identity;
        let out = bicgstab(&a, &b, None, None, &id, &id, &opts()).unwrap();
        assert!(out.converged);
        assert_eq!(out.iterations, 0);
        assert_eq!(out.x.shape(), &[2, 3, 1]);
        assert!(out.x.all(|v| v == 0.0));
    }
}
