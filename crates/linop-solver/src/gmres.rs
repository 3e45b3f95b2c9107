//! Batched restarted GMRES.
//!
//! Every (batch, column) system runs its own Arnoldi process, but all of them
//! advance together: Hessenberg entries, Givens coefficients and the
//! least-squares right-hand side are `(*, 1, nc)` tensors and every update is
//! element-wise. Preconditioning is applied on the right, so the residual
//! estimate is the true residual of the unpreconditioned system.

use linop_core::Tensor;

use crate::error::Result;
use crate::iterative::{prepare, stop_criterion, Tracker};
use crate::operator::LinOp;
use crate::options::{Method, SolveOptions};
use crate::outcome::SolveOutcome;
use crate::precond::Precond;
use crate::primitives::{column_norm, dot, safedenom};

/// Solve `(A - M diag(E)) X = B` with restarted GMRES.
///
/// The iteration cap defaults to `nr` and the restart length to the
/// iteration cap, i.e. a single unrestarted cycle.
pub fn gmres(
    a: &LinOp,
    b: &Tensor,
    e: Option<&Tensor>,
    m: Option<&LinOp>,
    precond: &Precond,
    opts: &SolveOptions,
) -> Result<SolveOutcome> {
    let problem = prepare(a, b, e, m, opts, false)?;
    let max_niter = opts.max_niter.unwrap_or(b.dim(-2)?).max(1);
    let restart = opts.restart.unwrap_or(max_niter).clamp(1, max_niter);
    let eps = opts.eps;

    let rhs = problem.rhs();
    let mut x = Tensor::zeros(problem.x0_shape());
    let mut r = rhs.sub(&problem.apply(&x)?)?;
    let mut tracker = Tracker::new(stop_criterion(rhs, opts.rtol, opts.atol)?, &x, &r)?;
    let mut iterations = 0;

    while !tracker.converged() && iterations < max_niter {
        let beta = column_norm(&r)?;
        let mut v = vec![r.div(&safedenom(&beta, eps))?];
        // h[k][j]: row j of Hessenberg column k
        let mut h: Vec<Vec<Tensor>> = Vec::with_capacity(restart);
        let mut cs: Vec<Tensor> = Vec::with_capacity(restart);
        let mut sn: Vec<Tensor> = Vec::with_capacity(restart);
        let mut g = vec![beta];

        let mut k = 0;
        while k < restart && iterations < max_niter {
            iterations += 1;

            // Arnoldi step with modified Gram-Schmidt
            let mut w = problem.apply(&precond.apply(&v[k])?)?;
            let mut col = Vec::with_capacity(k + 2);
            for vj in &v {
                let hjk = dot(vj, &w)?;
                w = w.sub(&hjk.mul(vj)?)?;
                col.push(hjk);
            }
            let wnorm = column_norm(&w)?;
            v.push(w.div(&safedenom(&wnorm, eps))?);
            col.push(wnorm);

            for j in 0..k {
                let (upper, lower) = rotate(&cs[j], &sn[j], &col[j], &col[j + 1])?;
                col[j] = upper;
                col[j + 1] = lower;
            }

            let (c, s) = givens(&col[k], &col[k + 1])?;
            let (diag, _) = rotate(&c, &s, &col[k], &col[k + 1])?;
            col[k + 1] = Tensor::zeros(diag.shape());
            col[k] = diag;

            let gk = g[k].clone();
            g.push(s.mul(&gk)?.scale(-1.0));
            g[k] = c.mul(&gk)?;
            cs.push(c);
            sn.push(s);
            h.push(col);
            k += 1;

            let estimate = g[k].map(f64::abs);
            let below = estimate.zip_with(tracker.stop(), |res, stop| if res <= stop { 1.0 } else { 0.0 })?;
            if below.all(|flag| flag == 1.0) {
                break;
            }
        }

        // Back-substitution for H y = g
        let mut y: Vec<Tensor> = Vec::with_capacity(k);
        for i in (0..k).rev() {
            let mut sum = g[i].clone();
            for (offset, yj) in y.iter().rev().enumerate() {
                let j = i + 1 + offset;
                sum = sum.sub(&h[j][i].mul(yj)?)?;
            }
            y.push(sum.zip_with(&h[i][i], |s, d| if d.abs() < 1e-30 { 0.0 } else { s / d })?);
        }
        y.reverse();

        let mut update = Tensor::zeros(x.shape());
        for (vi, yi) in v.iter().zip(&y) {
            update = update.add(&vi.mul(yi)?)?;
        }
        x = x.add(&precond.apply(&update)?)?;
        r = rhs.sub(&problem.apply(&x)?)?;
        tracker.update(&x, &r)?;
    }

    tracker.finish(&problem, Method::Gmres, iterations)
}

/// Apply the rotation `(c, s)` to the pair `(a, b)`.
fn rotate(c: &Tensor, s: &Tensor, a: &Tensor, b: &Tensor) -> Result<(Tensor, Tensor)> {
    let upper = c.mul(a)?.add(&s.mul(b)?)?;
    let lower = c.mul(b)?.sub(&s.mul(a)?)?;
    Ok((upper, lower))
}

/// Rotation zeroing `b` against `a`, element-wise.
fn givens(a: &Tensor, b: &Tensor) -> Result<(Tensor, Tensor)> {
    let r = a.zip_with(b, f64::hypot)?;
    let c = a.zip_with(&r, |a, r| if r == 0.0 { 1.0 } else { a / r })?;
    let s = b.zip_with(&r, |b, r| if r == 0.0 { 0.0 } else { b / r })?;
    Ok((c, s))
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

    fn tight() -> SolveOptions {
        SolveOptions::default()
            .with_rtol(1e-10)
            .with_atol(1e-12)
            .with_posdef(true)
            .with_max_niter(40)
    }

    #[test]
    fn gmres_two_by_two() {
        let a = LinOp::from_matrix(Tensor::from_rows(&[[1.0, 2.0], [3.0, 4.0]]), false).unwrap();
        let b = Tensor::from_rows(&[[5.0, 6.0], [7.0, 8.0]]);
        let out = gmres(&a, &b, None, None, &Precond::Identity, &tight()).unwrap();
        assert!(out.converged);
        assert!(out.x.allclose(&Tensor::from_rows(&[[-3.0, -4.0], [4.0, 5.0]]), 1e-6, 1e-8));
    }

    #[test]
    fn gmres_default_options_match_exact() {
        let a = LinOp::from_matrix(nonsym(6, 1), false).unwrap();
        let b = Tensor::randn(&[6, 2], 2);
        let out = gmres(&a, &b, None, None, &Precond::Identity, &SolveOptions::default()).unwrap();
        let x = exactsolve(&a, &b, None, None).unwrap();
        assert!(out.x.allclose(&x, 1e-3, 1e-6), "{:?} vs {:?}", out.x, x);
    }

    #[test]
    fn gmres_restarted() {
        let a = LinOp::from_matrix(nonsym(10, 3), false).unwrap();
        let b = Tensor::randn(&[2, 10, 1], 4);
        let out = gmres(&a, &b, None, None, &Precond::Identity, &tight().with_restart(3).with_max_niter(200)).unwrap();
        let x = exactsolve(&a, &b, None, None).unwrap();
        assert!(out.converged, "residual {}", out.residual);
        assert!(out.iterations > 3);
        assert_eq!(out.x.shape(), &[2, 10, 1]);
        assert!(out.x.allclose(&x, 1e-4, 1e-6));
    }

    #[test]
    fn gmres_shifted_with_preconditioner() {
        let mat = nonsym(5, 5);
        let inv_diag: Vec<f64> = (0..5).map(|i| 1.0 / mat.data()[i * 5 + i]).collect();
        let jacobi = LinOp::from_matrix(Tensor::from_vec(inv_diag).diag_embed().unwrap(), true).unwrap();
        let a = LinOp::from_matrix(mat, false).unwrap();
        let b = Tensor::randn(&[5, 3], 6);
        let e = Tensor::from_vec(vec![0.5, -1.0, 2.0]);

        let out = gmres(&a, &b, Some(&e), None, &setup_precond(Some(&jacobi)), &tight()).unwrap();
        let x = exactsolve(&a, &b, Some(&e), None).unwrap();
        assert!(out.converged);
        assert!(out.x.allclose(&x, 1e-4, 1e-6));
    }

    #[test]
    fn gmres_zero_rhs() {
        let a = LinOp::from_matrix(nonsym(4, 7), false).unwrap();
        let b = Tensor::zeros(&[4, 2]);
        let out = gmres(&a, &b, None, None, &Precond::Identity, &SolveOptions::default()).unwrap();
        assert!(out.converged);
        assert_eq!(out.iterations, 0);
        assert!(out.x.all(|v| v == 0.0));
    }

    #[test]
    fn givens_handles_zero_pair() {
        let zero = Tensor::zeros(&[1, 2]);
        let (c, s) = givens(&zero, &zero).unwrap();
        assert!(c.all(|v| v == 1.0));
        assert!(s.all(|v| v == 0.0));

        let a = Tensor::from_rows(&[[3.0, 0.0]]);
        let b = Tensor::from_rows(&[[4.0, 2.0]]);
        let (c, s) = givens(&a, &b).unwrap();
        let (upper, lower) = rotate(&c, &s, &a, &b).unwrap();
        assert!(upper.allclose(&Tensor::from_rows(&[[5.0, 2.0]]), 1e-12, 1e-12));
        assert!(lower.all(|v| v.abs() < 1e-12));
    }
}
