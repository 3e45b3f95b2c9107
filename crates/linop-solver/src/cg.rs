//! Batched preconditioned conjugate gradient.

use linop_core::Tensor;

use crate::error::Result;
use crate::iterative::{prepare, stop_criterion, Tracker};
use crate::operator::LinOp;
use crate::options::{Method, SolveOptions};
use crate::outcome::SolveOutcome;
use crate::precond::Precond;
use crate::primitives::{dot, safedenom};

/// Solve `(A - M diag(E)) X = B` with conjugate gradient.
///
/// CG needs a symmetric positive definite operator. Operators that are not
/// declared hermitian, or are estimated not to be positive definite, are
/// solved through the normal equations. The iteration cap defaults to
/// `10 * nr`.
pub fn cg(
    a: &LinOp,
    b: &Tensor,
    e: Option<&Tensor>,
    m: Option<&LinOp>,
    precond: &Precond,
    opts: &SolveOptions,
) -> Result<SolveOutcome> {
    let problem = prepare(a, b, e, m, opts, true)?;
    let max_niter = opts.max_niter.unwrap_or(10 * b.dim(-2)?);
    let eps = opts.eps;
    let every = opts.resid_calc_every;

    let rhs = problem.rhs();
    let mut x = Tensor::zeros(problem.x0_shape());
    let mut r = rhs.sub(&problem.apply(&x)?)?;
    let mut tracker = Tracker::new(stop_criterion(rhs, opts.rtol, opts.atol)?, &x, &r)?;
    if tracker.converged() {
        return tracker.finish(&problem, Method::Cg, 0);
    }

    let mut z = precond.apply(&r)?;
    let mut p = z.clone();
    let mut iterations = 0;

    for k in 1..=max_niter {
        iterations = k;

        let ap = problem.apply(&p)?;
        let rz = dot(&r, &z)?;
        let alpha = rz.div(&safedenom(&dot(&p, &ap)?, eps))?;
        x = x.add(&alpha.mul(&p)?)?;

        r = if every != 0 && k % every == 0 {
            rhs.sub(&problem.apply(&x)?)?
        } else {
            r.sub(&alpha.mul(&ap)?)?
        };

        if tracker.update(&x, &r)? {
            break;
        }

        z = precond.apply(&r)?;
        let beta = dot(&r, &z)?.div(&safedenom(&rz, eps))?;
        p = z.add(&beta.mul(&p)?)?;
    }

    tracker.finish(&problem, Method::Cg, iterations)
}
