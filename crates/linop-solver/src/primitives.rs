//! Batched building blocks shared by the iterative solvers.
//!
//! Iterates have shape `(*, nr, nc)`: every column of every batch entry is an
//! independent system. Per-system scalars keep the contracted row axis as a
//! length-1 axis, `(*, 1, nc)`, so they broadcast straight back onto the
//! iterates.

use linop_core::Tensor;

use crate::error::Result;

/// Power-iteration budget and convergence tolerances.
const EIVAL_NITER: usize = 10;
const EIVAL_RTOL: f64 = 1e-3;
const EIVAL_ATOL: f64 = 1e-6;

/// Guard against zero norms while normalising power iterates.
const EIVAL_EPS: f64 = 1e-12;

/// Per-column inner product contracted over the row axis.
///
/// `(*, nr, nc) x (*, nr, nc) -> (*, 1, nc)`; batch axes broadcast.
pub fn dot(r: &Tensor, z: &Tensor) -> Result<Tensor> {
    Ok(r.mul(z)?.sum_dim(-2, true)?)
}

/// Replace exact zeros with `eps` so the tensor can be used as a divisor.
pub fn safedenom(r: &Tensor, eps: f64) -> Tensor {
    r.map(|v| if v == 0.0 { eps } else { v })
}

/// Per-column 2-norm over the row axis, `(*, 1, nc)`.
pub fn column_norm(x: &Tensor) -> Result<Tensor> {
    Ok(x.norm_dim(-2, true)?)
}

/// Estimate the dominant eigenvalue of `afcn` for every column of `x`.
///
/// Runs at most ten power iterations and stops early once every column's
/// norm changes by no more than `1e-3 * norm + 1e-6`. The result has shape
/// `(*, 1, nc)` and carries the sign of the Rayleigh quotient
/// `<x, afcn(x)>` of the last iterate, so an operator dominated by a
/// negative eigenvalue yields a negative estimate. An estimate that has not
/// settled within the budget is still returned, with a warning.
pub fn get_largest_eival<F>(afcn: F, x: &Tensor) -> Result<Tensor>
where
    F: Fn(&Tensor) -> Result<Tensor>,
{
    let (estimate, settled) = power_iteration(afcn, x)?;
    if !settled {
        log::warn!(
            "power iteration did not settle after {} steps, largest eigenvalue estimate may be off",
            EIVAL_NITER
        );
    }
    Ok(estimate)
}

/// Power iteration returning the estimate and whether it settled.
fn power_iteration<F>(afcn: F, x: &Tensor) -> Result<(Tensor, bool)>
where
    F: Fn(&Tensor) -> Result<Tensor>,
{
    let mut x = x.clone();
    let mut prev: Option<Tensor> = None;
    let mut estimate = Tensor::scalar(0.0);

    for i in 0..EIVAL_NITER {
        let ax = afcn(&x)?;
        let xnorm = column_norm(&ax)?;
        let sign = dot(&x, &ax)?.map(|v| if v < 0.0 { -1.0 } else { 1.0 });
        estimate = xnorm.mul(&sign)?;

        if let Some(prev) = &prev {
            let settled = prev.zip_with(&xnorm, |p, n| {
                if (p - n).abs() <= EIVAL_RTOL * n + EIVAL_ATOL {
                    1.0
                } else {
                    0.0
                }
            })?;
            if settled.all(|v| v == 1.0) {
                log::trace!("power iteration settled after {} steps", i + 1);
                return Ok((estimate, true));
            }
        }

        if i < EIVAL_NITER - 1 {
            x = ax.div(&safedenom(&xnorm, EIVAL_EPS))?;
        }
        prev = Some(xnorm);
    }

    Ok((estimate, false))
}
