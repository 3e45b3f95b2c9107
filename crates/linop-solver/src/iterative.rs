//! Bookkeeping shared by the batched iterative solvers.

use linop_core::Tensor;

use crate::error::Result;
use crate::operator::LinOp;
use crate::options::{Method, SolveOptions};
use crate::outcome::SolveOutcome;
use crate::primitives::column_norm;
use crate::setup::{get_batchdims, setup_linear_problem, LinearProblem};

/// Batch dims plus canonical problem for one iterative solve.
pub(crate) fn prepare(
    a: &LinOp,
    b: &Tensor,
    e: Option<&Tensor>,
    m: Option<&LinOp>,
    opts: &SolveOptions,
    need_hermit: bool,
) -> Result<LinearProblem> {
    let batchdims = get_batchdims(a, b, e, m)?;
    setup_linear_problem(a, b, e, m, &batchdims, opts.posdef, need_hermit, opts.seed)
}

/// Per-system stopping threshold `max(rtol * ||b||, atol)`, `(*, 1, nc)`.
pub(crate) fn stop_criterion(rhs: &Tensor, rtol: f64, atol: f64) -> Result<Tensor> {
    Ok(column_norm(rhs)?.map(|n| (rtol * n).max(atol)))
}

/// Tracks the best iterate and overall convergence.
#[derive(Debug)]
pub(crate) struct Tracker {
    stop: Tensor,
    best_resid: f64,
    best_x: Tensor,
    converged: bool,
}

impl Tracker {
    pub(crate) fn new(stop: Tensor, x: &Tensor, r: &Tensor) -> Result<Self> {
        let mut tracker = Self {
            stop,
            best_resid: f64::INFINITY,
            best_x: x.clone(),
            converged: false,
        };
        tracker.update(x, r)?;
        Ok(tracker)
    }

    pub(crate) fn converged(&self) -> bool {
        self.converged
    }

    pub(crate) fn stop(&self) -> &Tensor {
        &self.stop
    }

    /// Record iterate `x` with residual `r`; true once every system is below
    /// its threshold.
    pub(crate) fn update(&mut self, x: &Tensor, r: &Tensor) -> Result<bool> {
        let norm = column_norm(r)?;
        let worst = norm.max();
        let done = norm
            .zip_with(&self.stop, |n, s| if n <= s { 1.0 } else { 0.0 })?
            .all(|v| v == 1.0);

        if done || worst < self.best_resid {
            self.best_resid = worst;
            self.best_x = x.clone();
        }
        self.converged = done;
        Ok(done)
    }

    /// Restore the column layout and report.
    pub(crate) fn finish(self, problem: &LinearProblem, method: Method, iterations: usize) -> Result<SolveOutcome> {
        if !self.converged {
            log::warn!(
                "{} did not converge after {} iterations (best residual {:.3e})",
                method,
                iterations,
                self.best_resid
            );
        }
        Ok(SolveOutcome {
            x: problem.restore_columns(self.best_x)?,
            converged: self.converged,
            iterations,
            residual: self.best_resid,
            method,
        })
    }
}
