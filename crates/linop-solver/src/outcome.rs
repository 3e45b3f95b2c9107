//! Result of a solve.

use linop_core::Tensor;

use crate::options::Method;

/// Best-effort solution together with its convergence status.
///
/// Iterative methods never fail on non-convergence; they return the best
/// iterate they saw and set `converged = false`. Callers that need a
/// converged answer use [`SolveOutcome::into_converged`].
#[derive(Debug, Clone)]
pub struct SolveOutcome {
    /// Solution, same batch and column convention as the right-hand side.
    pub x: Tensor,
    /// Whether every system reached the requested tolerance.
    pub converged: bool,
    /// Iterations performed (the largest count over all systems for the
    /// per-system methods, zero for exact solves).
    pub iterations: usize,
    /// Largest residual 2-norm over all systems of the returned iterate, in
    /// the canonical problem. Zero for exact solves.
    pub residual: f64,
    /// Method that produced the solution.
    pub method: Method,
}

impl SolveOutcome {
    pub(crate) fn exact(x: Tensor) -> Self {
        Self {
            x,
            converged: true,
            iterations: 0,
            residual: 0.0,
            method: Method::Exact,
        }
    }

    /// The solution if converged, otherwise the whole outcome.
    pub fn into_converged(self) -> Result<Tensor, SolveOutcome> {
        if self.converged {
            Ok(self.x)
        } else {
            Err(self)
        }
    }

    /// The solution regardless of convergence.
    pub fn into_value(self) -> Tensor {
        self.x
    }
}
