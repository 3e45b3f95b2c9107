//! Preconditioning functions for the iterative solvers.

use linop_core::Tensor;

use crate::error::Result;
use crate::operator::LinOp;

/// A preconditioner applied inside the iterative solvers.
#[derive(Debug, Clone, Default)]
pub enum Precond {
    /// No preconditioning.
    #[default]
    Identity,
    /// `x -> M @ x`.
    Operator(LinOp),
}

impl Precond {
    pub fn apply(&self, x: &Tensor) -> Result<Tensor> {
        match self {
            Precond::Identity => Ok(x.clone()),
            Precond::Operator(m) => m.mm(x),
        }
    }

    pub fn is_identity(&self) -> bool {
        matches!(self, Precond::Identity)
    }
}

/// Build the preconditioning function for an optional operator.
pub fn setup_precond(precond: Option<&LinOp>) -> Precond {
    match precond {
        Some(m) => Precond::Operator(m.clone()),
        None => Precond::Identity,
    }
}
