//! Linear operators and batched solvers for linop.
//!
//! This crate provides:
//! - The [`LinearOperator`] trait, the shared [`LinOp`] handle and the
//!   dense, sum, scaled, product and adjoint operator variants
//! - Setup of the canonical problem `(A - M diag(E)) X = B`, including the
//!   positive-definiteness estimate that chooses between the direct and the
//!   normal-equation formulation
//! - Backends: exact dense solve, batched GMRES, CG and BiCGSTAB, and GMRES
//!   through `linop-krylov`
//! - [`solve`], which validates shapes and dispatches to a backend
//!
//! Non-convergence is not an error. Iterative backends return their best
//! iterate in a [`SolveOutcome`] and log a warning; callers that need a
//! converged value use [`SolveOutcome::into_converged`].

pub mod bicgstab;
pub mod cg;
pub mod dispatch;
pub mod error;
pub mod exact;
pub mod external;
pub mod gmres;
mod iterative;
pub mod operator;
pub mod options;
pub mod outcome;
pub mod precond;
pub mod primitives;
pub mod setup;

pub use bicgstab::bicgstab;
pub use cg::cg;
pub use dispatch::{select_method, solve, solve_preconditioned};
pub use error::{Error, Result};
pub use exact::{exactsolve, solve_abe};
pub use external::wrap_gmres;
pub use gmres::gmres;
pub use operator::{
    AddOperator, AdjointOperator, LinOp, LinearOperator, MatmulOperator, MatrixOperator,
    MulOperator, ParamRef,
};
pub use options::{Method, SolveOptions};
pub use outcome::SolveOutcome;
pub use precond::{setup_precond, Precond};
pub use primitives::{dot, get_largest_eival, safedenom};
pub use setup::{get_batchdims, setup_linear_problem, LinearProblem};
