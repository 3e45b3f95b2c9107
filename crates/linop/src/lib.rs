//! # linop
//!
//! Batched linear operators and linear solves in Rust.
//!
//! linop solves `(A - M diag(E)) X = B` where:
//! - `A` is a possibly implicit, possibly batched square operator
//! - `B` holds one right-hand side per column, with its own batch axes
//! - `E` is an optional per-column diagonal shift
//! - `M` is an optional hermitian mass operator used with `E`
//!
//! Batch axes broadcast against each other. Solves run through an exact
//! dense path or through batched GMRES, CG or BiCGSTAB.
//!
//! ## Quick Start
//!
//! ```rust
//! use linop::prelude::*;
//!
//! let a = LinOp::from_matrix(Tensor::from_rows(&[[1.0, 2.0], [3.0, 4.0]]), false).unwrap();
//! let b = Tensor::from_rows(&[[5.0, 6.0], [7.0, 8.0]]);
//! let e = Tensor::from_vec(vec![1.0, 2.0]);
//!
//! let out = solve(&a, &b, Some(&e), None, &SolveOptions::default()).unwrap();
//! let x = out.into_converged().unwrap();
//! assert!((x.data()[0] + 1.0 / 6.0).abs() < 1e-10);
//! ```
//!
//! ## Iterative solves
//!
//! ```rust
//! use linop::prelude::*;
//!
//! let a = LinOp::from_matrix(Tensor::from_rows(&[[4.0, 1.0], [1.0, 3.0]]), true).unwrap();
//! let b = Tensor::from_rows(&[[1.0], [2.0]]);
//! let opts = SolveOptions::default().with_method(Method::Cg).with_rtol(1e-10);
//!
//! let out = solve(&a, &b, None, None, &opts).unwrap();
//! if !out.converged {
//!     eprintln!("best residual {:.3e}", out.residual);
//! }
//! ```

// Re-export member crates
pub use linop_core as core;
pub use linop_krylov as krylov;
pub use linop_solver as solver;

// ============================================================================
// Convenient re-exports from linop_core
// ============================================================================

pub use linop_core::{
    BatchShape,
    // Errors
    Error as CoreError,
    Tensor,
    broadcast_shapes,
    // Broadcasting
    get_bcasted_dims,
    match_dim,
    normalize_bcast_dims,
};

// ============================================================================
// Convenient re-exports from linop_solver
// ============================================================================

pub use linop_solver::{
    // Operators
    LinOp,
    LinearOperator,
    LinearProblem,
    MatrixOperator,
    // Options
    Method,
    ParamRef,
    Precond,
    SolveOptions,
    SolveOutcome,
    // Errors
    Error as SolverError,
    bicgstab,
    cg,
    // Backends
    exactsolve,
    get_batchdims,
    gmres,
    setup_linear_problem,
    // Preconditioning
    setup_precond,
    // Dispatch
    solve,
    solve_abe,
    solve_preconditioned,
    wrap_gmres,
};

// ============================================================================
// Re-export commonly used external types
// ============================================================================

/// Re-export of nalgebra's dynamic matrix type.
pub use nalgebra::DMatrix;

/// Prelude module containing commonly used types and functions.
///
/// ```rust
/// use linop::prelude::*;
/// ```
pub mod prelude {
    // Data
    pub use crate::{DMatrix, Tensor};

    // Operators
    pub use crate::{LinOp, LinearOperator, MatrixOperator};

    // Solving
    pub use crate::{Method, Precond, SolveOptions, SolveOutcome, setup_precond, solve};
}
