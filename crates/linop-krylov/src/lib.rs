//! Slice-level Krylov solvers for linop.
//!
//! The solvers here know nothing about batching or tensors: they work on one
//! square real system at a time through the [`RealOperator`] trait.
//!
//! # Example
//!
//! ```
//! use linop_krylov::{solve_gmres, GmresConfig, RealOperator, Result};
//!
//! struct Diag(Vec<f64>);
//!
//! impl RealOperator for Diag {
//!     fn dim(&self) -> usize {
//!         self.0.len()
//!     }
//!
//!     fn apply(&self, x: &[f64], y: &mut [f64]) -> Result<()> {
//!         for ((yi, xi), di) in y.iter_mut().zip(x).zip(&self.0) {
//!             *yi = di * xi;
//!         }
//!         Ok(())
//!     }
//! }
//!
//! let op = Diag(vec![2.0, 4.0]);
//! let result = solve_gmres(&op, &[2.0, 4.0], &GmresConfig::default()).unwrap();
//! assert!(result.converged);
//! assert!((result.x[0] - 1.0).abs() < 1e-10);
//! ```

pub mod error;
pub mod gmres;
pub mod operator;

pub use error::{Error, Result};
pub use gmres::{solve_gmres, GmresConfig, GmresResult};
pub use operator::{RealOperator, RowMajorOperator};
