//! Core data types for linop.
//!
//! This crate provides:
//! - [`Tensor`], a batched `f64` array on top of `ndarray::ArrayD` whose last
//!   two axes are a matrix and whose leading axes are batch axes
//! - Broadcasting rules for batch shapes ([`BatchShape`], [`normalize_bcast_dims`],
//!   [`get_bcasted_dims`], [`match_dim`])
//! - A reproducible hash-based RNG for random probe vectors

pub mod bcast;
pub mod error;
pub mod rng;
pub mod tensor;

pub use bcast::{
    BatchShape, broadcast_shapes, get_bcasted_dims, match_dim, normalize_bcast_dims,
};
pub use error::{Error, Result};
pub use tensor::Tensor;
