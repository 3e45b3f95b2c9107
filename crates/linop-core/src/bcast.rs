//! Broadcasting rules for batch dimensions.
//!
//! Shapes are compared right-aligned. Two dimensions at the same position are
//! compatible when they are equal or when either of them is 1; the broadcast
//! result takes the larger one. Shorter shapes are padded with leading 1s.
//!
//! The strict entry points ([`broadcast_shapes`], [`BatchShape::broadcast`],
//! [`normalize_bcast_dims`]) reject incompatible shapes with
//! [`Error::Broadcast`]. [`get_bcasted_dims`] is the permissive variant that
//! only takes the per-position maximum.

use std::fmt;
use std::ops::Deref;

use smallvec::SmallVec;

use crate::error::{Error, Result};
use crate::tensor::Tensor;

/// Most operators carry at most a handful of batch axes.
const INLINE_DIMS: usize = 4;

/// Leading (batch) dimensions of a batched matrix or operator.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct BatchShape(SmallVec<[usize; INLINE_DIMS]>);

impl BatchShape {
    /// Create a batch shape from explicit dimensions.
    pub fn new(dims: &[usize]) -> Self {
        Self(SmallVec::from_slice(dims))
    }

    /// The empty batch shape (a single, unbatched problem).
    pub fn unbatched() -> Self {
        Self(SmallVec::new())
    }

    /// Strict broadcast join of any number of batch shapes.
    pub fn broadcast(shapes: &[&[usize]]) -> Result<Self> {
        broadcast_shapes(shapes).map(|dims| Self(SmallVec::from_vec(dims)))
    }

    /// Join this shape with another one.
    pub fn join(&self, other: &[usize]) -> Result<Self> {
        Self::broadcast(&[self.as_slice(), other])
    }

    /// View the dimensions as a slice.
    pub fn as_slice(&self) -> &[usize] {
        self.0.as_slice()
    }

    /// Number of independent problems described by this shape.
    pub fn numel(&self) -> usize {
        self.0.iter().product()
    }

    /// Full tensor shape `(*self, rows, cols)`.
    pub fn with_matrix(&self, rows: usize, cols: usize) -> Vec<usize> {
        let mut shape = self.0.to_vec();
        shape.push(rows);
        shape.push(cols);
        shape
    }

    /// Full tensor shape `(lead, *self, rows, cols)`.
    pub fn with_leading_and_matrix(&self, lead: usize, rows: usize, cols: usize) -> Vec<usize> {
        let mut shape = Vec::with_capacity(self.0.len() + 3);
        shape.push(lead);
        shape.extend_from_slice(&self.0);
        shape.push(rows);
        shape.push(cols);
        shape
    }
}

impl Deref for BatchShape {
    type Target = [usize];

    fn deref(&self) -> &[usize] {
        self.as_slice()
    }
}

impl From<&[usize]> for BatchShape {
    fn from(dims: &[usize]) -> Self {
        Self::new(dims)
    }
}

impl From<Vec<usize>> for BatchShape {
    fn from(dims: Vec<usize>) -> Self {
        Self(SmallVec::from_vec(dims))
    }
}

impl fmt::Debug for BatchShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BatchShape({:?})", self.as_slice())
    }
}

impl fmt::Display for BatchShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.as_slice())
    }
}

/// Left-pad a shape with 1s up to `ndim` dimensions.
fn pad_to(shape: &[usize], ndim: usize) -> Vec<usize> {
    let mut padded = vec![1; ndim - shape.len()];
    padded.extend_from_slice(shape);
    padded
}

fn max_rank(shapes: &[&[usize]]) -> usize {
    shapes.iter().map(|s| s.len()).max().unwrap_or(0)
}

/// Strict broadcast of N shapes.
pub fn broadcast_shapes(shapes: &[&[usize]]) -> Result<Vec<usize>> {
    let ndim = max_rank(shapes);
    let mut result = vec![1; ndim];

    for shape in shapes {
        let padded = pad_to(shape, ndim);
        for (axis, &dim) in padded.iter().enumerate() {
            if result[axis] == dim || dim == 1 {
                continue;
            }
            if result[axis] == 1 {
                result[axis] = dim;
            } else {
                return Err(Error::Broadcast {
                    left: result.clone(),
                    right: shape.to_vec(),
                });
            }
        }
    }

    Ok(result)
}

/// Pad every shape with leading 1s to the common rank.
///
/// Fails if, after padding, two shapes disagree at a position where neither
/// of them is 1.
pub fn normalize_bcast_dims(shapes: &[&[usize]]) -> Result<Vec<Vec<usize>>> {
    broadcast_shapes(shapes)?;
    let ndim = max_rank(shapes);
    Ok(shapes.iter().map(|s| pad_to(s, ndim)).collect())
}

/// Per-position maximum of the padded shapes.
///
/// Does not validate compatibility; use [`BatchShape::broadcast`] when a
/// mismatch must be an error.
pub fn get_bcasted_dims(shapes: &[&[usize]]) -> Vec<usize> {
    let ndim = max_rank(shapes);
    let mut result = vec![1; ndim];
    for shape in shapes {
        for (out, dim) in result.iter_mut().zip(pad_to(shape, ndim)) {
            *out = (*out).max(dim);
        }
    }
    result
}

/// Broadcast every axis except the last one to a common shape.
///
/// The trailing feature axis of each tensor keeps its own length, so two
/// tensors of shapes `(1, 5)` and `(4, 3)` become `(4, 5)` and `(4, 3)`.
pub fn match_dim(xs: &[&Tensor]) -> Result<Vec<Tensor>> {
    for x in xs {
        if x.ndim() == 0 {
            return Err(Error::Shape(
                "match_dim requires tensors with at least one axis".into(),
            ));
        }
    }

    let leading: Vec<&[usize]> = xs.iter().map(|x| &x.shape()[..x.ndim() - 1]).collect();
    let common = broadcast_shapes(&leading)?;

    xs.iter()
        .map(|x| {
            let mut target = common.clone();
            target.push(x.shape()[x.ndim() - 1]);
            x.broadcast_to(&target)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_pads_leading_ones() {
        let dims = normalize_bcast_dims(&[&[1, 2, 3], &[2, 3]]).unwrap();
        assert_eq!(dims, vec![vec![1, 2, 3], vec![1, 2, 3]]);
    }

    #[test]
    fn normalize_rejects_mismatch() {
        let result = normalize_bcast_dims(&[&[4, 3], &[2, 3]]);
        assert!(matches!(result, Err(Error::Broadcast { .. })));
    }

    #[test]
    fn normalize_empty_shapes() {
        let dims = normalize_bcast_dims(&[&[], &[5]]).unwrap();
        assert_eq!(dims, vec![vec![1], vec![5]]);
    }

    #[test]
    fn bcasted_dims_takes_max() {
        assert_eq!(get_bcasted_dims(&[&[1, 2, 5], &[2, 3, 4]]), vec![2, 3, 5]);
        assert_eq!(get_bcasted_dims(&[&[4], &[], &[3, 1]]), vec![3, 4]);
    }

    #[test]
    fn broadcast_shapes_joins_many() {
        let shape = broadcast_shapes(&[&[4, 1], &[1, 3], &[3]]).unwrap();
        assert_eq!(shape, vec![4, 3]);
    }

    #[test]
    fn batch_shape_broadcast() {
        let batch = BatchShape::broadcast(&[&[4], &[3, 1]]).unwrap();
        assert_eq!(batch.as_slice(), &[3, 4]);
        assert_eq!(batch.numel(), 12);
        assert_eq!(batch.with_matrix(2, 5), vec![3, 4, 2, 5]);
        assert_eq!(batch.with_leading_and_matrix(7, 2, 1), vec![7, 3, 4, 2, 1]);

        let err = BatchShape::broadcast(&[&[4], &[3]]).unwrap_err();
        assert!(err.is_shape_error());
    }

    #[test]
    fn batch_shape_unbatched() {
        let batch = BatchShape::unbatched();
        assert!(batch.is_empty());
        assert_eq!(batch.numel(), 1);
        assert_eq!(batch.join(&[2]).unwrap().as_slice(), &[2]);
    }

    #[test]
    fn match_dim_keeps_matching_shapes() {
        let x = Tensor::zeros(&[10, 5]);
        let xq = Tensor::zeros(&[10, 3]);
        let out = match_dim(&[&x, &xq]).unwrap();
        assert_eq!(out[0].shape(), &[10, 5]);
        assert_eq!(out[1].shape(), &[10, 3]);
    }

    #[test]
    fn match_dim_repeats_smaller_batch() {
        let x = Tensor::new(vec![1, 2], vec![1.0, 2.0]).unwrap();
        let xq = Tensor::zeros(&[3, 4]);
        let out = match_dim(&[&x, &xq]).unwrap();
        assert_eq!(out[0].shape(), &[3, 2]);
        assert_eq!(out[0].data(), &[1.0, 2.0, 1.0, 2.0, 1.0, 2.0]);
        assert_eq!(out[1].shape(), &[3, 4]);
    }

    #[test]
    fn match_dim_mismatch() {
        let x = Tensor::zeros(&[2, 5]);
        let xq = Tensor::zeros(&[3, 5]);
        assert!(match_dim(&[&x, &xq]).is_err());
    }
}
