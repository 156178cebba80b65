// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Tensor shape descriptors and dimension utilities.

use std::fmt;

/// Describes the dimensions of a model tensor for one shape group.
///
/// Shapes are immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Shape {
    dims: Vec<usize>,
}

impl Shape {
    /// Creates a new shape from the given dimensions.
    ///
    /// # Examples
    /// ```
    /// use tensor_meta::Shape;
    /// let s = Shape::new(vec![1, 224, 224, 3]);
    /// assert_eq!(s.rank(), 4);
    /// assert_eq!(s.num_elements(), Some(150_528));
    /// ```
    pub fn new(dims: Vec<usize>) -> Self {
        Self { dims }
    }

    /// Returns the number of dimensions (rank).
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Returns the total number of elements, or `None` if the product of
    /// the dimensions overflows `usize`.
    ///
    /// For a scalar shape (rank 0), returns 1.
    pub fn num_elements(&self) -> Option<usize> {
        self.dims.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d))
    }

    /// Returns the dimensions as a slice.
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Returns the size of a specific dimension, or `None` if out of bounds.
    pub fn dim(&self, index: usize) -> Option<usize> {
        self.dims.get(index).copied()
    }

    /// Returns the leading (batch) dimension, if the shape has one.
    pub fn batch(&self) -> Option<usize> {
        self.dim(0)
    }

    /// Computes the memory footprint in bytes for a given [`crate::DType`],
    /// or `None` on overflow.
    pub fn size_bytes(&self, dtype: super::DType) -> Option<usize> {
        dtype.bytes_for(self.num_elements()?)
    }

    /// Returns a copy of this shape with the leading dimension replaced.
    ///
    /// Scalars are returned unchanged.
    pub fn with_batch(&self, batch: usize) -> Shape {
        let mut dims = self.dims.clone();
        if let Some(first) = dims.first_mut() {
            *first = batch;
        }
        Shape { dims }
    }

    /// Returns `true` if any dimension is zero.
    pub fn has_zero_dim(&self) -> bool {
        self.dims.iter().any(|&d| d == 0)
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, d) in self.dims.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{d}")?;
        }
        write!(f, "]")
    }
}

impl From<Vec<usize>> for Shape {
    fn from(dims: Vec<usize>) -> Self {
        Self::new(dims)
    }
}

impl From<&[usize]> for Shape {
    fn from(dims: &[usize]) -> Self {
        Self::new(dims.to_vec())
    }
}
