// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Per-tensor descriptors of a model's input/output contract.

use crate::{DType, Layout, Shape, TensorMetaError};

/// Describes one declared input or output tensor of a model.
///
/// A model may declare several *shape groups*: alternative shape
/// configurations that a single compiled model accepts. `shapes[g]` is the
/// shape of this tensor in group `g`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TensorDesc {
    /// Tensor name as emitted by the model compiler.
    pub name: String,
    /// Position of the tensor among the inputs (or outputs).
    pub index: usize,
    /// Element data type.
    pub dtype: DType,
    /// Memory layout.
    #[serde(default)]
    pub layout: Layout,
    /// Whether the leading dimension follows a dynamic batch override.
    #[serde(default)]
    pub batch_variable: bool,
    /// One shape per shape group.
    pub shapes: Vec<Shape>,
}

impl TensorDesc {
    /// Returns the number of shape groups this tensor declares.
    pub fn num_groups(&self) -> usize {
        self.shapes.len()
    }

    /// Returns the shape for `group`.
    pub fn shape(&self, group: usize) -> Result<&Shape, TensorMetaError> {
        self.shapes
            .get(group)
            .ok_or_else(|| TensorMetaError::GroupOutOfRange {
                tensor: self.name.clone(),
                group,
                groups: self.shapes.len(),
            })
    }

    /// Returns the declared buffer size in bytes for `group`.
    pub fn size_bytes(&self, group: usize) -> Result<usize, TensorMetaError> {
        self.shape(group)?
            .size_bytes(self.dtype)
            .ok_or_else(|| self.overflow(group))
    }

    /// Returns the largest buffer size over all shape groups.
    pub fn max_size_bytes(&self) -> Result<usize, TensorMetaError> {
        let mut max = 0;
        for group in 0..self.shapes.len() {
            max = max.max(self.size_bytes(group)?);
        }
        Ok(max)
    }

    /// Returns the buffer size required for `group` under an optional
    /// dynamic batch override.
    ///
    /// Fixed-shape tensors ignore the override. For batch-variable tensors
    /// the override must lie in `1..=dims[0]`.
    pub fn effective_size(
        &self,
        group: usize,
        batch: Option<u32>,
    ) -> Result<usize, TensorMetaError> {
        let shape = self.shape(group)?;
        let Some(n) = batch.filter(|_| self.batch_variable) else {
            return self.size_bytes(group);
        };

        let max = shape.batch().unwrap_or(1);
        if n == 0 || n as usize > max {
            return Err(TensorMetaError::BatchOutOfRange {
                tensor: self.name.clone(),
                requested: n,
                max,
            });
        }
        shape
            .with_batch(n as usize)
            .size_bytes(self.dtype)
            .ok_or_else(|| self.overflow(group))
    }

    fn overflow(&self, group: usize) -> TensorMetaError {
        TensorMetaError::SizeOverflow {
            tensor: self.name.clone(),
            group,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc(batch_variable: bool) -> TensorDesc {
        TensorDesc {
            name: "images".into(),
            index: 0,
            dtype: DType::Uint8,
            layout: Layout::Nhwc,
            batch_variable,
            shapes: vec![Shape::new(vec![4, 8, 8, 3]), Shape::new(vec![1, 8, 8, 3])],
        }
    }

    #[test]
    fn test_group_sizes() {
        let d = desc(false);
        assert_eq!(d.num_groups(), 2);
        assert_eq!(d.size_bytes(0).unwrap(), 4 * 8 * 8 * 3);
        assert_eq!(d.size_bytes(1).unwrap(), 8 * 8 * 3);
        assert_eq!(d.max_size_bytes().unwrap(), 4 * 8 * 8 * 3);
    }

    #[test]
    fn test_group_out_of_range() {
        let d = desc(false);
        assert!(matches!(
            d.size_bytes(2),
            Err(TensorMetaError::GroupOutOfRange { groups: 2, .. })
        ));
    }

    #[test]
    fn test_fixed_tensor_ignores_batch() {
        let d = desc(false);
        assert_eq!(d.effective_size(0, Some(2)).unwrap(), 4 * 8 * 8 * 3);
    }

    #[test]
    fn test_batch_variable_tensor_scales() {
        let d = desc(true);
        assert_eq!(d.effective_size(0, Some(2)).unwrap(), 2 * 8 * 8 * 3);
        assert_eq!(d.effective_size(0, None).unwrap(), 4 * 8 * 8 * 3);
    }

    #[test]
    fn test_batch_out_of_range() {
        let d = desc(true);
        assert!(d.effective_size(0, Some(0)).is_err());
        assert!(d.effective_size(0, Some(5)).is_err());
        assert!(d.effective_size(1, Some(2)).is_err());
    }

    #[test]
    fn test_overflowing_group_is_an_error() {
        let mut d = desc(true);
        d.dtype = DType::Fp32;
        d.shapes.push(Shape::new(vec![1 << 32, 1 << 32]));
        assert!(matches!(
            d.size_bytes(2),
            Err(TensorMetaError::SizeOverflow { group: 2, .. })
        ));
        assert!(d.max_size_bytes().is_err());
        assert!(d.effective_size(2, None).is_err());
        assert_eq!(d.size_bytes(0).unwrap(), 4 * 8 * 8 * 3 * 4);
    }
}
