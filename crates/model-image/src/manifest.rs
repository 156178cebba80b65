// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! JSON manifest embedded in every model image.
//!
//! # Format
//! ```json
//! {
//!   "name": "yolov5s",
//!   "compiler_version": "pulsar2 3.2",
//!   "kind": "1core",
//!   "latency_us": 1500,
//!   "inputs": [
//!     {
//!       "name": "images",
//!       "dtype": "uint8",
//!       "layout": "nhwc",
//!       "batch_variable": false,
//!       "shape_groups": [[1, 640, 640, 3]]
//!     }
//!   ],
//!   "outputs": [ ... ]
//! }
//! ```

use crate::ImageError;
use std::collections::HashSet;
use tensor_meta::{DType, Layout, Shape};

/// How many NPU cores a compiled model occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[repr(i32)]
pub enum ModelKind {
    #[serde(rename = "1core")]
    OneCore = 0,
    #[serde(rename = "2core")]
    TwoCore = 1,
    #[serde(rename = "3core")]
    ThreeCore = 2,
}

impl ModelKind {
    /// Number of physical cores this kind requires.
    pub fn cores(self) -> usize {
        match self {
            ModelKind::OneCore => 1,
            ModelKind::TwoCore => 2,
            ModelKind::ThreeCore => 3,
        }
    }

    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ModelKind::OneCore => "1core",
            ModelKind::TwoCore => "2core",
            ModelKind::ThreeCore => "3core",
        }
    }
}

impl std::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Top-level manifest, stored as JSON inside the image header.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ModelManifest {
    /// Human-readable model name.
    pub name: String,
    /// Version string of the compiler that produced the image.
    #[serde(default)]
    pub compiler_version: String,
    /// Core footprint.
    pub kind: ModelKind,
    /// Simulated device latency per execution, in microseconds.
    #[serde(default)]
    pub latency_us: u64,
    pub inputs: Vec<ManifestTensor>,
    pub outputs: Vec<ManifestTensor>,
}

/// A single input or output entry.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ManifestTensor {
    pub name: String,
    pub dtype: DType,
    #[serde(default)]
    pub layout: Layout,
    /// Whether dims[0] follows the dynamic batch override.
    #[serde(default)]
    pub batch_variable: bool,
    /// One dimension list per shape group.
    pub shape_groups: Vec<Shape>,
}

impl ModelManifest {
    /// Parses a manifest from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, ImageError> {
        let manifest: Self = serde_json::from_str(json)?;
        Ok(manifest)
    }

    /// Parses a manifest from raw JSON bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, ImageError> {
        let manifest: Self = serde_json::from_slice(bytes)?;
        Ok(manifest)
    }

    pub fn to_json(&self) -> Result<String, ImageError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Validates that the manifest is internally consistent.
    ///
    /// Checks:
    /// - At least one output is declared.
    /// - Tensor names are unique within each direction.
    /// - Every tensor declares the same number of shape groups, at least one.
    /// - No dimension is zero.
    /// - Every buffer size, and their sum, fits in a `usize`.
    /// - Batch-variable tensors have rank ≥ 1 in every group.
    pub fn validate(&self) -> Result<(), ImageError> {
        if self.outputs.is_empty() {
            return Err(ImageError::InvalidManifest {
                model: self.name.clone(),
                detail: "manifest declares no outputs".into(),
            });
        }

        let groups = self.num_groups();
        if groups == 0 {
            return Err(ImageError::InvalidManifest {
                model: self.name.clone(),
                detail: "tensors must declare at least one shape group".into(),
            });
        }

        for list in [&self.inputs, &self.outputs] {
            let mut seen = HashSet::new();
            for t in list.iter() {
                if !seen.insert(t.name.as_str()) {
                    return Err(ImageError::InvalidTensor {
                        tensor: t.name.clone(),
                        detail: "duplicate tensor name".into(),
                    });
                }
                t.validate(groups)?;
            }
        }

        if self.max_io_bytes().is_none() {
            return Err(ImageError::InvalidManifest {
                model: self.name.clone(),
                detail: "total IO buffer size overflows".into(),
            });
        }

        Ok(())
    }

    /// Number of shape groups, taken from the first declared tensor.
    pub fn num_groups(&self) -> usize {
        self.inputs
            .iter()
            .chain(self.outputs.iter())
            .next()
            .map(|t| t.shape_groups.len())
            .unwrap_or(0)
    }

    pub fn num_tensors(&self) -> usize {
        self.inputs.len() + self.outputs.len()
    }

    /// Sum over all tensors of the largest per-group buffer size, or `None`
    /// on overflow.
    pub fn max_io_bytes(&self) -> Option<usize> {
        self.inputs
            .iter()
            .chain(self.outputs.iter())
            .try_fold(0usize, |total, t| total.checked_add(t.max_size_bytes()?))
    }
}

impl ManifestTensor {
    fn validate(&self, groups: usize) -> Result<(), ImageError> {
        if self.shape_groups.len() != groups {
            return Err(ImageError::InvalidTensor {
                tensor: self.name.clone(),
                detail: format!(
                    "declares {} shape groups, expected {}",
                    self.shape_groups.len(),
                    groups
                ),
            });
        }
        for (g, shape) in self.shape_groups.iter().enumerate() {
            if shape.has_zero_dim() {
                return Err(ImageError::InvalidTensor {
                    tensor: self.name.clone(),
                    detail: format!("zero dimension in group {g}: {shape}"),
                });
            }
            if shape.size_bytes(self.dtype).is_none() {
                return Err(ImageError::InvalidTensor {
                    tensor: self.name.clone(),
                    detail: format!("buffer size overflows in group {g}: {shape} {}", self.dtype),
                });
            }
            if self.batch_variable && shape.rank() == 0 {
                return Err(ImageError::InvalidTensor {
                    tensor: self.name.clone(),
                    detail: "batch-variable tensor must have rank >= 1".into(),
                });
            }
        }
        Ok(())
    }

    /// Largest buffer size over the shape groups, or `None` on overflow.
    pub fn max_size_bytes(&self) -> Option<usize> {
        self.shape_groups
            .iter()
            .try_fold(0usize, |max, s| Some(max.max(s.size_bytes(self.dtype)?)))
    }
}
