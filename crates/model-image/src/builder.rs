// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Programmatic construction of model images.

use crate::image::ImageHeader;
use crate::{ImageError, ManifestTensor, ModelKind, ModelManifest};
use std::path::Path;
use tensor_meta::{DType, Layout, Shape};

/// Builder for model images.
///
/// The builder validates the manifest before emitting bytes, so every image
/// it produces is loadable.
#[derive(Debug, Clone)]
pub struct ImageBuilder {
    manifest: ModelManifest,
    weights: Vec<u8>,
}

impl ImageBuilder {
    pub fn new(name: impl Into<String>, kind: ModelKind) -> Self {
        Self {
            manifest: ModelManifest {
                name: name.into(),
                compiler_version: String::new(),
                kind,
                latency_us: 0,
                inputs: Vec::new(),
                outputs: Vec::new(),
            },
            weights: Vec::new(),
        }
    }

    /// Starts from an existing manifest (used by `npu-rt pack`).
    pub fn from_manifest(manifest: ModelManifest) -> Self {
        Self {
            manifest,
            weights: Vec::new(),
        }
    }

    pub fn compiler_version(mut self, version: impl Into<String>) -> Self {
        self.manifest.compiler_version = version.into();
        self
    }

    pub fn latency_us(mut self, latency: u64) -> Self {
        self.manifest.latency_us = latency;
        self
    }

    pub fn input(self, name: &str, dtype: DType, layout: Layout, groups: Vec<Shape>) -> Self {
        self.tensor(true, name, dtype, layout, false, groups)
    }

    pub fn output(self, name: &str, dtype: DType, layout: Layout, groups: Vec<Shape>) -> Self {
        self.tensor(false, name, dtype, layout, false, groups)
    }

    /// Adds an input whose leading dimension follows the dynamic batch.
    pub fn batched_input(self, name: &str, dtype: DType, layout: Layout, groups: Vec<Shape>) -> Self {
        self.tensor(true, name, dtype, layout, true, groups)
    }

    /// Adds an output whose leading dimension follows the dynamic batch.
    pub fn batched_output(self, name: &str, dtype: DType, layout: Layout, groups: Vec<Shape>) -> Self {
        self.tensor(false, name, dtype, layout, true, groups)
    }

    pub fn weights(mut self, weights: Vec<u8>) -> Self {
        self.weights = weights;
        self
    }

    /// Validates the manifest and emits the container bytes.
    pub fn build(&self) -> Result<Vec<u8>, ImageError> {
        self.manifest.validate()?;
        let json = self.manifest.to_json()?;
        let manifest_len = u32::try_from(json.len()).map_err(|_| ImageError::InvalidManifest {
            model: self.manifest.name.clone(),
            detail: "manifest exceeds 4 GiB".into(),
        })?;

        let mut out = Vec::with_capacity(16 + json.len() + self.weights.len());
        ImageHeader::write(manifest_len, &mut out);
        out.extend_from_slice(json.as_bytes());
        out.extend_from_slice(&self.weights);
        Ok(out)
    }

    /// Builds and writes the image to `path`.
    pub fn write_to(&self, path: &Path) -> Result<usize, ImageError> {
        let bytes = self.build()?;
        std::fs::write(path, &bytes)?;
        tracing::debug!(path = %path.display(), bytes = bytes.len(), "wrote model image");
        Ok(bytes.len())
    }

    fn tensor(
        mut self,
        input: bool,
        name: &str,
        dtype: DType,
        layout: Layout,
        batch_variable: bool,
        shape_groups: Vec<Shape>,
    ) -> Self {
        let t = ManifestTensor {
            name: name.to_string(),
            dtype,
            layout,
            batch_variable,
            shape_groups,
        };
        if input {
            self.manifest.inputs.push(t);
        } else {
            self.manifest.outputs.push(t);
        }
        self
    }
}
