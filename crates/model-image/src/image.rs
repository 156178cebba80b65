// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Container framing: header, manifest, weight blob.

use crate::{ImageError, IoContract, ModelKind, ModelManifest};
use std::sync::Arc;

/// Leading magic bytes of every image.
pub const MAGIC: &[u8; 8] = b"NPUMODEL";

/// The only container version understood by this loader.
pub const FORMAT_VERSION: u32 = 1;

const HEADER_LEN: usize = 16;

/// Per-tensor system memory reserved by the loader for descriptors.
const SYS_BYTES_PER_TENSOR: u64 = 4096;

/// Fixed-size header preceding the manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageHeader {
    pub version: u32,
    pub manifest_len: u32,
}

impl ImageHeader {
    /// Reads and checks the 16-byte header.
    pub fn read(bytes: &[u8]) -> Result<Self, ImageError> {
        if bytes.len() < HEADER_LEN {
            return Err(ImageError::Truncated {
                expected: HEADER_LEN,
                actual: bytes.len(),
            });
        }
        if &bytes[..8] != MAGIC {
            return Err(ImageError::BadMagic);
        }
        let version = read_u32(&bytes[8..12]);
        if version != FORMAT_VERSION {
            return Err(ImageError::UnsupportedVersion(version));
        }
        let header = Self {
            version,
            manifest_len: read_u32(&bytes[12..16]),
        };
        let needed = header.weights_offset();
        if bytes.len() < needed {
            return Err(ImageError::Truncated {
                expected: needed,
                actual: bytes.len(),
            });
        }
        Ok(header)
    }

    pub fn weights_offset(&self) -> usize {
        HEADER_LEN + self.manifest_len as usize
    }

    pub(crate) fn write(manifest_len: u32, out: &mut Vec<u8>) {
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        out.extend_from_slice(&manifest_len.to_le_bytes());
    }
}

/// Working-set estimate for a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub struct Usage {
    /// Host-side system memory the loader needs.
    pub sys_size: u64,
    /// Device CMM needed for weights plus the largest IO buffers.
    pub cmm_size: u64,
}

impl Usage {
    fn compute(header: &ImageHeader, manifest: &ModelManifest, weights_len: usize) -> Self {
        Self {
            sys_size: HEADER_LEN as u64
                + header.manifest_len as u64
                + SYS_BYTES_PER_TENSOR * manifest.num_tensors() as u64,
            cmm_size: (weights_len as u64)
                .saturating_add(manifest.max_io_bytes().map_or(u64::MAX, |b| b as u64)),
        }
    }
}

/// A fully parsed model image.
#[derive(Debug, Clone)]
pub struct ModelImage {
    header: ImageHeader,
    manifest: ModelManifest,
    contract: Arc<IoContract>,
    weights: Vec<u8>,
}

impl ModelImage {
    /// Parses a complete image, copying the weight blob.
    pub fn parse(bytes: &[u8]) -> Result<Self, ImageError> {
        let (header, manifest) = Self::peek(bytes)?;
        let weights = bytes[header.weights_offset()..].to_vec();
        let contract = Arc::new(IoContract::from_manifest(&manifest));

        tracing::debug!(
            model = %manifest.name,
            inputs = contract.num_inputs(),
            outputs = contract.num_outputs(),
            weights = weights.len(),
            "parsed model image"
        );

        Ok(Self {
            header,
            manifest,
            contract,
            weights,
        })
    }

    /// Reads the header and manifest only. The weight blob is not touched.
    pub fn peek(bytes: &[u8]) -> Result<(ImageHeader, ModelManifest), ImageError> {
        let header = ImageHeader::read(bytes)?;
        let manifest = ModelManifest::from_slice(&bytes[HEADER_LEN..header.weights_offset()])?;
        manifest.validate()?;
        Ok((header, manifest))
    }

    /// Working-set estimate without a full parse.
    pub fn usage_of(bytes: &[u8]) -> Result<Usage, ImageError> {
        let (header, manifest) = Self::peek(bytes)?;
        let weights_len = bytes.len() - header.weights_offset();
        Ok(Usage::compute(&header, &manifest, weights_len))
    }

    /// Model kind without a full parse.
    pub fn kind_of(bytes: &[u8]) -> Result<ModelKind, ImageError> {
        Ok(Self::peek(bytes)?.1.kind)
    }

    pub fn usage(&self) -> Usage {
        Usage::compute(&self.header, &self.manifest, self.weights.len())
    }

    pub fn manifest(&self) -> &ModelManifest {
        &self.manifest
    }

    pub fn contract(&self) -> &Arc<IoContract> {
        &self.contract
    }

    pub fn weights(&self) -> &[u8] {
        &self.weights
    }

    pub fn name(&self) -> &str {
        &self.manifest.name
    }

    pub fn kind(&self) -> ModelKind {
        self.manifest.kind
    }

    pub fn compiler_version(&self) -> &str {
        &self.manifest.compiler_version
    }
}

fn read_u32(b: &[u8]) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&b[..4]);
    u32::from_le_bytes(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ImageBuilder;
    use tensor_meta::{DType, Layout, Shape};

    fn sample() -> Vec<u8> {
        ImageBuilder::new("sample", ModelKind::TwoCore)
            .compiler_version("npuc 1.4")
            .input("x", DType::Uint8, Layout::Nhwc, vec![Shape::new(vec![1, 4, 4, 3])])
            .output("y", DType::Fp32, Layout::None, vec![Shape::new(vec![1, 10])])
            .weights(vec![7u8; 100])
            .build()
            .unwrap()
    }

    #[test]
    fn test_parse() {
        let bytes = sample();
        let image = ModelImage::parse(&bytes).unwrap();
        assert_eq!(image.name(), "sample");
        assert_eq!(image.kind(), ModelKind::TwoCore);
        assert_eq!(image.compiler_version(), "npuc 1.4");
        assert_eq!(image.weights().len(), 100);
        assert_eq!(image.contract().num_outputs(), 1);
    }

    #[test]
    fn test_usage_matches_loaded() {
        let bytes = sample();
        let peeked = ModelImage::usage_of(&bytes).unwrap();
        let loaded = ModelImage::parse(&bytes).unwrap().usage();
        assert_eq!(peeked, loaded);

        let header = ImageHeader::read(&bytes).unwrap();
        assert_eq!(peeked.sys_size, 16 + header.manifest_len as u64 + 2 * 4096);
        assert_eq!(peeked.cmm_size, 100 + 48 + 40);
    }

    #[test]
    fn test_bad_magic() {
        let mut bytes = sample();
        bytes[0] = b'X';
        assert!(matches!(ModelImage::parse(&bytes), Err(ImageError::BadMagic)));
    }

    #[test]
    fn test_bad_version() {
        let mut bytes = sample();
        bytes[8] = 9;
        assert!(matches!(
            ModelImage::parse(&bytes),
            Err(ImageError::UnsupportedVersion(9))
        ));
    }

    #[test]
    fn test_truncated() {
        let bytes = sample();
        assert!(matches!(
            ModelImage::parse(&bytes[..10]),
            Err(ImageError::Truncated { .. })
        ));
        assert!(matches!(
            ModelImage::parse(&bytes[..20]),
            Err(ImageError::Truncated { .. })
        ));
    }

    #[test]
    fn test_overflowing_dims_rejected() {
        let json = r#"{"name":"huge","kind":"1core",
            "inputs":[{"name":"x","dtype":"fp32","shape_groups":[[4294967296,4294967296]]}],
            "outputs":[{"name":"y","dtype":"uint8","shape_groups":[[4]]}]}"#;
        let mut bytes = Vec::new();
        ImageHeader::write(json.len() as u32, &mut bytes);
        bytes.extend_from_slice(json.as_bytes());

        assert!(matches!(ModelImage::parse(&bytes), Err(ImageError::InvalidTensor { .. })));
        assert!(ModelImage::usage_of(&bytes).is_err());
        assert!(ModelImage::kind_of(&bytes).is_err());
    }

    #[test]
    fn test_garbage_manifest() {
        let mut bytes = Vec::new();
        ImageHeader::write(3, &mut bytes);
        bytes.extend_from_slice(b"{{{");
        assert!(matches!(
            ModelImage::parse(&bytes),
            Err(ImageError::ManifestParse(_))
        ));
    }

    #[test]
    fn test_kind_of() {
        assert_eq!(ModelImage::kind_of(&sample()).unwrap(), ModelKind::TwoCore);
    }
}
