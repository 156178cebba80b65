// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for model image parsing.

/// Errors that can occur when reading or building a model image.
#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    /// The image file could not be read.
    #[error("failed to read model image: {0}")]
    Io(#[from] std::io::Error),

    /// The embedded manifest JSON is malformed.
    #[error("failed to parse manifest: {0}")]
    ManifestParse(#[from] serde_json::Error),

    /// The image does not start with the expected magic bytes.
    #[error("not a model image (bad magic)")]
    BadMagic,

    /// The image was produced for a container version this loader does not know.
    #[error("unsupported image format version {0}")]
    UnsupportedVersion(u32),

    /// The image is shorter than its header claims.
    #[error("truncated image: need {expected} bytes, have {actual}")]
    Truncated { expected: usize, actual: usize },

    /// The manifest is structurally valid JSON but semantically inconsistent.
    #[error("invalid manifest for model '{model}': {detail}")]
    InvalidManifest { model: String, detail: String },

    /// A tensor entry is inconsistent.
    #[error("invalid tensor '{tensor}': {detail}")]
    InvalidTensor { tensor: String, detail: String },
}
