// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Model image loading from disk.
//!
//! Files are memory-mapped. A full load copies the weight blob out of the
//! mapping; header-only queries (usage, kind) never touch the weight pages.

use crate::{ImageError, ModelImage, ModelKind, ModelManifest, Usage};
use std::path::Path;

/// Loads model images from files.
///
/// # Example
/// ```no_run
/// use model_image::ImageLoader;
/// use std::path::Path;
///
/// let image = ImageLoader::load(Path::new("./models/yolo.npumodel")).unwrap();
/// println!("{} inputs", image.contract().num_inputs());
/// ```
pub struct ImageLoader;

impl ImageLoader {
    /// Loads and validates a complete image.
    pub fn load(path: &Path) -> Result<ModelImage, ImageError> {
        let mmap = Self::map(path)?;
        let image = ModelImage::parse(&mmap)?;
        tracing::info!(
            path = %path.display(),
            model = image.name(),
            kind = %image.kind(),
            "loaded model image"
        );
        Ok(image)
    }

    /// Reads only the manifest.
    pub fn manifest(path: &Path) -> Result<ModelManifest, ImageError> {
        let mmap = Self::map(path)?;
        Ok(ModelImage::peek(&mmap)?.1)
    }

    /// Working-set estimate from the header.
    pub fn usage(path: &Path) -> Result<Usage, ImageError> {
        let mmap = Self::map(path)?;
        ModelImage::usage_of(&mmap)
    }

    pub fn kind(path: &Path) -> Result<ModelKind, ImageError> {
        let mmap = Self::map(path)?;
        ModelImage::kind_of(&mmap)
    }

    fn map(path: &Path) -> Result<memmap2::Mmap, ImageError> {
        let file = std::fs::File::open(path)?;
        // SAFETY: the mapping is read-only and dropped before returning to
        // the caller; concurrent truncation by another process is not guarded.
        let mmap = unsafe { memmap2::Mmap::map(&file) }?;
        Ok(mmap)
    }
}
