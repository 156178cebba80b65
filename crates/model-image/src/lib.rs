// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # model-image
//!
//! The compiled-model container understood by the simulated NPU loader.
//!
//! The runtime core treats model files as opaque blobs and hands them to the
//! loader in this crate, which provides:
//!
//! - [`ModelManifest`]: the JSON descriptor embedded in every image.
//! - [`ModelImage`]: a parsed image: manifest, IO contract, weight blob.
//! - [`IoContract`]: the declared inputs/outputs with a name→index map
//!   built once at construction time.
//! - [`ImageLoader`]: memory-mapped loading and header-only peeking.
//! - [`ImageBuilder`]: produces images (used by tests and the CLI `pack`).
//! - [`Usage`]: working-set estimates computed without a full load.
//!
//! # Container Format
//! ```text
//! offset 0    : magic  b"NPUMODEL"
//! offset 8    : u32 LE format version
//! offset 12   : u32 LE manifest length N
//! offset 16   : N bytes JSON manifest
//! offset 16+N : weights blob
//! ```
//!
//! # Example
//! ```
//! use model_image::{ImageBuilder, ModelImage, ModelKind};
//! use tensor_meta::{DType, Layout, Shape};
//!
//! let bytes = ImageBuilder::new("tiny", ModelKind::OneCore)
//!     .input("x", DType::Uint8, Layout::None, vec![Shape::new(vec![1, 16])])
//!     .output("y", DType::Uint8, Layout::None, vec![Shape::new(vec![1, 16])])
//!     .build()
//!     .unwrap();
//! let image = ModelImage::parse(&bytes).unwrap();
//! assert_eq!(image.contract().num_inputs(), 1);
//! ```

mod builder;
mod contract;
mod error;
mod image;
mod loader;
mod manifest;

pub use builder::ImageBuilder;
pub use contract::{Direction, IoContract};
pub use error::ImageError;
pub use image::{ImageHeader, ModelImage, Usage, FORMAT_VERSION, MAGIC};
pub use loader::ImageLoader;
pub use manifest::{ManifestTensor, ModelKind, ModelManifest};
