// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # tensor-meta
//!
//! Read-only tensor descriptors exchanged between the NPU runtime and its
//! callers.
//!
//! This crate provides:
//! - [`DType`]: element data types understood by the NPU (int4 … fp64).
//! - [`Layout`]: memory layout of a tensor (`nhwc`, `nchw`, or none).
//! - [`Shape`]: an ordered list of dimension sizes.
//! - [`TensorDesc`]: name, dtype, layout and one shape per shape group.
//!
//! Descriptors are plain values. They never point into engine-internal
//! memory, so they stay valid after the IO info they came from is destroyed.

mod descriptor;
mod dtype;
mod error;
mod layout;
mod shape;

pub use descriptor::TensorDesc;
pub use dtype::DType;
pub use error::TensorMetaError;
pub use layout::Layout;
pub use shape::Shape;
