// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for tensor descriptor queries.

/// Errors that can occur when querying a [`crate::TensorDesc`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TensorMetaError {
    /// The requested shape group does not exist for this tensor.
    #[error("shape group {group} out of range for tensor '{tensor}' ({groups} groups declared)")]
    GroupOutOfRange {
        tensor: String,
        group: usize,
        groups: usize,
    },

    /// A dynamic batch override exceeds the batch dimension of the group.
    #[error("batch size {requested} invalid for tensor '{tensor}' (allowed 1..={max})")]
    BatchOutOfRange {
        tensor: String,
        requested: u32,
        max: usize,
    },

    /// The byte size of a tensor in a group does not fit in a `usize`.
    #[error("size of tensor '{tensor}' in shape group {group} overflows")]
    SizeOverflow { tensor: String, group: usize },

    /// A dtype or layout label could not be parsed.
    #[error("unknown {what} '{label}'")]
    UnknownLabel { what: &'static str, label: String },
}
