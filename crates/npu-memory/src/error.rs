// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for memory management.

use crate::{CopyKind, MemKind, MemPtr};

/// Errors that can occur during allocation, copies and cache maintenance.
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    /// The requested allocation would exceed a pool budget.
    #[error("out of memory in {pool}: requested {requested_bytes} bytes, but only {available_bytes} available (budget: {budget_bytes})")]
    OutOfMemory {
        pool: String,
        requested_bytes: usize,
        available_bytes: usize,
        budget_bytes: usize,
    },

    /// A guarded buffer was requested with size zero.
    #[error("cannot allocate zero-sized buffer")]
    ZeroSizedAllocation,

    /// A null address was passed to `op`.
    #[error("null pointer passed to {op}")]
    NullPointer { op: &'static str },

    /// The address does not lie inside any live block.
    #[error("address {0} does not belong to a live block")]
    UnknownAddress(MemPtr),

    /// Free of an address that is not the start of a live block.
    #[error("invalid free of {0}: not a live block base (double free or foreign pointer)")]
    InvalidFree(MemPtr),

    /// The access range runs past the end of its block.
    #[error("access of {len} bytes at {ptr} overruns block {base} of {size} bytes")]
    OutOfBounds {
        ptr: MemPtr,
        len: usize,
        base: MemPtr,
        size: usize,
    },

    /// The address kind does not match what the operation expects.
    #[error("{ptr} is {actual} memory, expected {expected}")]
    WrongKind {
        ptr: MemPtr,
        actual: MemKind,
        expected: &'static str,
    },

    /// The copy direction disagrees with the actual kinds of its operands.
    #[error("copy direction {kind:?} does not match dst={dst}, src={src}")]
    DirectionMismatch {
        kind: CopyKind,
        dst: MemKind,
        src: MemKind,
    },

    /// No device with this id is managed by the allocator.
    #[error("unknown device {0}")]
    UnknownDevice(u32),

    /// A human-readable size string could not be parsed.
    #[error("invalid memory size '{0}': expected a number followed by an optional suffix (K, M, G)")]
    InvalidBudget(String),

    /// An internal pool inconsistency was detected.
    #[error("pool integrity error: {0}")]
    PoolCorruption(String),
}
