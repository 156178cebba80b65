// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # npu-memory
//!
//! Host and device memory for the simulated NPU runtime.
//!
//! # Key Components
//!
//! - [`MemoryAllocator`]: device/host allocation, copies, `set`, `compare`,
//!   and cache maintenance (`flush`/`invalidate`).
//! - [`MemPtr`]: an opaque, self-describing address. The range an address
//!   falls in tells whether it is host, host-physical or device memory.
//! - [`AllocPolicy`]: huge-page preferred / huge-only / normal-only.
//! - [`CopyKind`]: the explicit copy direction, checked against the
//!   actual operand kinds.
//! - [`MemoryBudget`]: pool capacities with human-readable parsing
//!   (`"512M"`, `"2G"`).
//! - [`DeviceBuffer`]: an RAII device block for runtime-owned memory.
//! - [`AllocationStats`] / [`PoolUsage`]: accounting.
//!
//! # Cache Model
//!
//! ```text
//!            write_bytes / read_bytes
//!   host CPU ─────────────────────────► cache view ──┐
//!                                          ▲         │ flush
//!                               invalidate │         ▼
//!   DMA / NPU ─────────────────────────► backing memory
//!            copy / set / compare / dma_read / dma_write
//! ```
//!
//! Only blocks from `alloc_device_cached` have a cache view; for all other
//! blocks both paths hit backing memory and `flush`/`invalidate` are no-ops.

mod allocator;
mod arena;
mod budget;
mod error;
mod guard;
mod policy;
mod ptr;
mod stats;

pub use allocator::{DevicePools, MemoryAllocator};
pub use arena::BlockInfo;
pub use budget::MemoryBudget;
pub use error::MemoryError;
pub use guard::DeviceBuffer;
pub use policy::{AllocPolicy, CopyKind, PoolKind};
pub use ptr::{MemKind, MemPtr, MAX_DEVICE_ID};
pub use stats::{AllocationStats, PoolUsage};
