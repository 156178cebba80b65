// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! RAII device buffer that frees its block on drop.
//!
//! [`DeviceBuffer`] is used for memory the runtime itself owns (model
//! weights). Client buffers go through the raw `alloc_device`/`free` pair
//! instead, since their lifetime is managed by the caller.

use crate::arena::{Arena, View};
use crate::{MemPtr, MemoryError};
use std::sync::Arc;

/// An owned device block, returned to its arena when dropped.
///
/// The guard remembers the identity serial of its allocation, so a block
/// that was already reclaimed (e.g. by a device reset) and re-issued to
/// someone else is never freed a second time.
pub struct DeviceBuffer {
    arena: Arc<Arena>,
    ptr: MemPtr,
    size: usize,
    serial: u64,
}

impl DeviceBuffer {
    pub(crate) fn new(arena: Arc<Arena>, ptr: MemPtr, size: usize, serial: u64) -> Self {
        Self {
            arena,
            ptr,
            size,
            serial,
        }
    }

    pub fn ptr(&self) -> MemPtr {
        self.ptr
    }

    pub fn size_bytes(&self) -> usize {
        self.size
    }

    /// Writes `data` at `offset` through the DMA path.
    pub fn upload(&self, offset: usize, data: &[u8]) -> Result<(), MemoryError> {
        self.arena.write(self.ptr.offset(offset), data, View::Dma)
    }

    /// Reads the whole block through the DMA path.
    pub fn download(&self) -> Result<Vec<u8>, MemoryError> {
        self.arena.read(self.ptr, self.size, View::Dma)
    }
}

impl Drop for DeviceBuffer {
    fn drop(&mut self) {
        if let Err(e) = self.arena.release_serial(self.ptr, self.serial) {
            tracing::debug!(ptr = %self.ptr, error = %e, "device buffer already reclaimed");
        }
    }
}

impl std::fmt::Debug for DeviceBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceBuffer")
            .field("arena", &self.arena.label())
            .field("ptr", &self.ptr)
            .field("size_bytes", &self.size)
            .finish()
    }
}
