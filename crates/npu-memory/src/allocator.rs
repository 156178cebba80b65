// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Host and device memory allocation, copies and cache maintenance.
//!
//! The [`MemoryAllocator`] owns one pinned host arena and one arena per
//! configured device. Every call validates its pointers before touching
//! memory: null arguments are rejected up front, zero-length operations are
//! no-op successes, and copy directions are checked against the actual kind
//! of each address.
//!
//! # Thread Safety
//! `MemoryAllocator` is `Send + Sync`; each arena serialises its own block
//! table, and no call holds two arena locks at once.

use crate::arena::{Arena, BlockInfo, View};
use crate::ptr::{self, HOST_BASE};
use crate::{
    AllocPolicy, AllocationStats, CopyKind, DeviceBuffer, MemKind, MemPtr, MemoryBudget,
    MemoryError, PoolKind, PoolUsage,
};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Memory layout of one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DevicePools {
    pub device: u32,
    /// Total CMM, huge-page share included.
    pub cmm: MemoryBudget,
    /// Huge-page backed share of `cmm`.
    pub huge: MemoryBudget,
}

/// Allocator for pinned host memory and per-device memory.
///
/// # Example
/// ```
/// use npu_memory::{AllocPolicy, CopyKind, DevicePools, MemoryAllocator, MemoryBudget};
///
/// let mem = MemoryAllocator::new(
///     MemoryBudget::from_mb(16),
///     &[DevicePools { device: 0, cmm: MemoryBudget::from_mb(16), huge: MemoryBudget::from_mb(4) }],
/// ).unwrap();
///
/// let host = mem.alloc_host(4).unwrap();
/// let dev = mem.alloc_device(0, 4, AllocPolicy::NormalOnly).unwrap();
/// mem.write_bytes(host, &[1, 2, 3, 4]).unwrap();
/// mem.copy(dev, host, 4, CopyKind::HostToDevice).unwrap();
/// assert_eq!(mem.dma_read(dev, 4).unwrap(), vec![1, 2, 3, 4]);
/// ```
pub struct MemoryAllocator {
    host: Arc<Arena>,
    devices: BTreeMap<u32, Arc<Arena>>,
}

impl MemoryAllocator {
    pub fn new(host_budget: MemoryBudget, devices: &[DevicePools]) -> Result<Self, MemoryError> {
        let host = Arc::new(Arena::new(
            "host",
            MemKind::Host,
            HOST_BASE,
            host_budget,
            MemoryBudget::from_bytes(0),
        ));

        let mut arenas = BTreeMap::new();
        for pools in devices {
            if pools.device > ptr::MAX_DEVICE_ID {
                return Err(MemoryError::UnknownDevice(pools.device));
            }
            let normal = pools.cmm.saturating_sub(pools.huge);
            let huge = pools.huge.min(pools.cmm);
            arenas.insert(
                pools.device,
                Arc::new(Arena::new(
                    format!("device {}", pools.device),
                    MemKind::Device(pools.device),
                    ptr::device_base(pools.device),
                    normal,
                    huge,
                )),
            );
        }

        Ok(Self {
            host,
            devices: arenas,
        })
    }

    pub fn device_ids(&self) -> Vec<u32> {
        self.devices.keys().copied().collect()
    }

    // ── Device memory ──────────────────────────────────────────

    /// Allocates `size` bytes of uncached device memory.
    ///
    /// A zero size returns [`MemPtr::NULL`] without allocating.
    pub fn alloc_device(&self, device: u32, size: usize, policy: AllocPolicy) -> Result<MemPtr, MemoryError> {
        self.alloc_on_device(device, size, policy, false)
    }

    /// Allocates `size` bytes of device memory with a host cache view.
    ///
    /// Host accesses through [`write_bytes`](Self::write_bytes) and
    /// [`read_bytes`](Self::read_bytes) hit the cache; call
    /// [`flush`](Self::flush) before the device consumes the data and
    /// [`invalidate`](Self::invalidate) before the host reads device output.
    pub fn alloc_device_cached(&self, device: u32, size: usize, policy: AllocPolicy) -> Result<MemPtr, MemoryError> {
        self.alloc_on_device(device, size, policy, true)
    }

    /// Allocates an owned device block that frees itself on drop.
    pub fn alloc_device_buffer(&self, device: u32, size: usize, policy: AllocPolicy) -> Result<DeviceBuffer, MemoryError> {
        if size == 0 {
            return Err(MemoryError::ZeroSizedAllocation);
        }
        let arena = self.device_arena(device)?;
        let carved = arena.allocate(size, pools_for(policy), false)?;
        Ok(DeviceBuffer::new(Arc::clone(arena), carved.ptr, size, carved.serial))
    }

    /// Frees a block obtained from `alloc_device` or `alloc_device_cached`.
    pub fn free(&self, ptr: MemPtr) -> Result<(), MemoryError> {
        let arena = self.arena_of(ptr, "free")?;
        if !arena.kind().is_device() {
            return Err(MemoryError::WrongKind {
                ptr,
                actual: arena.kind(),
                expected: "device",
            });
        }
        let info = arena.release(ptr)?;
        tracing::debug!(%ptr, size = info.size, arena = arena.label(), "freed device block");
        Ok(())
    }

    // ── Host memory ────────────────────────────────────────────

    /// Allocates `size` bytes of pinned host memory.
    pub fn alloc_host(&self, size: usize) -> Result<MemPtr, MemoryError> {
        if size == 0 {
            return Ok(MemPtr::NULL);
        }
        let carved = self.host.allocate(size, &[PoolKind::Normal], false)?;
        tracing::debug!(ptr = %carved.ptr, size, "allocated pinned host block");
        Ok(carved.ptr)
    }

    pub fn free_host(&self, ptr: MemPtr) -> Result<(), MemoryError> {
        if ptr.is_null() {
            return Err(MemoryError::NullPointer { op: "free_host" });
        }
        if ptr.kind() != Some(MemKind::Host) {
            return Err(wrong_kind(ptr, "host"));
        }
        self.host.release(ptr)?;
        Ok(())
    }

    /// Returns the physical alias of a pinned host address.
    pub fn host_physical_address(&self, ptr: MemPtr) -> Result<MemPtr, MemoryError> {
        if ptr.is_null() {
            return Err(MemoryError::NullPointer { op: "host_physical_address" });
        }
        if ptr.kind() != Some(MemKind::Host) {
            return Err(wrong_kind(ptr, "host"));
        }
        self.host.check(ptr, 1)?;
        Ok(ptr::host_to_phys(ptr))
    }

    // ── Cache maintenance ──────────────────────────────────────

    /// Writes the host cache view of `ptr..ptr+size` back to memory.
    ///
    /// No-op for uncached blocks and host memory.
    pub fn flush(&self, ptr: MemPtr, size: usize) -> Result<(), MemoryError> {
        let (arena, ptr) = self.resolve(ptr, "flush")?;
        if size == 0 {
            return Ok(());
        }
        arena.flush(ptr, size)
    }

    /// Discards the host cache view of `ptr..ptr+size`, reloading it from memory.
    pub fn invalidate(&self, ptr: MemPtr, size: usize) -> Result<(), MemoryError> {
        let (arena, ptr) = self.resolve(ptr, "invalidate")?;
        if size == 0 {
            return Ok(());
        }
        arena.invalidate(ptr, size)
    }

    // ── Data movement ──────────────────────────────────────────

    /// Fills `count` bytes at `ptr` with `value` (DMA path).
    pub fn set(&self, ptr: MemPtr, value: u8, count: usize) -> Result<(), MemoryError> {
        let (arena, ptr) = self.resolve(ptr, "set")?;
        if count == 0 {
            return Ok(());
        }
        arena.fill(ptr, value, count)
    }

    /// Copies `count` bytes from `src` to `dst` in the given direction.
    pub fn copy(&self, dst: MemPtr, src: MemPtr, count: usize, kind: CopyKind) -> Result<(), MemoryError> {
        let (dst_arena, dst_ptr) = self.resolve(dst, "copy")?;
        let (src_arena, src_ptr) = self.resolve(src, "copy")?;
        let (dst_kind, src_kind) = (kind_of(dst)?, kind_of(src)?);
        if !kind.accepts(dst_kind, src_kind) {
            return Err(MemoryError::DirectionMismatch {
                kind,
                dst: dst_kind,
                src: src_kind,
            });
        }
        if count == 0 {
            return Ok(());
        }
        let data = src_arena.read(src_ptr, count, View::Dma)?;
        dst_arena.write(dst_ptr, &data, View::Dma)?;
        tracing::debug!(%dst, %src, count, ?kind, "copy");
        Ok(())
    }

    /// Byte-compares `count` bytes at `a` and `b`.
    pub fn compare(&self, a: MemPtr, b: MemPtr, count: usize) -> Result<bool, MemoryError> {
        let (arena_a, a) = self.resolve(a, "compare")?;
        let (arena_b, b) = self.resolve(b, "compare")?;
        if count == 0 {
            return Ok(true);
        }
        let lhs = arena_a.read(a, count, View::Dma)?;
        let rhs = arena_b.read(b, count, View::Dma)?;
        Ok(lhs == rhs)
    }

    /// Host CPU write through the mapping of `ptr`.
    ///
    /// For cached device blocks this lands in the cache view only.
    pub fn write_bytes(&self, ptr: MemPtr, data: &[u8]) -> Result<(), MemoryError> {
        let (arena, ptr) = self.resolve(ptr, "write_bytes")?;
        if data.is_empty() {
            return Ok(());
        }
        arena.write(ptr, data, View::Cpu)
    }

    /// Host CPU read through the mapping of `ptr`.
    pub fn read_bytes(&self, ptr: MemPtr, len: usize) -> Result<Vec<u8>, MemoryError> {
        let (arena, ptr) = self.resolve(ptr, "read_bytes")?;
        if len == 0 {
            return Ok(Vec::new());
        }
        arena.read(ptr, len, View::Cpu)
    }

    /// Device-side read (DMA engine / NPU view).
    pub fn dma_read(&self, ptr: MemPtr, len: usize) -> Result<Vec<u8>, MemoryError> {
        let (arena, ptr) = self.resolve(ptr, "dma_read")?;
        if len == 0 {
            return Ok(Vec::new());
        }
        arena.read(ptr, len, View::Dma)
    }

    /// Device-side write (DMA engine / NPU view).
    pub fn dma_write(&self, ptr: MemPtr, data: &[u8]) -> Result<(), MemoryError> {
        let (arena, ptr) = self.resolve(ptr, "dma_write")?;
        if data.is_empty() {
            return Ok(());
        }
        arena.write(ptr, data, View::Dma)
    }

    // ── Introspection ──────────────────────────────────────────

    /// Checks that `ptr..ptr+len` lies inside one live block and describes it.
    pub fn block(&self, ptr: MemPtr, len: usize) -> Result<BlockInfo, MemoryError> {
        let (arena, ptr) = self.resolve(ptr, "block")?;
        arena.check(ptr, len)
    }

    pub fn device_usage(&self, device: u32) -> Result<PoolUsage, MemoryError> {
        Ok(self.device_arena(device)?.usage())
    }

    pub fn host_usage(&self) -> PoolUsage {
        self.host.usage()
    }

    pub fn device_stats(&self, device: u32) -> Result<AllocationStats, MemoryError> {
        Ok(self.device_arena(device)?.stats())
    }

    pub fn host_stats(&self) -> AllocationStats {
        self.host.stats()
    }

    /// Frees every block on `device`. Outstanding pointers become invalid.
    pub fn release_device(&self, device: u32) -> Result<usize, MemoryError> {
        let count = self.device_arena(device)?.release_all()?;
        if count > 0 {
            tracing::warn!(device, blocks = count, "released all device memory");
        }
        Ok(count)
    }

    // ── Private helpers ────────────────────────────────────────

    fn alloc_on_device(&self, device: u32, size: usize, policy: AllocPolicy, cached: bool) -> Result<MemPtr, MemoryError> {
        let arena = self.device_arena(device)?;
        if size == 0 {
            return Ok(MemPtr::NULL);
        }
        let carved = arena.allocate(size, pools_for(policy), cached)?;
        tracing::debug!(
            device,
            ptr = %carved.ptr,
            size,
            pool = carved.pool.as_str(),
            cached,
            "allocated device block"
        );
        Ok(carved.ptr)
    }

    fn device_arena(&self, device: u32) -> Result<&Arc<Arena>, MemoryError> {
        self.devices
            .get(&device)
            .ok_or(MemoryError::UnknownDevice(device))
    }

    /// Null-checks `ptr`, finds its arena and translates physical aliases.
    fn resolve(&self, ptr: MemPtr, op: &'static str) -> Result<(&Arc<Arena>, MemPtr), MemoryError> {
        if ptr.is_null() {
            return Err(MemoryError::NullPointer { op });
        }
        match ptr.kind() {
            Some(MemKind::Host) => Ok((&self.host, ptr)),
            Some(MemKind::HostPhys) => Ok((&self.host, ptr::phys_to_host(ptr))),
            Some(MemKind::Device(id)) => self
                .devices
                .get(&id)
                .map(|a| (a, ptr))
                .ok_or(MemoryError::UnknownAddress(ptr)),
            None => Err(MemoryError::UnknownAddress(ptr)),
        }
    }

    fn arena_of(&self, ptr: MemPtr, op: &'static str) -> Result<&Arc<Arena>, MemoryError> {
        Ok(self.resolve(ptr, op)?.0)
    }
}

impl std::fmt::Debug for MemoryAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryAllocator")
            .field("host", &self.host)
            .field("devices", &self.devices.values().collect::<Vec<_>>())
            .finish()
    }
}

fn pools_for(policy: AllocPolicy) -> &'static [PoolKind] {
    match policy {
        AllocPolicy::HugeFirst => &[PoolKind::Huge, PoolKind::Normal],
        AllocPolicy::HugeOnly => &[PoolKind::Huge],
        AllocPolicy::NormalOnly => &[PoolKind::Normal],
    }
}

fn kind_of(ptr: MemPtr) -> Result<MemKind, MemoryError> {
    ptr.kind().ok_or(MemoryError::UnknownAddress(ptr))
}

fn wrong_kind(ptr: MemPtr, expected: &'static str) -> MemoryError {
    match ptr.kind() {
        Some(actual) => MemoryError::WrongKind { ptr, actual, expected },
        None => MemoryError::UnknownAddress(ptr),
    }
}
