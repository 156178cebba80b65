// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Context-aware front end of the memory allocator.
//!
//! Device allocations land on the device of the calling thread's current
//! context. The `_in` variants take the context explicitly instead. Every
//! other operation is addressed by pointer, and pointers identify their own
//! device, so no context is needed.

use crate::context::ContextManager;
use crate::handle::ContextHandle;
use crate::RuntimeError;
use npu_memory::{
    AllocPolicy, AllocationStats, BlockInfo, CopyKind, MemKind, MemPtr, MemoryAllocator, PoolUsage,
};
use npu_platform::Platform;
use std::sync::Arc;
use std::time::Instant;

/// Device and pinned host memory operations.
pub struct MemoryManager {
    contexts: Arc<ContextManager>,
    allocator: Arc<MemoryAllocator>,
    platform: Arc<Platform>,
}

impl MemoryManager {
    pub(crate) fn new(
        contexts: Arc<ContextManager>,
        allocator: Arc<MemoryAllocator>,
        platform: Arc<Platform>,
    ) -> Self {
        Self {
            contexts,
            allocator,
            platform,
        }
    }

    // ── Device memory ──────────────────────────────────────────

    /// Allocates uncached device memory on the current context's device.
    ///
    /// A zero size returns [`MemPtr::NULL`] without allocating.
    pub fn alloc_device(&self, size: usize, policy: AllocPolicy) -> Result<MemPtr, RuntimeError> {
        let device = self.contexts.current_device()?;
        Ok(self.allocator.alloc_device(device, size, policy)?)
    }

    /// Allocates device memory with a host cache view on the current
    /// context's device.
    pub fn alloc_device_cached(&self, size: usize, policy: AllocPolicy) -> Result<MemPtr, RuntimeError> {
        let device = self.contexts.current_device()?;
        Ok(self.allocator.alloc_device_cached(device, size, policy)?)
    }

    /// Allocates uncached device memory on the device of `ctx`.
    pub fn alloc_device_in(
        &self,
        ctx: ContextHandle,
        size: usize,
        policy: AllocPolicy,
    ) -> Result<MemPtr, RuntimeError> {
        let device = self.contexts.device_of(ctx)?;
        Ok(self.allocator.alloc_device(device, size, policy)?)
    }

    /// Allocates cached device memory on the device of `ctx`.
    pub fn alloc_device_cached_in(
        &self,
        ctx: ContextHandle,
        size: usize,
        policy: AllocPolicy,
    ) -> Result<MemPtr, RuntimeError> {
        let device = self.contexts.device_of(ctx)?;
        Ok(self.allocator.alloc_device_cached(device, size, policy)?)
    }

    pub fn free(&self, ptr: MemPtr) -> Result<(), RuntimeError> {
        Ok(self.allocator.free(ptr)?)
    }

    // ── Pinned host memory ─────────────────────────────────────

    pub fn alloc_host(&self, size: usize) -> Result<MemPtr, RuntimeError> {
        Ok(self.allocator.alloc_host(size)?)
    }

    pub fn free_host(&self, ptr: MemPtr) -> Result<(), RuntimeError> {
        Ok(self.allocator.free_host(ptr)?)
    }

    /// Physical alias of a pinned host address, for the `HostPhys*` copy kinds.
    pub fn host_physical_address(&self, ptr: MemPtr) -> Result<MemPtr, RuntimeError> {
        Ok(self.allocator.host_physical_address(ptr)?)
    }

    // ── Cache maintenance and transfers ────────────────────────

    /// Writes the host cache view of a cached block back to device memory.
    pub fn flush(&self, ptr: MemPtr, size: usize) -> Result<(), RuntimeError> {
        Ok(self.allocator.flush(ptr, size)?)
    }

    /// Refreshes the host cache view of a cached block from device memory.
    pub fn invalidate(&self, ptr: MemPtr, size: usize) -> Result<(), RuntimeError> {
        Ok(self.allocator.invalidate(ptr, size)?)
    }

    pub fn set(&self, ptr: MemPtr, value: u8, count: usize) -> Result<(), RuntimeError> {
        Ok(self.allocator.set(ptr, value, count)?)
    }

    /// Copies `count` bytes; `kind` must match the kinds of `dst` and `src`.
    ///
    /// Copies touching a device are accounted as device CPU load.
    pub fn copy(&self, dst: MemPtr, src: MemPtr, count: usize, kind: CopyKind) -> Result<(), RuntimeError> {
        let start = Instant::now();
        self.allocator.copy(dst, src, count, kind)?;
        if count > 0 {
            if let Some(device) = device_of(dst).or_else(|| device_of(src)) {
                self.platform.record_cpu_busy(device, start, start.elapsed());
            }
        }
        Ok(())
    }

    pub fn compare(&self, a: MemPtr, b: MemPtr, count: usize) -> Result<bool, RuntimeError> {
        Ok(self.allocator.compare(a, b, count)?)
    }

    /// Writes through the host mapping (host memory, or the cache view of a
    /// cached device block).
    pub fn write_mapped(&self, ptr: MemPtr, data: &[u8]) -> Result<(), RuntimeError> {
        Ok(self.allocator.write_bytes(ptr, data)?)
    }

    /// Reads through the host mapping.
    pub fn read_mapped(&self, ptr: MemPtr, len: usize) -> Result<Vec<u8>, RuntimeError> {
        Ok(self.allocator.read_bytes(ptr, len)?)
    }

    // ── Introspection ──────────────────────────────────────────

    /// Describes the live block containing `ptr..ptr+len`.
    pub fn block(&self, ptr: MemPtr, len: usize) -> Result<BlockInfo, RuntimeError> {
        Ok(self.allocator.block(ptr, len)?)
    }

    pub fn device_usage(&self, device: u32) -> Result<PoolUsage, RuntimeError> {
        Ok(self.allocator.device_usage(device)?)
    }

    pub fn device_stats(&self, device: u32) -> Result<AllocationStats, RuntimeError> {
        Ok(self.allocator.device_stats(device)?)
    }

    pub fn host_usage(&self) -> PoolUsage {
        self.allocator.host_usage()
    }

    pub fn host_stats(&self) -> AllocationStats {
        self.allocator.host_stats()
    }
}

impl std::fmt::Debug for MemoryManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryManager")
            .field("devices", &self.allocator.device_ids())
            .field("host_live", &self.allocator.host_usage().live())
            .finish()
    }
}

fn device_of(ptr: MemPtr) -> Option<u32> {
    match ptr.kind()? {
        MemKind::Device(id) => Some(id),
        MemKind::Host | MemKind::HostPhys => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DeviceManager, WorkTracker};
    use crate::ErrorKind;
    use npu_memory::{DevicePools, MemoryBudget};
    use npu_platform::BoardConfig;
    use std::time::Duration;

    fn fixture() -> (Arc<ContextManager>, MemoryManager) {
        let boards = vec![BoardConfig::with_id(0), BoardConfig::with_id(1)];
        let pools: Vec<DevicePools> = boards
            .iter()
            .map(|b| DevicePools {
                device: b.id,
                cmm: MemoryBudget::from_mb(8),
                huge: MemoryBudget::from_mb(1),
            })
            .collect();
        let platform = Arc::new(Platform::new(boards, Duration::from_secs(1)).unwrap());
        let allocator = Arc::new(MemoryAllocator::new(MemoryBudget::from_mb(8), &pools).unwrap());
        let devices = Arc::new(DeviceManager::new(
            Arc::clone(&platform),
            Arc::clone(&allocator),
            Arc::new(WorkTracker::default()),
        ));
        let contexts = Arc::new(ContextManager::new(devices, true));
        let memory = MemoryManager::new(Arc::clone(&contexts), allocator, platform);
        (contexts, memory)
    }

    #[test]
    fn test_alloc_without_context() {
        let (_contexts, mem) = fixture();
        let err = mem.alloc_device(64, AllocPolicy::HugeFirst).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }

    #[test]
    fn test_alloc_follows_current_context() {
        let (contexts, mem) = fixture();
        contexts.create(1).unwrap();
        let p = mem.alloc_device(64, AllocPolicy::NormalOnly).unwrap();
        assert_eq!(p.kind(), Some(MemKind::Device(1)));
        mem.free(p).unwrap();
    }

    #[test]
    fn test_alloc_in_explicit_context() {
        let (contexts, mem) = fixture();
        let c0 = contexts.create(0).unwrap();
        contexts.create(1).unwrap();
        let p = mem.alloc_device_in(c0, 64, AllocPolicy::NormalOnly).unwrap();
        assert_eq!(p.kind(), Some(MemKind::Device(0)));
        let c = mem.alloc_device_cached_in(c0, 64, AllocPolicy::NormalOnly).unwrap();
        assert!(mem.block(c, 64).unwrap().cached);
    }

    #[test]
    fn test_zero_size_is_null() {
        let (contexts, mem) = fixture();
        contexts.create(0).unwrap();
        assert!(mem.alloc_device(0, AllocPolicy::HugeFirst).unwrap().is_null());
    }

    #[test]
    fn test_null_arguments_rejected() {
        let (_contexts, mem) = fixture();
        for err in [
            mem.free(MemPtr::NULL).unwrap_err(),
            mem.flush(MemPtr::NULL, 4).unwrap_err(),
            mem.set(MemPtr::NULL, 0, 4).unwrap_err(),
            mem.copy(MemPtr::NULL, MemPtr::NULL, 4, CopyKind::HostToHost).unwrap_err(),
        ] {
            assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        }
    }

    #[test]
    fn test_huge_only_exhaustion() {
        let (contexts, mem) = fixture();
        contexts.create(0).unwrap();
        let err = mem.alloc_device(4 << 20, AllocPolicy::HugeOnly).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OutOfResources);
        let p = mem.alloc_device(4 << 20, AllocPolicy::HugeFirst).unwrap();
        mem.free(p).unwrap();
    }

    #[test]
    fn test_copy_records_device_cpu_load() {
        let (contexts, mem) = fixture();
        contexts.create(0).unwrap();
        let host = mem.alloc_host(1 << 20).unwrap();
        let dev = mem.alloc_device(1 << 20, AllocPolicy::NormalOnly).unwrap();
        mem.copy(dev, host, 1 << 20, CopyKind::HostToDevice).unwrap();
        let back = mem.alloc_host(1 << 20).unwrap();
        mem.copy(back, dev, 1 << 20, CopyKind::DeviceToHost).unwrap();
        assert!(mem.compare(host, back, 1 << 20).unwrap());
    }
}
