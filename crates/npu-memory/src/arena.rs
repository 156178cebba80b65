// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Address-space arena backing one memory domain.
//!
//! An [`Arena`] owns a 1 TiB slice of the address map and carves blocks out
//! of it. It:
//!
//! 1. Enforces two hard ceilings (normal and huge-page pools). Allocations
//!    that would exceed a pool's budget return `Err(OutOfMemory)`.
//! 2. Recycles freed address ranges, binned by size class, so a later
//!    allocation of the same class gets the same address back.
//! 3. Resolves interior pointers (`base + offset`) to their block through an
//!    ordered range lookup.
//! 4. Keeps a host cache view for blocks allocated as cached.
//!
//! # Size Classes
//! Address ranges are reserved at the next power of two ≥ the request, with
//! a 4 KiB minimum. Only the requested bytes are backed.

use crate::ptr::SPAN;
use crate::{AllocationStats, MemKind, MemPtr, MemoryBudget, MemoryError, PoolKind, PoolUsage};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

/// Minimum size class: 4 KiB. Anything smaller is rounded up.
const MIN_SIZE_CLASS: usize = 4096;

/// Which side of a cached block an access goes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum View {
    /// DMA engine and NPU: always backing memory.
    Dma,
    /// Host CPU through the mapping: the cache if the block has one.
    Cpu,
}

/// Description of a live block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    pub base: MemPtr,
    pub size: usize,
    pub pool: PoolKind,
    pub cached: bool,
}

/// Result of a successful allocation.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Carved {
    pub ptr: MemPtr,
    /// Identity of this allocation; never reused within an arena.
    pub serial: u64,
    pub pool: PoolKind,
}

struct Region {
    size: usize,
    class: usize,
    pool: PoolKind,
    serial: u64,
    backing: Vec<u8>,
    cache: Option<Vec<u8>>,
}

impl Region {
    fn info(&self, base: u64) -> BlockInfo {
        BlockInfo {
            base: MemPtr::new(base),
            size: self.size,
            pool: self.pool,
            cached: self.cache.is_some(),
        }
    }

    fn view(&self, view: View) -> &[u8] {
        match (view, &self.cache) {
            (View::Cpu, Some(cache)) => cache,
            _ => &self.backing,
        }
    }

    fn view_mut(&mut self, view: View) -> &mut [u8] {
        match (view, &mut self.cache) {
            (View::Cpu, Some(cache)) => cache,
            _ => &mut self.backing,
        }
    }
}

#[derive(Default)]
struct ArenaState {
    /// Bump cursor, as an offset from the arena base.
    cursor: u64,
    regions: BTreeMap<u64, Region>,
    /// Recycled address ranges: size_class → base addresses.
    free_ranges: HashMap<usize, Vec<u64>>,
    normal_live: usize,
    huge_live: usize,
    next_serial: u64,
}

impl ArenaState {
    fn live(&self, pool: PoolKind) -> usize {
        match pool {
            PoolKind::Normal => self.normal_live,
            PoolKind::Huge => self.huge_live,
        }
    }

    fn live_mut(&mut self, pool: PoolKind) -> &mut usize {
        match pool {
            PoolKind::Normal => &mut self.normal_live,
            PoolKind::Huge => &mut self.huge_live,
        }
    }

    /// Resolves `ptr..ptr+len` to its block and the offset inside it.
    fn locate(&mut self, ptr: MemPtr, len: usize) -> Result<(&mut Region, usize), MemoryError> {
        let addr = ptr.addr();
        let (base, region) = self
            .regions
            .range_mut(..=addr)
            .next_back()
            .ok_or(MemoryError::UnknownAddress(ptr))?;
        let offset = (addr - *base) as usize;
        if offset >= region.size {
            return Err(MemoryError::UnknownAddress(ptr));
        }
        if len > region.size - offset {
            return Err(MemoryError::OutOfBounds {
                ptr,
                len,
                base: MemPtr::new(*base),
                size: region.size,
            });
        }
        Ok((region, offset))
    }
}

/// One memory domain: pinned host memory, or one device's CMM.
pub(crate) struct Arena {
    label: String,
    kind: MemKind,
    base: u64,
    normal_budget: MemoryBudget,
    huge_budget: MemoryBudget,
    state: Mutex<ArenaState>,
    stats: Mutex<AllocationStats>,
}

impl Arena {
    pub(crate) fn new(
        label: impl Into<String>,
        kind: MemKind,
        base: u64,
        normal_budget: MemoryBudget,
        huge_budget: MemoryBudget,
    ) -> Self {
        Self {
            label: label.into(),
            kind,
            base,
            normal_budget,
            huge_budget,
            state: Mutex::new(ArenaState {
                next_serial: 1,
                ..ArenaState::default()
            }),
            stats: Mutex::new(AllocationStats::default()),
        }
    }

    pub(crate) fn kind(&self) -> MemKind {
        self.kind
    }

    pub(crate) fn label(&self) -> &str {
        &self.label
    }

    /// Carves a zero-filled block of `size` bytes from the first pool in
    /// `pools` with room for it.
    pub(crate) fn allocate(
        &self,
        size: usize,
        pools: &[PoolKind],
        cached: bool,
    ) -> Result<Carved, MemoryError> {
        let mut state = self.lock()?;

        let chosen = pools
            .iter()
            .copied()
            .find(|p| {
                state
                    .live(*p)
                    .checked_add(size)
                    .is_some_and(|total| total <= self.budget(*p).as_bytes())
            });
        let Some(pool) = chosen else {
            let last = pools.last().copied().unwrap_or(PoolKind::Normal);
            let budget = self.budget(last).as_bytes();
            let available = budget.saturating_sub(state.live(last));
            drop(state);
            self.with_stats(|s| s.record_oom());
            return Err(MemoryError::OutOfMemory {
                pool: format!("{} {} pool", self.label, last.as_str()),
                requested_bytes: size,
                available_bytes: available,
                budget_bytes: budget,
            });
        };
        let fell_back = pools.first().is_some_and(|first| *first != pool);

        let Some(class) = size_class_for(size) else {
            drop(state);
            return Err(self.address_space_exhausted(size, pool));
        };
        let recycled = state.free_ranges.get_mut(&class).and_then(|v| v.pop());
        let addr = match recycled {
            Some(addr) => addr,
            None => {
                let end = state.cursor.checked_add(class as u64).filter(|end| *end <= SPAN);
                let Some(end) = end else {
                    drop(state);
                    return Err(self.address_space_exhausted(size, pool));
                };
                let addr = self.base + state.cursor;
                state.cursor = end;
                addr
            }
        };

        let serial = state.next_serial;
        state.next_serial += 1;
        state.regions.insert(
            addr,
            Region {
                size,
                class,
                pool,
                serial,
                backing: vec![0u8; size],
                cache: cached.then(|| vec![0u8; size]),
            },
        );
        *state.live_mut(pool) += size;
        let live_total = state.normal_live + state.huge_live;
        drop(state);

        self.with_stats(|s| {
            s.record_alloc(size, recycled.is_some());
            if fell_back {
                s.record_fallback();
            }
            s.update_peak(live_total);
        });

        if fell_back {
            tracing::warn!(arena = %self.label, size, "huge-page pool exhausted, falling back to normal pages");
        }
        tracing::trace!(arena = %self.label, addr = %MemPtr::new(addr), size, ?pool, cached, "block allocated");
        Ok(Carved {
            ptr: MemPtr::new(addr),
            serial,
            pool,
        })
    }

    /// Frees the block starting exactly at `ptr`.
    pub(crate) fn release(&self, ptr: MemPtr) -> Result<BlockInfo, MemoryError> {
        self.release_matching(ptr, None)
    }

    /// Frees the block at `ptr` only if it is still the allocation `serial`.
    pub(crate) fn release_serial(&self, ptr: MemPtr, serial: u64) -> Result<BlockInfo, MemoryError> {
        self.release_matching(ptr, Some(serial))
    }

    fn release_matching(&self, ptr: MemPtr, serial: Option<u64>) -> Result<BlockInfo, MemoryError> {
        let mut state = self.lock()?;
        let addr = ptr.addr();
        let matches = state
            .regions
            .get(&addr)
            .map(|r| serial.map_or(true, |s| s == r.serial))
            .unwrap_or(false);
        if !matches {
            return Err(MemoryError::InvalidFree(ptr));
        }
        let region = state
            .regions
            .remove(&addr)
            .ok_or(MemoryError::InvalidFree(ptr))?;
        *state.live_mut(region.pool) -= region.size;
        state.free_ranges.entry(region.class).or_default().push(addr);
        let info = region.info(addr);
        drop(state);

        self.with_stats(|s| s.record_free());
        Ok(info)
    }

    /// Frees every live block. Returns how many there were.
    pub(crate) fn release_all(&self) -> Result<usize, MemoryError> {
        let mut state = self.lock()?;
        let count = state.regions.len();
        let freed: Vec<(u64, usize)> = state.regions.iter().map(|(a, r)| (*a, r.class)).collect();
        for (addr, class) in freed {
            state.free_ranges.entry(class).or_default().push(addr);
        }
        state.regions.clear();
        state.normal_live = 0;
        state.huge_live = 0;
        drop(state);

        self.with_stats(|s| {
            for _ in 0..count {
                s.record_free();
            }
        });
        Ok(count)
    }

    /// Checks that `ptr..ptr+len` lies inside one live block.
    pub(crate) fn check(&self, ptr: MemPtr, len: usize) -> Result<BlockInfo, MemoryError> {
        let mut state = self.lock()?;
        let (region, offset) = state.locate(ptr, len)?;
        Ok(region.info(ptr.addr() - offset as u64))
    }

    pub(crate) fn read(&self, ptr: MemPtr, len: usize, view: View) -> Result<Vec<u8>, MemoryError> {
        let mut state = self.lock()?;
        let (region, offset) = state.locate(ptr, len)?;
        Ok(region.view(view)[offset..offset + len].to_vec())
    }

    pub(crate) fn write(&self, ptr: MemPtr, data: &[u8], view: View) -> Result<(), MemoryError> {
        let mut state = self.lock()?;
        let (region, offset) = state.locate(ptr, data.len())?;
        region.view_mut(view)[offset..offset + data.len()].copy_from_slice(data);
        Ok(())
    }

    pub(crate) fn fill(&self, ptr: MemPtr, value: u8, len: usize) -> Result<(), MemoryError> {
        let mut state = self.lock()?;
        let (region, offset) = state.locate(ptr, len)?;
        region.backing[offset..offset + len].fill(value);
        Ok(())
    }

    /// Pushes the cache view of a cached block to backing memory.
    pub(crate) fn flush(&self, ptr: MemPtr, len: usize) -> Result<(), MemoryError> {
        let mut state = self.lock()?;
        let (region, offset) = state.locate(ptr, len)?;
        if let Some(cache) = &region.cache {
            region.backing[offset..offset + len].copy_from_slice(&cache[offset..offset + len]);
        }
        Ok(())
    }

    /// Refreshes the cache view of a cached block from backing memory.
    pub(crate) fn invalidate(&self, ptr: MemPtr, len: usize) -> Result<(), MemoryError> {
        let mut state = self.lock()?;
        let (region, offset) = state.locate(ptr, len)?;
        if let Some(cache) = &mut region.cache {
            cache[offset..offset + len].copy_from_slice(&region.backing[offset..offset + len]);
        }
        Ok(())
    }

    pub(crate) fn usage(&self) -> PoolUsage {
        self.state
            .lock()
            .map(|s| PoolUsage {
                normal_total: self.normal_budget.as_bytes(),
                normal_live: s.normal_live,
                huge_total: self.huge_budget.as_bytes(),
                huge_live: s.huge_live,
                blocks: s.regions.len(),
            })
            .unwrap_or_default()
    }

    pub(crate) fn stats(&self) -> AllocationStats {
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }

    fn address_space_exhausted(&self, size: usize, pool: PoolKind) -> MemoryError {
        self.with_stats(|s| s.record_oom());
        MemoryError::OutOfMemory {
            pool: format!("{} address space", self.label),
            requested_bytes: size,
            available_bytes: 0,
            budget_bytes: self.budget(pool).as_bytes(),
        }
    }

    fn budget(&self, pool: PoolKind) -> MemoryBudget {
        match pool {
            PoolKind::Normal => self.normal_budget,
            PoolKind::Huge => self.huge_budget,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, ArenaState>, MemoryError> {
        self.state
            .lock()
            .map_err(|_| MemoryError::PoolCorruption(format!("{} arena lock poisoned", self.label)))
    }

    fn with_stats(&self, f: impl FnOnce(&mut AllocationStats)) {
        if let Ok(mut stats) = self.stats.lock() {
            f(&mut stats);
        }
    }
}

impl std::fmt::Debug for Arena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let usage = self.usage();
        f.debug_struct("Arena")
            .field("label", &self.label)
            .field("normal_budget", &self.normal_budget)
            .field("huge_budget", &self.huge_budget)
            .field("live_bytes", &usage.live())
            .field("blocks", &usage.blocks)
            .finish()
    }
}

/// Returns the smallest power of 2 that is ≥ `size` and ≥ `MIN_SIZE_CLASS`,
/// or `None` when no such class fits in a `usize`.
fn size_class_for(size: usize) -> Option<usize> {
    size.max(MIN_SIZE_CLASS).checked_next_power_of_two()
}
