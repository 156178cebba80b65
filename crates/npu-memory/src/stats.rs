// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Allocation statistics and pool occupancy.
//!
//! [`AllocationStats`] tracks cumulative metrics for one arena: how often
//! freed address ranges were recycled, peak live bytes, and OOM events.
//! [`PoolUsage`] is a point-in-time view of live versus total bytes, used
//! for device property snapshots.

/// Cumulative statistics about one arena.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct AllocationStats {
    /// Successful allocation requests.
    pub total_allocations: u64,
    /// Allocations served from a recycled address range.
    pub recycled: u64,
    /// Allocations that carved fresh address space.
    pub fresh: u64,
    /// HugeFirst requests that fell back to normal pages.
    pub huge_fallbacks: u64,
    /// Requests that failed on budget or address-space exhaustion.
    pub oom_count: u64,
    /// Peak live bytes.
    pub peak_live_bytes: usize,
    /// Total bytes ever allocated.
    pub cumulative_allocated_bytes: u64,
    pub total_frees: u64,
}

impl AllocationStats {
    /// Fraction of allocations served from recycled ranges, in `[0.0, 1.0]`.
    pub fn recycle_ratio(&self) -> f64 {
        let total = self.recycled + self.fresh;
        if total == 0 {
            return 0.0;
        }
        self.recycled as f64 / total as f64
    }

    pub(crate) fn record_alloc(&mut self, size: usize, recycled: bool) {
        self.total_allocations += 1;
        if recycled {
            self.recycled += 1;
        } else {
            self.fresh += 1;
        }
        self.cumulative_allocated_bytes += size as u64;
    }

    pub(crate) fn record_oom(&mut self) {
        self.oom_count += 1;
    }

    pub(crate) fn record_fallback(&mut self) {
        self.huge_fallbacks += 1;
    }

    pub(crate) fn record_free(&mut self) {
        self.total_frees += 1;
    }

    pub(crate) fn update_peak(&mut self, live_bytes: usize) {
        if live_bytes > self.peak_live_bytes {
            self.peak_live_bytes = live_bytes;
        }
    }

    /// Returns a human-readable summary.
    pub fn summary(&self) -> String {
        let peak_mb = self.peak_live_bytes as f64 / (1024.0 * 1024.0);
        format!(
            "Allocations: {} total ({} recycled, {} fresh, {:.0}% recycled), \
             {} huge fallbacks, {} OOMs, peak {:.2} MB, {} frees",
            self.total_allocations,
            self.recycled,
            self.fresh,
            self.recycle_ratio() * 100.0,
            self.huge_fallbacks,
            self.oom_count,
            peak_mb,
            self.total_frees,
        )
    }
}

/// Live/total bytes of an arena's two pools.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct PoolUsage {
    pub normal_total: usize,
    pub normal_live: usize,
    pub huge_total: usize,
    pub huge_live: usize,
    /// Number of live blocks.
    pub blocks: usize,
}

impl PoolUsage {
    pub fn total(&self) -> usize {
        self.normal_total + self.huge_total
    }

    pub fn live(&self) -> usize {
        self.normal_live + self.huge_live
    }

    pub fn free(&self) -> usize {
        self.total().saturating_sub(self.live())
    }
}
