// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Opaque memory addresses and the address-space map.
//!
//! Every address handed out by the allocator is self-describing: the range
//! it falls in tells whether it is pinned host memory, the physical alias of
//! pinned host memory, or device memory (and which device).
//!
//! ```text
//! 0x0000_1000_0000_0000  host physical alias  (1 TiB)
//! 0x0000_2000_0000_0000  host virtual         (1 TiB)
//! 0x0001_0000_0000_0000  device 0             (1 TiB each)
//! 0x0001_0100_0000_0000  device 1
//! ...
//! ```

use std::fmt;

/// Width of every address range.
pub(crate) const SPAN: u64 = 1 << 40;
pub(crate) const HOST_PHYS_BASE: u64 = 1 << 44;
pub(crate) const HOST_BASE: u64 = 2 << 44;
pub(crate) const DEVICE_BASE: u64 = 1 << 48;

/// Highest device id that fits the address map.
pub const MAX_DEVICE_ID: u32 = 4095;

/// An opaque address in host or device memory. Zero is null.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct MemPtr(u64);

impl MemPtr {
    pub const NULL: MemPtr = MemPtr(0);

    pub const fn new(addr: u64) -> Self {
        Self(addr)
    }

    pub const fn addr(self) -> u64 {
        self.0
    }

    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Returns the address `bytes` past this one.
    pub fn offset(self, bytes: usize) -> MemPtr {
        MemPtr(self.0.wrapping_add(bytes as u64))
    }

    /// Classifies the address by the range it falls in.
    pub fn kind(self) -> Option<MemKind> {
        let a = self.0;
        if (HOST_PHYS_BASE..HOST_PHYS_BASE + SPAN).contains(&a) {
            Some(MemKind::HostPhys)
        } else if (HOST_BASE..HOST_BASE + SPAN).contains(&a) {
            Some(MemKind::Host)
        } else if a >= DEVICE_BASE {
            let id = (a - DEVICE_BASE) / SPAN;
            u32::try_from(id)
                .ok()
                .filter(|id| *id <= MAX_DEVICE_ID)
                .map(MemKind::Device)
        } else {
            None
        }
    }
}

impl fmt::Debug for MemPtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MemPtr({:#x})", self.0)
    }
}

impl fmt::Display for MemPtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Which memory an address belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemKind {
    /// Pinned host memory, virtual address.
    Host,
    /// Pinned host memory, physical address (zero-copy transfers).
    HostPhys,
    /// Device memory on the given device.
    Device(u32),
}

impl MemKind {
    pub fn is_device(self) -> bool {
        matches!(self, MemKind::Device(_))
    }
}

impl fmt::Display for MemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemKind::Host => f.write_str("host"),
            MemKind::HostPhys => f.write_str("host-phys"),
            MemKind::Device(id) => write!(f, "device {id}"),
        }
    }
}

pub(crate) fn device_base(id: u32) -> u64 {
    DEVICE_BASE + id as u64 * SPAN
}

/// Translates a host physical alias to its virtual address.
pub(crate) fn phys_to_host(ptr: MemPtr) -> MemPtr {
    MemPtr(ptr.0 - HOST_PHYS_BASE + HOST_BASE)
}

pub(crate) fn host_to_phys(ptr: MemPtr) -> MemPtr {
    MemPtr(ptr.0 - HOST_BASE + HOST_PHYS_BASE)
}
