// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # npu-platform
//!
//! The simulated bus of NPU boards behind the runtime.
//!
//! # Provided State
//! - **Enumeration**: boards in discovery order, with their ids.
//! - **Probing**: a board configured offline reports itself unavailable.
//! - **Load**: NPU and device-CPU busy intervals over a sliding window.
//! - **Thermal**: temperature modelled from idle temperature and NPU load.
//! - **System memory**: bytes reserved by loaded models.
//!
//! Device memory (CMM) occupancy lives in `npu-memory`; callers pass it in
//! when asking for a [`DeviceProperties`] snapshot.
//!
//! # Example
//! ```
//! use npu_platform::{BoardConfig, Platform};
//! use npu_memory::PoolUsage;
//! use std::time::Duration;
//!
//! let platform = Platform::new(vec![BoardConfig::default()], Duration::from_secs(1)).unwrap();
//! let props = platform.properties(0, PoolUsage::default()).unwrap();
//! println!("{}", props.summary());
//! ```

mod board;
mod error;
mod load;
mod properties;
mod thermal;

pub use board::BoardConfig;
pub use error::PlatformError;
pub use load::LoadTracker;
pub use properties::DeviceProperties;
pub use thermal::ThermalInfo;

use npu_memory::PoolUsage;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Live state of one enumerated board.
#[derive(Debug)]
struct Board {
    config: BoardConfig,
    npu_load: LoadTracker,
    cpu_load: LoadTracker,
    sys_reserved: AtomicU64,
}

/// The set of boards visible to the runtime.
#[derive(Debug)]
pub struct Platform {
    boards: Vec<Board>,
}

impl Platform {
    /// Enumerates `boards` in the given order.
    pub fn new(boards: Vec<BoardConfig>, load_window: Duration) -> Result<Self, PlatformError> {
        let mut seen = HashSet::new();
        for b in &boards {
            if !seen.insert(b.id) {
                return Err(PlatformError::InvalidConfig(format!("duplicate device id {}", b.id)));
            }
            if b.huge_memory > b.cmm_memory {
                return Err(PlatformError::InvalidConfig(format!(
                    "device {}: huge_memory ({}) exceeds cmm_memory ({})",
                    b.id, b.huge_memory, b.cmm_memory
                )));
            }
        }

        let boards = boards
            .into_iter()
            .map(|config| Board {
                config,
                npu_load: LoadTracker::new(load_window),
                cpu_load: LoadTracker::new(load_window),
                sys_reserved: AtomicU64::new(0),
            })
            .collect();
        Ok(Self { boards })
    }

    /// Device ids in discovery order.
    pub fn device_ids(&self) -> Vec<u32> {
        self.boards.iter().map(|b| b.config.id).collect()
    }

    pub fn count(&self) -> usize {
        self.boards.len()
    }

    pub fn board(&self, id: u32) -> Result<&BoardConfig, PlatformError> {
        Ok(&self.get(id)?.config)
    }

    /// Checks that the board answers on its link.
    pub fn probe(&self, id: u32) -> Result<(), PlatformError> {
        let board = self.get(id)?;
        if !board.config.online {
            return Err(PlatformError::Unavailable {
                device: id,
                reason: format!("no link on {}", board.config.pci_address()),
            });
        }
        Ok(())
    }

    /// Records NPU work on `id`.
    pub fn record_npu_busy(&self, id: u32, start: Instant, busy: Duration) {
        if let Ok(b) = self.get(id) {
            b.npu_load.record(start, busy);
        }
    }

    /// Records device-CPU work (DMA setup, copies) on `id`.
    pub fn record_cpu_busy(&self, id: u32, start: Instant, busy: Duration) {
        if let Ok(b) = self.get(id) {
            b.cpu_load.record(start, busy);
        }
    }

    /// Reserves board system memory for a loaded model.
    pub fn reserve_sys(&self, id: u32, bytes: u64) {
        if let Ok(b) = self.get(id) {
            b.sys_reserved.fetch_add(bytes, Ordering::AcqRel);
        }
    }

    pub fn release_sys(&self, id: u32, bytes: u64) {
        if let Ok(b) = self.get(id) {
            let _ = b
                .sys_reserved
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| Some(v.saturating_sub(bytes)));
        }
    }

    /// Takes a property snapshot. `cmm` is the device's CMM occupancy.
    ///
    /// Properties are readable without activating the device.
    pub fn properties(&self, id: u32, cmm: PoolUsage) -> Result<DeviceProperties, PlatformError> {
        let board = self.get(id)?;
        let cfg = &board.config;
        let npu_loading = board.npu_load.utilisation();
        let total_sys = cfg.sys_memory.as_bytes() as u64;
        let reserved = board.sys_reserved.load(Ordering::Acquire);

        Ok(DeviceProperties {
            device: id,
            firmware_version: cfg.firmware.clone(),
            uid: cfg.uid,
            pci_domain: cfg.pci_domain,
            pci_bus: cfg.pci_bus,
            pci_device: cfg.pci_device,
            thermal: ThermalInfo::model(cfg.ambient_temp_c, npu_loading),
            total_sys_memory: total_sys,
            free_sys_memory: total_sys.saturating_sub(reserved),
            total_cmm_memory: cmm.total() as u64,
            free_cmm_memory: cmm.free() as u64,
            cpu_loading: board.cpu_load.utilisation(),
            npu_loading,
            timestamp_ms: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0),
        })
    }

    fn get(&self, id: u32) -> Result<&Board, PlatformError> {
        self.boards
            .iter()
            .find(|b| b.config.id == id)
            .ok_or(PlatformError::UnknownDevice(id))
    }
}
