// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Point-in-time device property snapshot.

use crate::ThermalInfo;

/// A complete reading of one board's identity and resource state.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct DeviceProperties {
    pub device: u32,
    pub firmware_version: String,
    pub uid: u64,
    pub pci_domain: u32,
    pub pci_bus: u32,
    pub pci_device: u32,
    pub thermal: ThermalInfo,
    pub total_sys_memory: u64,
    pub free_sys_memory: u64,
    pub total_cmm_memory: u64,
    pub free_cmm_memory: u64,
    /// Device CPU utilisation, percent.
    pub cpu_loading: f32,
    /// NPU utilisation, percent.
    pub npu_loading: f32,
    /// Unix timestamp in milliseconds when the snapshot was taken.
    pub timestamp_ms: u64,
}

impl DeviceProperties {
    /// Returns a one-line summary suitable for logging or CLI display.
    ///
    /// # Example output
    /// ```text
    /// Device 0 [0000:01:00.0] fw V2.26.1, NPU 12%, CPU 3%, CMM 1800/2048 MB free, Sys 4000/4096 MB free, Temp 44.2°C (OK)
    /// ```
    pub fn summary(&self) -> String {
        let thermal_status = if self.thermal.is_overheating() {
            "OVERHEATING"
        } else {
            "OK"
        };
        format!(
            "Device {} [{:04x}:{:02x}:{:02x}.0] fw {}, NPU {:.0}%, CPU {:.0}%, \
             CMM {}/{} MB free, Sys {}/{} MB free, Temp {:.1}°C ({thermal_status})",
            self.device,
            self.pci_domain,
            self.pci_bus,
            self.pci_device,
            self.firmware_version,
            self.npu_loading,
            self.cpu_loading,
            mb(self.free_cmm_memory),
            mb(self.total_cmm_memory),
            mb(self.free_sys_memory),
            mb(self.total_sys_memory),
            self.thermal.temp_celsius,
        )
    }

    /// Returns `true` if the board is under pressure: overheating, CMM
    /// below 64 MB free, or NPU above 90% busy.
    pub fn is_resource_constrained(&self) -> bool {
        self.thermal.is_overheating() || mb(self.free_cmm_memory) < 64 || self.npu_loading > 90.0
    }
}

fn mb(bytes: u64) -> u64 {
    bytes / (1024 * 1024)
}
