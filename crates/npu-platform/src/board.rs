// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Static description of one accelerator board.

use npu_memory::MemoryBudget;

/// One board as seen on the bus.
///
/// Deserialised from the `[[devices]]` tables of the runtime configuration.
///
/// # Example
/// ```toml
/// [[devices]]
/// id = 0
/// uid = 1
/// pci_bus = 1
/// firmware = "V2.26.1"
/// sys_memory = "4G"
/// cmm_memory = "2G"
/// huge_memory = "512M"
/// ```
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct BoardConfig {
    /// Device id used by the runtime API.
    pub id: u32,
    /// Unique id burned into the board.
    pub uid: u64,
    pub pci_domain: u32,
    pub pci_bus: u32,
    pub pci_device: u32,
    /// Firmware version string.
    pub firmware: String,
    /// Board system memory.
    pub sys_memory: MemoryBudget,
    /// Contiguous memory available for device allocations.
    pub cmm_memory: MemoryBudget,
    /// Huge-page backed share of `cmm_memory`.
    pub huge_memory: MemoryBudget,
    /// Idle temperature.
    pub ambient_temp_c: f32,
    /// `false` simulates a board whose transport link is down.
    pub online: bool,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            id: 0,
            uid: 0x0650_0000_0000_0001,
            pci_domain: 0,
            pci_bus: 1,
            pci_device: 0,
            firmware: "V2.26.1".to_string(),
            sys_memory: MemoryBudget::from_gb(4),
            cmm_memory: MemoryBudget::from_gb(2),
            huge_memory: MemoryBudget::from_mb(512),
            ambient_temp_c: 40.0,
            online: true,
        }
    }
}

impl BoardConfig {
    /// Default board with a given id, placed on its own PCI bus.
    pub fn with_id(id: u32) -> Self {
        Self {
            id,
            uid: 0x0650_0000_0000_0001 + id as u64,
            pci_bus: id + 1,
            ..Self::default()
        }
    }

    /// `domain:bus:device` in the usual lspci notation.
    pub fn pci_address(&self) -> String {
        format!("{:04x}:{:02x}:{:02x}.0", self.pci_domain, self.pci_bus, self.pci_device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_board() {
        let b = BoardConfig::default();
        assert_eq!(b.id, 0);
        assert!(b.online);
        assert_eq!(b.cmm_memory, MemoryBudget::from_gb(2));
        assert_eq!(b.pci_address(), "0000:01:00.0");
    }

    #[test]
    fn test_with_id() {
        let b = BoardConfig::with_id(3);
        assert_eq!(b.id, 3);
        assert_eq!(b.pci_bus, 4);
        assert_ne!(b.uid, BoardConfig::default().uid);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let b: BoardConfig = toml::from_str("id = 2\ncmm_memory = \"1G\"\nonline = false\n").unwrap();
        assert_eq!(b.id, 2);
        assert_eq!(b.cmm_memory.as_mb(), 1024);
        assert_eq!(b.huge_memory.as_mb(), 512);
        assert!(!b.online);
    }
}
