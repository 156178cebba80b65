// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Allocation policies and copy directions.

use crate::MemKind;

/// Backing page strategy for device allocations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(i32)]
pub enum AllocPolicy {
    /// Try the huge-page pool, fall back to normal pages.
    #[default]
    HugeFirst = 0,
    /// Huge pages or nothing.
    HugeOnly = 1,
    /// Normal pages only.
    NormalOnly = 2,
}

impl AllocPolicy {
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(AllocPolicy::HugeFirst),
            1 => Some(AllocPolicy::HugeOnly),
            2 => Some(AllocPolicy::NormalOnly),
            _ => None,
        }
    }

    pub fn code(self) -> i32 {
        self as i32
    }
}

/// Which pool a block was carved from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolKind {
    Normal,
    Huge,
}

impl PoolKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PoolKind::Normal => "normal",
            PoolKind::Huge => "huge",
        }
    }
}

/// Explicit direction of a copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(i32)]
pub enum CopyKind {
    HostToHost = 0,
    HostToDevice = 1,
    DeviceToHost = 2,
    DeviceToDevice = 3,
    HostPhysToDevice = 4,
    DeviceToHostPhys = 5,
}

impl CopyKind {
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(CopyKind::HostToHost),
            1 => Some(CopyKind::HostToDevice),
            2 => Some(CopyKind::DeviceToHost),
            3 => Some(CopyKind::DeviceToDevice),
            4 => Some(CopyKind::HostPhysToDevice),
            5 => Some(CopyKind::DeviceToHostPhys),
            _ => None,
        }
    }

    pub fn code(self) -> i32 {
        self as i32
    }

    /// Whether `dst`/`src` kinds agree with this direction.
    pub fn accepts(self, dst: MemKind, src: MemKind) -> bool {
        use MemKind::*;
        match self {
            CopyKind::HostToHost => dst == Host && src == Host,
            CopyKind::HostToDevice => dst.is_device() && src == Host,
            CopyKind::DeviceToHost => dst == Host && src.is_device(),
            CopyKind::DeviceToDevice => dst.is_device() && src.is_device(),
            CopyKind::HostPhysToDevice => dst.is_device() && src == HostPhys,
            CopyKind::DeviceToHostPhys => dst == HostPhys && src.is_device(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        assert_eq!(AllocPolicy::from_code(1), Some(AllocPolicy::HugeOnly));
        assert_eq!(AllocPolicy::from_code(3), None);
        assert_eq!(CopyKind::from_code(5), Some(CopyKind::DeviceToHostPhys));
        assert_eq!(CopyKind::DeviceToDevice.code(), 3);
    }

    #[test]
    fn test_accepts() {
        let d = MemKind::Device(0);
        assert!(CopyKind::HostToDevice.accepts(d, MemKind::Host));
        assert!(!CopyKind::HostToDevice.accepts(MemKind::Host, d));
        assert!(CopyKind::DeviceToDevice.accepts(MemKind::Device(1), d));
        assert!(!CopyKind::HostToHost.accepts(MemKind::HostPhys, MemKind::Host));
        assert!(CopyKind::DeviceToHostPhys.accepts(MemKind::HostPhys, d));
    }

    #[test]
    fn test_policy_serde() {
        let json = serde_json::to_string(&AllocPolicy::NormalOnly).unwrap();
        assert_eq!(json, "\"normal_only\"");
        assert_eq!(AllocPolicy::default(), AllocPolicy::HugeFirst);
    }
}
