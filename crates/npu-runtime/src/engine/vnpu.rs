// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Virtual NPU partitioning and core affinity.
//!
//! The physical NPU has three cores. The vNPU kind chosen at engine init
//! splits them into partitions; an affinity mask selects partitions by bit
//! index.
//!
//! | Kind        | Partitions (cores) |
//! |-------------|--------------------|
//! | Disable     | [3]                |
//! | Enable      | [1, 1, 1]          |
//! | BigLittle   | [2, 1]             |
//! | LittleBig   | [1, 2]             |

use crate::RuntimeError;
use model_image::ModelKind;

/// Partitioning mode of the NPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
#[repr(i32)]
pub enum VNpuKind {
    Disable = 0,
    Enable = 1,
    BigLittle = 2,
    LittleBig = 3,
}

impl VNpuKind {
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(VNpuKind::Disable),
            1 => Some(VNpuKind::Enable),
            2 => Some(VNpuKind::BigLittle),
            3 => Some(VNpuKind::LittleBig),
            _ => None,
        }
    }

    pub fn code(self) -> i32 {
        self as i32
    }

    /// Cores per partition, indexed by affinity bit.
    pub fn partitions(self) -> &'static [usize] {
        match self {
            VNpuKind::Disable => &[3],
            VNpuKind::Enable => &[1, 1, 1],
            VNpuKind::BigLittle => &[2, 1],
            VNpuKind::LittleBig => &[1, 2],
        }
    }

    pub fn largest_partition(self) -> usize {
        self.partitions().iter().copied().max().unwrap_or(0)
    }

    /// Mask of the partitions able to run a model of `kind`.
    pub fn eligible_mask(self, kind: ModelKind) -> u32 {
        self.partitions()
            .iter()
            .enumerate()
            .filter(|(_, cores)| **cores >= kind.cores())
            .fold(0, |mask, (i, _)| mask | (1 << i))
    }

    /// Checks that a model of `kind` fits some partition.
    pub fn check_fits(self, kind: ModelKind) -> Result<(), RuntimeError> {
        if kind.cores() > self.largest_partition() {
            return Err(RuntimeError::InvalidArgument(format!(
                "{kind} model needs {} cores; largest {self} partition has {}",
                kind.cores(),
                self.largest_partition()
            )));
        }
        Ok(())
    }

    /// Checks an affinity mask for a model of `kind`.
    pub fn check_affinity(self, mask: u32, kind: ModelKind) -> Result<(), RuntimeError> {
        if mask == 0 {
            return Err(RuntimeError::InvalidArgument("affinity mask is empty".into()));
        }
        let all = (1u32 << self.partitions().len()) - 1;
        if mask & !all != 0 {
            return Err(RuntimeError::InvalidArgument(format!(
                "affinity mask {mask:#b} selects partitions beyond the {} of {self}",
                self.partitions().len()
            )));
        }
        let eligible = self.eligible_mask(kind);
        if mask & !eligible != 0 {
            return Err(RuntimeError::InvalidArgument(format!(
                "affinity mask {mask:#b} selects partitions too small for a {kind} model (eligible {eligible:#b})"
            )));
        }
        Ok(())
    }

    pub fn as_str(self) -> &'static str {
        match self {
            VNpuKind::Disable => "disable",
            VNpuKind::Enable => "enable",
            VNpuKind::BigLittle => "big-little",
            VNpuKind::LittleBig => "little-big",
        }
    }
}

impl std::fmt::Display for VNpuKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for VNpuKind {
    type Err = RuntimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "disable" | "disabled" => Ok(VNpuKind::Disable),
            "enable" | "enabled" => Ok(VNpuKind::Enable),
            "big-little" | "big_little" => Ok(VNpuKind::BigLittle),
            "little-big" | "little_big" => Ok(VNpuKind::LittleBig),
            other => Err(RuntimeError::InvalidArgument(format!("unknown vNPU kind '{other}'"))),
        }
    }
}
