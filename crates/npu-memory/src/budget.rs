// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Pool capacities and human-readable size parsing.
//!
//! A [`MemoryBudget`] is the hard ceiling of one memory pool (system RAM,
//! device CMM, the huge-page share of CMM, pinned host memory). It parses
//! the sizes used in runtime configuration files.

use crate::MemoryError;
use std::fmt;

const KIB: usize = 1024;
const MIB: usize = 1024 * KIB;
const GIB: usize = 1024 * MIB;

/// A hard capacity ceiling for one memory pool.
///
/// # Parsing
/// - `"512M"` or `"512MB"` → 512 × 1024² bytes
/// - `"1G"` or `"1GB"` → 1 × 1024³ bytes
/// - `"2048K"` or `"2048KB"` → 2048 × 1024 bytes
/// - `"1073741824"` → raw byte count
///
/// A zero budget is allowed and disables the pool.
///
/// # Examples
/// ```
/// use npu_memory::MemoryBudget;
///
/// let b = MemoryBudget::parse("1G").unwrap();
/// assert_eq!(b.as_mb(), 1024);
/// assert_eq!(b.to_string(), "1 GB");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "BudgetRepr", into = "String")]
pub struct MemoryBudget {
    bytes: usize,
}

impl MemoryBudget {
    pub const fn from_bytes(bytes: usize) -> Self {
        Self { bytes }
    }

    pub const fn from_mb(mb: usize) -> Self {
        Self { bytes: mb * MIB }
    }

    pub const fn from_gb(gb: usize) -> Self {
        Self { bytes: gb * GIB }
    }

    pub fn as_bytes(&self) -> usize {
        self.bytes
    }

    /// Returns the budget in megabytes (truncated).
    pub fn as_mb(&self) -> usize {
        self.bytes / MIB
    }

    /// Parses a human-readable size string. Case-insensitive.
    pub fn parse(s: &str) -> Result<Self, MemoryError> {
        let s = s.trim();
        let upper = s.to_uppercase();

        let (num_str, multiplier) = [("GB", GIB), ("G", GIB), ("MB", MIB), ("M", MIB), ("KB", KIB), ("K", KIB), ("B", 1)]
            .iter()
            .find(|(suffix, _)| upper.ends_with(suffix))
            .map(|(suffix, mult)| (&upper[..upper.len() - suffix.len()], *mult))
            .unwrap_or((upper.as_str(), 1));

        let value: usize = num_str
            .trim()
            .parse()
            .map_err(|_| MemoryError::InvalidBudget(s.to_string()))?;

        let bytes = value
            .checked_mul(multiplier)
            .ok_or_else(|| MemoryError::InvalidBudget(s.to_string()))?;

        Ok(Self { bytes })
    }

    /// Returns `self - other`, clamped at zero.
    pub fn saturating_sub(self, other: MemoryBudget) -> MemoryBudget {
        Self {
            bytes: self.bytes.saturating_sub(other.bytes),
        }
    }
}

impl fmt::Display for MemoryBudget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.bytes;
        if b >= GIB && b % GIB == 0 {
            write!(f, "{} GB", b / GIB)
        } else if b >= MIB && b % MIB == 0 {
            write!(f, "{} MB", b / MIB)
        } else if b >= KIB && b % KIB == 0 {
            write!(f, "{} KB", b / KIB)
        } else {
            write!(f, "{b} B")
        }
    }
}

impl std::str::FromStr for MemoryBudget {
    type Err = MemoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<MemoryBudget> for String {
    fn from(b: MemoryBudget) -> String {
        b.to_string()
    }
}

/// Accepts either `"2G"` or a raw byte count in config files.
#[derive(serde::Deserialize)]
#[serde(untagged)]
enum BudgetRepr {
    Bytes(usize),
    Text(String),
}

impl TryFrom<BudgetRepr> for MemoryBudget {
    type Error = MemoryError;

    fn try_from(repr: BudgetRepr) -> Result<Self, Self::Error> {
        match repr {
            BudgetRepr::Bytes(bytes) => Ok(Self::from_bytes(bytes)),
            BudgetRepr::Text(s) => Self::parse(&s),
        }
    }
}
