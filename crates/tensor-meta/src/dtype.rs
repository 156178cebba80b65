// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Supported tensor element data types.

use crate::TensorMetaError;
use std::str::FromStr;

/// Enumerates the element types a model tensor can declare.
///
/// The discriminants match the codes reported by the NPU toolchain, so a
/// `DType` can be exchanged with native code as a plain integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(i32)]
pub enum DType {
    Int4 = 1,
    Uint4 = 2,
    Int8 = 3,
    Uint8 = 4,
    Int16 = 5,
    Uint16 = 6,
    Int32 = 7,
    Uint32 = 8,
    Int64 = 9,
    Uint64 = 10,
    Fp4 = 11,
    Fp8 = 12,
    Fp16 = 13,
    Bf16 = 14,
    Fp32 = 15,
    Fp64 = 16,
}

impl DType {
    /// All variants, in code order.
    pub const ALL: [DType; 16] = [
        DType::Int4,
        DType::Uint4,
        DType::Int8,
        DType::Uint8,
        DType::Int16,
        DType::Uint16,
        DType::Int32,
        DType::Uint32,
        DType::Int64,
        DType::Uint64,
        DType::Fp4,
        DType::Fp8,
        DType::Fp16,
        DType::Bf16,
        DType::Fp32,
        DType::Fp64,
    ];

    /// Returns the width of a single element in bits.
    pub fn bits(self) -> usize {
        match self {
            DType::Int4 | DType::Uint4 | DType::Fp4 => 4,
            DType::Int8 | DType::Uint8 | DType::Fp8 => 8,
            DType::Int16 | DType::Uint16 | DType::Fp16 | DType::Bf16 => 16,
            DType::Int32 | DType::Uint32 | DType::Fp32 => 32,
            DType::Int64 | DType::Uint64 | DType::Fp64 => 64,
        }
    }

    /// Returns the number of bytes needed to store `elements` values.
    ///
    /// Sub-byte types pack two elements per byte, rounded up. Returns
    /// `None` if the byte count does not fit in a `usize`.
    pub fn bytes_for(self, elements: usize) -> Option<usize> {
        match self.bits() {
            4 => Some(elements.div_ceil(2)),
            bits => elements.checked_mul(bits / 8),
        }
    }

    /// Returns the stable integer code of this type.
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Looks up a type by its integer code.
    pub fn from_code(code: i32) -> Option<Self> {
        Self::ALL.iter().copied().find(|d| d.code() == code)
    }

    /// Returns a human-readable label for this data type.
    pub fn as_str(self) -> &'static str {
        match self {
            DType::Int4 => "int4",
            DType::Uint4 => "uint4",
            DType::Int8 => "int8",
            DType::Uint8 => "uint8",
            DType::Int16 => "int16",
            DType::Uint16 => "uint16",
            DType::Int32 => "int32",
            DType::Uint32 => "uint32",
            DType::Int64 => "int64",
            DType::Uint64 => "uint64",
            DType::Fp4 => "fp4",
            DType::Fp8 => "fp8",
            DType::Fp16 => "fp16",
            DType::Bf16 => "bf16",
            DType::Fp32 => "fp32",
            DType::Fp64 => "fp64",
        }
    }
}

impl FromStr for DType {
    type Err = TensorMetaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|d| d.as_str() == lower)
            .ok_or(TensorMetaError::UnknownLabel {
                what: "dtype",
                label: s.to_string(),
            })
    }
}

impl std::fmt::Display for DType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
