// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Tensor memory layouts.

use crate::TensorMetaError;
use std::str::FromStr;

/// Memory layout of an image-like tensor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(i32)]
pub enum Layout {
    /// No particular layout (vectors, sequences, ...).
    #[default]
    None = 0,
    /// Channel-last.
    Nhwc = 1,
    /// Channel-first.
    Nchw = 2,
}

impl Layout {
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Layout::None => "none",
            Layout::Nhwc => "nhwc",
            Layout::Nchw => "nchw",
        }
    }
}

impl FromStr for Layout {
    type Err = TensorMetaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" | "" => Ok(Layout::None),
            "nhwc" => Ok(Layout::Nhwc),
            "nchw" => Ok(Layout::Nchw),
            _ => Err(TensorMetaError::UnknownLabel {
                what: "layout",
                label: s.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for Layout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        assert_eq!("NHWC".parse::<Layout>().unwrap(), Layout::Nhwc);
        assert_eq!("nchw".parse::<Layout>().unwrap(), Layout::Nchw);
        assert_eq!("".parse::<Layout>().unwrap(), Layout::None);
        assert!("hwc".parse::<Layout>().is_err());
    }

    #[test]
    fn test_codes() {
        assert_eq!(Layout::None.code(), 0);
        assert_eq!(Layout::Nhwc.code(), 1);
        assert_eq!(Layout::Nchw.code(), 2);
    }
}
