// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for board enumeration and probing.

/// Errors raised by the platform layer.
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    /// No board with this id was enumerated.
    #[error("no device with id {0}")]
    UnknownDevice(u32),

    /// The board exists but cannot be reached.
    #[error("device {device} unavailable: {reason}")]
    Unavailable { device: u32, reason: String },

    /// The board list is inconsistent.
    #[error("invalid board configuration: {0}")]
    InvalidConfig(String),
}
