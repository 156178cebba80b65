// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Board thermal model.
//!
//! Simulated boards have no sensor, so the temperature is derived from the
//! board's idle temperature plus a linear rise with NPU utilisation. The
//! SoC begins throttling at 95 °C.

/// Throttling threshold (degrees Celsius).
const THROTTLE_THRESHOLD_C: f32 = 95.0;

/// Temperature rise per percent of NPU utilisation.
const RISE_PER_LOAD_PCT: f32 = 0.35;

/// Thermal state of a board.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct ThermalInfo {
    pub temp_celsius: f32,
}

impl ThermalInfo {
    /// Temperature of a board idling at `ambient` under `npu_load_pct` load.
    pub fn model(ambient: f32, npu_load_pct: f32) -> Self {
        Self {
            temp_celsius: ambient + RISE_PER_LOAD_PCT * npu_load_pct.clamp(0.0, 100.0),
        }
    }

    pub fn is_overheating(&self) -> bool {
        self.temp_celsius >= THROTTLE_THRESHOLD_C
    }

    /// Degrees left before throttling. Negative when already throttling.
    pub fn headroom_celsius(&self) -> f32 {
        THROTTLE_THRESHOLD_C - self.temp_celsius
    }

    /// Temperature in millidegrees, as reported by board firmware.
    pub fn millidegrees(&self) -> i32 {
        (self.temp_celsius * 1000.0).round() as i32
    }
}
