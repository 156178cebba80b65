// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Runtime configuration loaded from TOML files or constructed programmatically.
//!
//! # TOML Format
//! ```toml
//! host_memory = "1G"
//! auto_activate = true
//! busy_on_pending_destroy = false
//! simulate_latency = true
//! load_window_ms = 1000
//!
//! [[devices]]
//! id = 0
//! cmm_memory = "2G"
//! huge_memory = "512M"
//!
//! [[devices]]
//! id = 1
//! pci_bus = 2
//! ```

use crate::RuntimeError;
use npu_memory::MemoryBudget;
use npu_platform::BoardConfig;
use std::path::Path;
use std::time::Duration;

/// Configuration for the runtime.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RuntimeConfig {
    /// Pinned host memory available to `alloc_host`.
    #[serde(default = "default_host_memory")]
    pub host_memory: MemoryBudget,
    /// Whether context creation activates an inactive device.
    #[serde(default = "default_true")]
    pub auto_activate: bool,
    /// Whether a graceful stream destroy with pending work fails with
    /// `Busy` instead of blocking until the stream drains.
    #[serde(default)]
    pub busy_on_pending_destroy: bool,
    /// Whether execution sleeps for the model's declared latency.
    #[serde(default = "default_true")]
    pub simulate_latency: bool,
    /// NPU/CPU load sampling window in milliseconds.
    #[serde(default = "default_load_window_ms")]
    pub load_window_ms: u64,
    /// Boards in discovery order.
    #[serde(default = "default_devices")]
    pub devices: Vec<BoardConfig>,
}

fn default_true() -> bool {
    true
}

fn default_host_memory() -> MemoryBudget {
    MemoryBudget::from_gb(1)
}

fn default_load_window_ms() -> u64 {
    1000
}

fn default_devices() -> Vec<BoardConfig> {
    vec![BoardConfig::default()]
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            host_memory: default_host_memory(),
            auto_activate: true,
            busy_on_pending_destroy: false,
            simulate_latency: true,
            load_window_ms: default_load_window_ms(),
            devices: default_devices(),
        }
    }
}

impl RuntimeConfig {
    /// Default configuration with `n` boards numbered `0..n` on consecutive buses.
    pub fn with_devices(n: u32) -> Self {
        let devices = (0..n)
            .map(|id| BoardConfig {
                pci_bus: id + 1,
                uid: BoardConfig::default().uid + u64::from(id),
                ..BoardConfig::with_id(id)
            })
            .collect();
        Self {
            devices,
            ..Self::default()
        }
    }

    /// Loads configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, RuntimeError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            RuntimeError::Config(format!("cannot read config '{}': {e}", path.display()))
        })?;
        Self::from_toml(&content)
    }

    /// Parses configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, RuntimeError> {
        let config: Self = toml::from_str(toml_str)
            .map_err(|e| RuntimeError::Config(format!("TOML parse error: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialises configuration to TOML.
    pub fn to_toml(&self) -> Result<String, RuntimeError> {
        toml::to_string_pretty(self)
            .map_err(|e| RuntimeError::Config(format!("TOML serialise error: {e}")))
    }

    /// Checks settings that cannot be expressed through types.
    pub fn validate(&self) -> Result<(), RuntimeError> {
        if self.devices.is_empty() {
            return Err(RuntimeError::Config("at least one device must be configured".into()));
        }
        if self.load_window_ms == 0 {
            return Err(RuntimeError::Config("load_window_ms must be non-zero".into()));
        }
        Ok(())
    }

    pub fn load_window(&self) -> Duration {
        Duration::from_millis(self.load_window_ms)
    }
}
