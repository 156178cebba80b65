// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Loaded model state.

use crate::metrics::ExecutionMetrics;
use model_image::{IoContract, ModelKind, Usage};
use npu_memory::DeviceBuffer;
use std::sync::Arc;
use std::time::Duration;

/// Furthest lifecycle point a model has reached.
///
/// The state only moves forward. Unloading removes the model entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModelState {
    Loaded,
    IoIntrospected,
    IoBound,
    Executable,
    Executed,
}

impl ModelState {
    pub fn as_str(self) -> &'static str {
        match self {
            ModelState::Loaded => "loaded",
            ModelState::IoIntrospected => "io-introspected",
            ModelState::IoBound => "io-bound",
            ModelState::Executable => "executable",
            ModelState::Executed => "executed",
        }
    }
}

impl std::fmt::Display for ModelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of a loaded model, for display.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ModelSummary {
    pub name: String,
    pub kind: ModelKind,
    pub compiler_version: String,
    pub device: u32,
    pub usage: Usage,
    pub affinity: u32,
    pub state: ModelState,
    pub num_inputs: usize,
    pub num_outputs: usize,
    pub num_groups: usize,
}

impl ModelSummary {
    pub fn summary(&self) -> String {
        format!(
            "Model '{}' ({}, compiler {}) on device {}: {} inputs, {} outputs, {} shape groups, \
             affinity {:#b}, sys {} B, cmm {} B, {}",
            self.name,
            self.kind,
            if self.compiler_version.is_empty() { "unknown" } else { &self.compiler_version },
            self.device,
            self.num_inputs,
            self.num_outputs,
            self.num_groups,
            self.affinity,
            self.usage.sys_size,
            self.usage.cmm_size,
            self.state,
        )
    }
}

pub(crate) struct LoadedModel {
    pub(crate) name: String,
    pub(crate) kind: ModelKind,
    pub(crate) compiler_version: String,
    pub(crate) contract: Arc<IoContract>,
    pub(crate) device: u32,
    pub(crate) usage: Usage,
    /// Weight blob resident on the device. `None` for weightless models.
    pub(crate) weights: Option<DeviceBuffer>,
    pub(crate) affinity: u32,
    pub(crate) latency: Duration,
    pub(crate) state: ModelState,
    pub(crate) metrics: ExecutionMetrics,
}

impl LoadedModel {
    pub(crate) fn advance(&mut self, to: ModelState) {
        self.state = self.state.max(to);
    }

    pub(crate) fn summary(&self) -> ModelSummary {
        ModelSummary {
            name: self.name.clone(),
            kind: self.kind,
            compiler_version: self.compiler_version.clone(),
            device: self.device,
            usage: self.usage,
            affinity: self.affinity,
            state: self.state,
            num_inputs: self.contract.num_inputs(),
            num_outputs: self.contract.num_outputs(),
            num_groups: self.contract.num_groups(),
        }
    }
}

impl std::fmt::Debug for LoadedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedModel")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("device", &self.device)
            .field("weights", &self.weights.as_ref().map(|w| w.size_bytes()))
            .field("state", &self.state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_order() {
        assert!(ModelState::Loaded < ModelState::IoIntrospected);
        assert!(ModelState::Executable < ModelState::Executed);
        assert_eq!(ModelState::IoBound.max(ModelState::Loaded), ModelState::IoBound);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ModelState::IoIntrospected.to_string(), "io-introspected");
        let json = serde_json::to_string(&ModelState::Executed).unwrap();
        assert_eq!(json, "\"executed\"");
    }

    #[test]
    fn test_summary_line() {
        let s = ModelSummary {
            name: "yolo".into(),
            kind: ModelKind::ThreeCore,
            compiler_version: String::new(),
            device: 0,
            usage: Usage { sys_size: 10, cmm_size: 20 },
            affinity: 1,
            state: ModelState::Loaded,
            num_inputs: 1,
            num_outputs: 3,
            num_groups: 1,
        };
        let line = s.summary();
        assert!(line.contains("Model 'yolo'"));
        assert!(line.contains("compiler unknown"));
        assert!(line.contains("3 outputs"));
        assert!(line.ends_with("loaded"));
    }
}
