// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The runtime facade wiring every manager to one platform and allocator.

use crate::context::ContextManager;
use crate::device::{DeviceManager, ResetHook, WorkTracker};
use crate::engine::{ComputeBackend, EchoBackend, EngineRuntime};
use crate::memory::MemoryManager;
use crate::stream::StreamManager;
use crate::{RuntimeConfig, RuntimeError};
use npu_memory::{DevicePools, MemoryAllocator};
use npu_platform::Platform;
use std::path::Path;
use std::sync::{Arc, Weak};
use tracing::info;

const VERSION: (u32, u32, u32) = (1, 0, 0);
const SOC_NAME: &str = "AX650N";

/// One runtime instance: the boards, their memory and every manager on top.
///
/// Instances are independent. Handles and thread-local current state from
/// one instance mean nothing to another.
///
/// # Example
/// ```
/// use npu_runtime::{Runtime, RuntimeConfig};
///
/// let rt = Runtime::new(RuntimeConfig::default()).unwrap();
/// let ctx = rt.contexts().create(0).unwrap();
/// assert_eq!(rt.contexts().get_current().unwrap(), ctx);
/// ```
pub struct Runtime {
    config: RuntimeConfig,
    devices: Arc<DeviceManager>,
    contexts: Arc<ContextManager>,
    streams: Arc<StreamManager>,
    memory: MemoryManager,
    engine: EngineRuntime,
}

impl Runtime {
    /// Builds a runtime with the default compute backend.
    pub fn new(config: RuntimeConfig) -> Result<Self, RuntimeError> {
        Self::with_backend(config, Arc::new(EchoBackend))
    }

    /// Loads the configuration from a TOML file and builds a runtime.
    pub fn from_config_file(path: &Path) -> Result<Self, RuntimeError> {
        Self::new(RuntimeConfig::from_file(path)?)
    }

    /// Builds a runtime that computes outputs with `backend`.
    pub fn with_backend(config: RuntimeConfig, backend: Arc<dyn ComputeBackend>) -> Result<Self, RuntimeError> {
        config.validate()?;

        let platform = Arc::new(Platform::new(config.devices.clone(), config.load_window())?);
        let pools: Vec<DevicePools> = config
            .devices
            .iter()
            .map(|b| DevicePools {
                device: b.id,
                cmm: b.cmm_memory,
                huge: b.huge_memory,
            })
            .collect();
        let allocator = Arc::new(MemoryAllocator::new(config.host_memory, &pools)?);
        let work = Arc::new(WorkTracker::default());

        let devices = Arc::new(DeviceManager::new(
            Arc::clone(&platform),
            Arc::clone(&allocator),
            Arc::clone(&work),
        ));
        let contexts = Arc::new(ContextManager::new(Arc::clone(&devices), config.auto_activate));
        let streams = Arc::new(StreamManager::new(
            Arc::clone(&contexts),
            Arc::clone(&work),
            config.busy_on_pending_destroy,
        ));
        let memory = MemoryManager::new(Arc::clone(&contexts), Arc::clone(&allocator), Arc::clone(&platform));
        let engine = EngineRuntime::new(
            Arc::clone(&contexts),
            Arc::clone(&streams),
            allocator,
            platform,
            work,
            backend,
            config.simulate_latency,
        );

        // Streams drain before models go, models before their contexts.
        let stream_hook: Weak<StreamManager> = Arc::downgrade(&streams);
        let context_hook: Weak<ContextManager> = Arc::downgrade(&contexts);
        devices.register_reset_hook(stream_hook as Weak<dyn ResetHook>);
        devices.register_reset_hook(engine.reset_hook());
        devices.register_reset_hook(context_hook as Weak<dyn ResetHook>);

        info!(
            devices = config.devices.len(),
            host_memory = %config.host_memory,
            backend = engine.backend_name(),
            "Runtime created"
        );
        Ok(Self {
            config,
            devices,
            contexts,
            streams,
            memory,
            engine,
        })
    }

    pub fn devices(&self) -> &DeviceManager {
        &self.devices
    }

    pub fn contexts(&self) -> &ContextManager {
        &self.contexts
    }

    pub fn streams(&self) -> &StreamManager {
        &self.streams
    }

    pub fn memory(&self) -> &MemoryManager {
        &self.memory
    }

    pub fn engine(&self) -> &EngineRuntime {
        &self.engine
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Resets `device`: destroys its streams, models and contexts, frees
    /// its memory and deactivates it.
    pub fn reset_device(&self, device: u32) -> Result<(), RuntimeError> {
        self.devices.deactivate(device)
    }

    /// Runtime version as `(major, minor, patch)`.
    pub fn version() -> (u32, u32, u32) {
        VERSION
    }

    pub fn full_version() -> String {
        let (major, minor, patch) = VERSION;
        format!("{major}.{minor}.{patch}")
    }

    /// Name of the SoC the simulated boards model.
    pub fn soc_name() -> &'static str {
        SOC_NAME
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("devices", &self.devices)
            .field("contexts", &self.contexts.count())
            .field("streams", &self.streams.count())
            .field("engine", &self.engine)
            .finish()
    }
}
