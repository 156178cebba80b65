// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Device activation, enumeration and property snapshots.
//!
//! Activation is global per runtime, while the *current device* is tracked
//! per calling thread: `activate` makes the device current for the thread
//! that called it. Deactivation cascades through every registered
//! [`ResetHook`] (streams, models, contexts) before device memory is
//! reclaimed.

use crate::error::lock;
use crate::handle::next_instance_id;
use crate::RuntimeError;
use npu_memory::MemoryAllocator;
use npu_platform::{DeviceProperties, Platform, PlatformError};
use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Condvar, Mutex, Weak};
use tracing::{debug, info, warn};

thread_local! {
    static CURRENT_DEVICE: RefCell<HashMap<u64, u32>> = RefCell::new(HashMap::new());
}

/// Receives device resets so dependents can be torn down first.
pub(crate) trait ResetHook: Send + Sync {
    fn on_reset(&self, device: u32);
}

/// Counts outstanding device work so callers can wait for quiescence.
#[derive(Debug, Default)]
pub(crate) struct WorkTracker {
    pending: Mutex<HashMap<u32, usize>>,
    idle: Condvar,
}

impl WorkTracker {
    pub(crate) fn begin(&self, device: u32) {
        if let Ok(mut p) = self.pending.lock() {
            *p.entry(device).or_insert(0) += 1;
        }
    }

    pub(crate) fn end(&self, device: u32) {
        if let Ok(mut p) = self.pending.lock() {
            if let Some(n) = p.get_mut(&device) {
                *n = n.saturating_sub(1);
                if *n == 0 {
                    p.remove(&device);
                }
            }
            self.idle.notify_all();
        }
    }

    /// Blocks until no device in `devices` has outstanding work.
    pub(crate) fn wait_idle(&self, devices: &BTreeSet<u32>) -> Result<(), RuntimeError> {
        let mut p = lock(&self.pending)?;
        while devices.iter().any(|d| p.contains_key(d)) {
            p = self
                .idle
                .wait(p)
                .map_err(|_| RuntimeError::Fatal("work tracker poisoned".into()))?;
        }
        Ok(())
    }

    pub(crate) fn outstanding(&self, device: u32) -> usize {
        self.pending
            .lock()
            .map(|p| p.get(&device).copied().unwrap_or(0))
            .unwrap_or(0)
    }
}

/// Activates devices and tracks the calling thread's current device.
pub struct DeviceManager {
    instance: u64,
    platform: Arc<Platform>,
    allocator: Arc<MemoryAllocator>,
    work: Arc<WorkTracker>,
    active: Mutex<BTreeSet<u32>>,
    hooks: Mutex<Vec<Weak<dyn ResetHook>>>,
}

impl DeviceManager {
    pub(crate) fn new(
        platform: Arc<Platform>,
        allocator: Arc<MemoryAllocator>,
        work: Arc<WorkTracker>,
    ) -> Self {
        Self {
            instance: next_instance_id(),
            platform,
            allocator,
            work,
            active: Mutex::new(BTreeSet::new()),
            hooks: Mutex::new(Vec::new()),
        }
    }

    /// Registers a dependent torn down on reset. Hooks run in registration order.
    pub(crate) fn register_reset_hook(&self, hook: Weak<dyn ResetHook>) {
        if let Ok(mut hooks) = self.hooks.lock() {
            hooks.push(hook);
        }
    }

    /// Activates `device` and makes it current for this thread.
    ///
    /// Activating an already active device only updates the thread's
    /// current device.
    pub fn activate(&self, device: u32) -> Result<(), RuntimeError> {
        self.platform.probe(device).map_err(|e| match e {
            PlatformError::Unavailable { device, reason } => {
                RuntimeError::DeviceUnavailable { device, reason }
            }
            other => RuntimeError::from(other),
        })?;

        if lock(&self.active)?.insert(device) {
            let board = self.platform.board(device)?;
            info!(
                device,
                pci = %board.pci_address(),
                firmware = %board.firmware,
                "Device activated"
            );
        } else {
            debug!(device, "Device already active");
        }
        self.bind_thread(device);
        Ok(())
    }

    /// Deactivates `device`, tearing down every stream, model and context
    /// on it and reclaiming its memory.
    ///
    /// Handles derived from the device become invalid.
    pub fn deactivate(&self, device: u32) -> Result<(), RuntimeError> {
        self.platform.board(device)?;
        if !lock(&self.active)?.contains(&device) {
            return Err(RuntimeError::InvalidState(format!("device {device} is not active")));
        }

        let hooks: Vec<Arc<dyn ResetHook>> =
            lock(&self.hooks)?.iter().filter_map(Weak::upgrade).collect();
        for hook in hooks {
            hook.on_reset(device);
        }

        // Ops already running on force-destroyed streams finish on their
        // detached workers.
        let in_flight = self.work.outstanding(device);
        if in_flight > 0 {
            warn!(device, in_flight, "Resetting device with operations still in flight");
        }

        self.allocator.release_device(device)?;
        lock(&self.active)?.remove(&device);
        CURRENT_DEVICE.with(|slot| {
            let mut slot = slot.borrow_mut();
            if slot.get(&self.instance) == Some(&device) {
                slot.remove(&self.instance);
            }
        });
        info!(device, "Device deactivated");
        Ok(())
    }

    /// The device most recently made current on this thread.
    pub fn current_device(&self) -> Result<u32, RuntimeError> {
        let device = CURRENT_DEVICE
            .with(|slot| slot.borrow().get(&self.instance).copied())
            .ok_or_else(|| RuntimeError::InvalidState("no active device on this thread".into()))?;
        if !self.is_active(device) {
            return Err(RuntimeError::InvalidState(format!(
                "device {device} was deactivated"
            )));
        }
        Ok(device)
    }

    /// Number of enumerated devices.
    pub fn count(&self) -> usize {
        self.platform.count()
    }

    /// Enumerated device ids in discovery order.
    pub fn list(&self) -> Vec<u32> {
        self.platform.device_ids()
    }

    pub fn is_active(&self, device: u32) -> bool {
        self.active
            .lock()
            .map(|a| a.contains(&device))
            .unwrap_or(false)
    }

    /// Active device ids in ascending order.
    pub fn active(&self) -> Vec<u32> {
        self.active
            .lock()
            .map(|a| a.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Blocks until outstanding work on every active device completes.
    pub fn synchronize_all(&self) -> Result<(), RuntimeError> {
        let active = lock(&self.active)?.clone();
        debug!(devices = active.len(), "Synchronizing all devices");
        self.work.wait_idle(&active)
    }

    /// Takes a property snapshot of `device`.
    ///
    /// Properties are passive reads and do not require activation.
    pub fn properties(&self, device: u32) -> Result<DeviceProperties, RuntimeError> {
        let usage = self.allocator.device_usage(device)?;
        Ok(self.platform.properties(device, usage)?)
    }

    pub(crate) fn bind_thread(&self, device: u32) {
        CURRENT_DEVICE.with(|slot| {
            slot.borrow_mut().insert(self.instance, device);
        });
    }
}

impl std::fmt::Debug for DeviceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceManager")
            .field("devices", &self.list())
            .field("active", &self.active())
            .finish()
    }
}
