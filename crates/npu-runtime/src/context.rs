// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Logical execution contexts and the per-thread current context.
//!
//! A context belongs to exactly one device. Each thread has at most one
//! current context, stored in a thread-local slot keyed by manager instance
//! so that two runtimes in one process never observe each other's state.
//!
//! Context-implicit operations resolve their device through
//! [`ContextManager::current_device`]. Callers that prefer explicit passing
//! use the `_in` variants on the memory and engine APIs, or hold a
//! [`ContextScope`] for the duration of a block.

use crate::device::{DeviceManager, ResetHook};
use crate::error::lock;
use crate::handle::{next_instance_id, ContextHandle, HandleTable};
use crate::RuntimeError;
use std::cell::RefCell;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

thread_local! {
    static CURRENT_CONTEXT: RefCell<HashMap<u64, ContextHandle>> = RefCell::new(HashMap::new());
}

#[derive(Debug)]
struct ContextEntry {
    device: u32,
    is_default: bool,
    streams: usize,
}

#[derive(Default)]
struct ContextTables {
    contexts: HandleTable<ContextHandle, ContextEntry>,
    defaults: HashMap<u32, ContextHandle>,
}

/// Creates and tracks contexts.
pub struct ContextManager {
    instance: u64,
    devices: Arc<DeviceManager>,
    auto_activate: bool,
    tables: Mutex<ContextTables>,
}

impl ContextManager {
    pub(crate) fn new(devices: Arc<DeviceManager>, auto_activate: bool) -> Self {
        Self {
            instance: next_instance_id(),
            devices,
            auto_activate,
            tables: Mutex::new(ContextTables::default()),
        }
    }

    /// Creates a context on `device` and makes it current for this thread.
    ///
    /// An inactive device is activated first when auto-activation is
    /// enabled, otherwise the call fails with `InvalidState`.
    pub fn create(&self, device: u32) -> Result<ContextHandle, RuntimeError> {
        self.ensure_active(device)?;
        let ctx = lock(&self.tables)?.contexts.insert(ContextEntry {
            device,
            is_default: false,
            streams: 0,
        });
        self.make_current(ctx, device);
        info!(%ctx, device, "Context created");
        Ok(ctx)
    }

    /// Destroys a caller-created context.
    ///
    /// Fails with `InvalidState` for a default context and `Busy` while
    /// streams created on the context are alive. If the context is current
    /// on this thread the slot is cleared; other threads holding it observe
    /// `InvalidHandle` on their next `get_current`.
    pub fn destroy(&self, ctx: ContextHandle) -> Result<(), RuntimeError> {
        let mut tables = lock(&self.tables)?;
        let entry = tables.contexts.get(ctx)?;
        if entry.is_default {
            return Err(RuntimeError::InvalidState(format!(
                "{ctx} is the runtime-owned default context of device {}",
                entry.device
            )));
        }
        if entry.streams > 0 {
            return Err(RuntimeError::Busy(format!(
                "{ctx} still has {} live stream(s)",
                entry.streams
            )));
        }
        let entry = tables.contexts.remove(ctx)?;
        drop(tables);

        CURRENT_CONTEXT.with(|slot| {
            let mut slot = slot.borrow_mut();
            if slot.get(&self.instance) == Some(&ctx) {
                slot.remove(&self.instance);
            }
        });
        info!(%ctx, device = entry.device, "Context destroyed");
        Ok(())
    }

    /// Makes `ctx` current for this thread.
    pub fn set_current(&self, ctx: ContextHandle) -> Result<(), RuntimeError> {
        let device = self.device_of(ctx)?;
        self.make_current(ctx, device);
        debug!(%ctx, device, "Current context set");
        Ok(())
    }

    /// The context current on this thread.
    ///
    /// Fails with `InvalidState` when none was set, and with
    /// `InvalidHandle` when the current context has since been destroyed
    /// (the dangling slot is cleared).
    pub fn get_current(&self) -> Result<ContextHandle, RuntimeError> {
        let ctx = CURRENT_CONTEXT
            .with(|slot| slot.borrow().get(&self.instance).copied())
            .ok_or_else(|| RuntimeError::InvalidState("no current context on this thread".into()))?;
        if !lock(&self.tables)?.contexts.contains(ctx) {
            CURRENT_CONTEXT.with(|slot| {
                slot.borrow_mut().remove(&self.instance);
            });
            return Err(RuntimeError::handle(ctx));
        }
        Ok(ctx)
    }

    /// Returns the default context of `device`, creating it on first use.
    ///
    /// The default context is owned by the runtime. It is not made current.
    pub fn get_or_create_default(&self, device: u32) -> Result<ContextHandle, RuntimeError> {
        if let Some(ctx) = lock(&self.tables)?.defaults.get(&device) {
            return Ok(*ctx);
        }
        self.ensure_active(device)?;

        let mut tables = lock(&self.tables)?;
        // Another thread may have won the race while the device activated.
        if let Some(ctx) = tables.defaults.get(&device) {
            return Ok(*ctx);
        }
        let ctx = tables.contexts.insert(ContextEntry {
            device,
            is_default: true,
            streams: 0,
        });
        tables.defaults.insert(device, ctx);
        info!(%ctx, device, "Default context created");
        Ok(ctx)
    }

    /// Device that `ctx` is bound to.
    pub fn device_of(&self, ctx: ContextHandle) -> Result<u32, RuntimeError> {
        Ok(lock(&self.tables)?.contexts.get(ctx)?.device)
    }

    /// Device of this thread's current context, or of the current device
    /// when no context was set.
    pub fn current_device(&self) -> Result<u32, RuntimeError> {
        match self.get_current() {
            Ok(ctx) => self.device_of(ctx),
            Err(RuntimeError::InvalidState(_)) => self.devices.current_device(),
            Err(e) => Err(e),
        }
    }

    /// Makes `ctx` current until the returned guard is dropped, then
    /// restores the previous current context.
    pub fn scope(&self, ctx: ContextHandle) -> Result<ContextScope<'_>, RuntimeError> {
        let device = self.device_of(ctx)?;
        let previous = CURRENT_CONTEXT.with(|slot| slot.borrow().get(&self.instance).copied());
        self.make_current(ctx, device);
        Ok(ContextScope {
            manager: self,
            previous,
            _thread: PhantomData,
        })
    }

    /// Number of live contexts, default contexts included.
    pub fn count(&self) -> usize {
        self.tables.lock().map(|t| t.contexts.len()).unwrap_or(0)
    }

    pub(crate) fn retain_stream(&self, ctx: ContextHandle) -> Result<u32, RuntimeError> {
        let mut tables = lock(&self.tables)?;
        let entry = tables.contexts.get_mut(ctx)?;
        entry.streams += 1;
        Ok(entry.device)
    }

    pub(crate) fn release_stream(&self, ctx: ContextHandle) {
        if let Ok(mut tables) = self.tables.lock() {
            if let Ok(entry) = tables.contexts.get_mut(ctx) {
                entry.streams = entry.streams.saturating_sub(1);
            }
        }
    }

    // ── Private helpers ────────────────────────────────────────

    fn ensure_active(&self, device: u32) -> Result<(), RuntimeError> {
        if self.devices.is_active(device) {
            return Ok(());
        }
        if !self.auto_activate {
            return Err(RuntimeError::InvalidState(format!("device {device} is not active")));
        }
        self.devices.activate(device)
    }

    fn make_current(&self, ctx: ContextHandle, device: u32) {
        CURRENT_CONTEXT.with(|slot| {
            slot.borrow_mut().insert(self.instance, ctx);
        });
        self.devices.bind_thread(device);
    }
}

impl ResetHook for ContextManager {
    fn on_reset(&self, device: u32) {
        match self.tables.lock() {
            Ok(mut tables) => {
                let removed = tables.contexts.remove_where(|e| e.device == device);
                tables.defaults.remove(&device);
                if !removed.is_empty() {
                    warn!(device, contexts = removed.len(), "Contexts invalidated by device reset");
                }
            }
            Err(_) => warn!(device, "Context table poisoned during device reset"),
        }
    }
}

impl std::fmt::Debug for ContextManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextManager")
            .field("contexts", &self.count())
            .field("auto_activate", &self.auto_activate)
            .finish()
    }
}

/// Thread-confined guard returned by [`ContextManager::scope`].
pub struct ContextScope<'a> {
    manager: &'a ContextManager,
    previous: Option<ContextHandle>,
    // Restoring touches this thread's slot, so the guard must stay here.
    _thread: PhantomData<*const ()>,
}

impl Drop for ContextScope<'_> {
    fn drop(&mut self) {
        let instance = self.manager.instance;
        CURRENT_CONTEXT.with(|slot| {
            let mut slot = slot.borrow_mut();
            match self.previous {
                Some(prev) => {
                    slot.insert(instance, prev);
                }
                None => {
                    slot.remove(&instance);
                }
            }
        });
        if let Some(prev) = self.previous {
            if let Ok(device) = self.manager.device_of(prev) {
                self.manager.devices.bind_thread(device);
            }
        }
    }
}
