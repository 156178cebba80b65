// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The model engine: vNPU init, model lifecycle, IO binding and execution.
//!
//! # Handle lifetimes
//! ```text
//!  ModelId ─┬─▶ IoInfoHandle ──▶ IoSetHandle
//!           └─▶ ModelContextHandle
//! ```
//! Every derived handle is tagged with its model. Unloading a model removes
//! all of them, so later use returns `InvalidHandle`.
//!
//! # Execution order of checks
//! model → execution context → IO set → shape group and batch → bindings.
//! Nothing is dispatched and no output is written until all of them pass.

mod backend;
mod exec;
mod io;
mod model;
mod vnpu;

pub use backend::{ComputeBackend, ComputeRequest, EchoBackend};
pub use io::{Binding, TensorInfo};
pub use model::{ModelState, ModelSummary};
pub use vnpu::VNpuKind;

use crate::context::ContextManager;
use crate::device::{ResetHook, WorkTracker};
use crate::error::lock;
use crate::handle::{HandleTable, IoInfoHandle, IoSetHandle, ModelContextHandle, ModelId, StreamHandle};
use crate::metrics::{ExecStats, ExecutionMetrics};
use crate::stream::{StreamManager, StreamOp};
use crate::{ErrorKind, RuntimeError};
use exec::{Dispatch, Executor};
use io::{IoInfoEntry, IoSetEntry};
use model::LoadedModel;
use model_image::{Direction, ImageLoader, IoContract, ModelImage, ModelKind, Usage};
use npu_memory::{AllocPolicy, MemPtr, MemoryAllocator};
use npu_platform::Platform;
use std::path::Path;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tracing::{debug, error, info, warn};

struct ExecContextEntry {
    model: ModelId,
}

#[derive(Default)]
struct EngineTables {
    models: HandleTable<ModelId, LoadedModel>,
    io_infos: HandleTable<IoInfoHandle, IoInfoEntry>,
    io_sets: HandleTable<IoSetHandle, IoSetEntry>,
    contexts: HandleTable<ModelContextHandle, ExecContextEntry>,
}

impl EngineTables {
    /// Removes `model` and every handle derived from it.
    fn remove_model(&mut self, model: ModelId) -> Result<(LoadedModel, usize), RuntimeError> {
        let loaded = self.models.remove(model)?;
        let derived = self.io_infos.remove_where(|e| e.model == model).len()
            + self.io_sets.remove_where(|e| e.model == model).len()
            + self.contexts.remove_where(|e| e.model == model).len();
        Ok((loaded, derived))
    }
}

/// State shared with stream jobs and the reset cascade.
struct EngineState {
    vnpu: Mutex<Option<VNpuKind>>,
    tables: Mutex<EngineTables>,
    platform: Arc<Platform>,
}

impl EngineState {
    fn unload(&self, model: ModelId) -> Result<(String, usize), RuntimeError> {
        let (loaded, derived) = lock(&self.tables)?.remove_model(model)?;
        self.platform.release_sys(loaded.device, loaded.usage.sys_size);
        Ok((loaded.name, derived))
    }

    /// Invalidates `model` after a fatal error.
    fn poison(&self, model: ModelId, cause: &RuntimeError) {
        match self.unload(model) {
            Ok((name, derived)) => {
                error!(%model, %name, derived, error = %cause, "Model invalidated by fatal error");
            }
            Err(e) => debug!(%model, error = %e, "Model already gone when poisoning"),
        }
    }

    /// Books the outcome of a dispatch against its model.
    fn complete(&self, model: ModelId, result: Result<ExecStats, RuntimeError>, is_async: bool) -> Result<(), RuntimeError> {
        match result {
            Ok(stats) => {
                if let Ok(mut tables) = self.tables.lock() {
                    if let Ok(m) = tables.models.get_mut(model) {
                        m.metrics.record(stats, is_async);
                        m.advance(ModelState::Executed);
                    }
                }
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::Internal => {
                self.poison(model, &e);
                Err(e)
            }
            Err(e) => {
                if let Ok(mut tables) = self.tables.lock() {
                    if let Ok(m) = tables.models.get_mut(model) {
                        m.metrics.record_failure();
                    }
                }
                Err(e)
            }
        }
    }
}

impl ResetHook for EngineState {
    fn on_reset(&self, device: u32) {
        let doomed: Vec<ModelId> = match self.tables.lock() {
            Ok(tables) => tables
                .models
                .iter()
                .filter(|(_, m)| m.device == device)
                .map(|(id, _)| id)
                .collect(),
            Err(_) => {
                warn!(device, "Engine tables poisoned during device reset");
                return;
            }
        };
        for model in doomed {
            if let Ok((name, derived)) = self.unload(model) {
                warn!(%model, %name, device, derived, "Model unloaded by device reset");
            }
        }
    }
}

/// Loads and runs models.
pub struct EngineRuntime {
    state: Arc<EngineState>,
    contexts: Arc<ContextManager>,
    streams: Arc<StreamManager>,
    work: Arc<WorkTracker>,
    executor: Executor,
    simulate_latency: bool,
}

impl EngineRuntime {
    pub(crate) fn new(
        contexts: Arc<ContextManager>,
        streams: Arc<StreamManager>,
        allocator: Arc<MemoryAllocator>,
        platform: Arc<Platform>,
        work: Arc<WorkTracker>,
        backend: Arc<dyn ComputeBackend>,
        simulate_latency: bool,
    ) -> Self {
        Self {
            state: Arc::new(EngineState {
                vnpu: Mutex::new(None),
                tables: Mutex::new(EngineTables::default()),
                platform: Arc::clone(&platform),
            }),
            contexts,
            streams,
            work,
            executor: Executor {
                allocator,
                platform,
                backend,
            },
            simulate_latency,
        }
    }

    pub(crate) fn reset_hook(&self) -> Weak<dyn ResetHook> {
        let weak: Weak<EngineState> = Arc::downgrade(&self.state);
        weak
    }

    // ── Engine lifecycle ───────────────────────────────────────

    /// Initializes the engine with a vNPU partitioning.
    ///
    /// Re-initializing with the same kind is a no-op; a different kind
    /// fails with `InvalidState` until [`finalize`](Self::finalize).
    pub fn init(&self, kind: VNpuKind) -> Result<(), RuntimeError> {
        let mut vnpu = lock(&self.state.vnpu)?;
        match *vnpu {
            Some(current) if current == kind => {
                debug!(%kind, "Engine already initialized");
                Ok(())
            }
            Some(current) => Err(RuntimeError::InvalidState(format!(
                "engine already initialized with vNPU kind {current}, requested {kind}"
            ))),
            None => {
                *vnpu = Some(kind);
                info!(%kind, partitions = ?kind.partitions(), backend = self.executor.backend.name(), "Engine initialized");
                Ok(())
            }
        }
    }

    /// Unloads every model and returns the engine to the uninitialized state.
    pub fn finalize(&self) -> Result<(), RuntimeError> {
        let mut vnpu = lock(&self.state.vnpu)?;
        if vnpu.is_none() {
            return Err(RuntimeError::InvalidState("engine is not initialized".into()));
        }
        let models: Vec<ModelId> = lock(&self.state.tables)?.models.iter().map(|(id, _)| id).collect();
        if !models.is_empty() {
            warn!(models = models.len(), "Finalizing engine with models still loaded");
        }
        for model in models {
            self.state.unload(model)?;
        }
        *vnpu = None;
        info!("Engine finalized");
        Ok(())
    }

    /// The vNPU kind chosen at init.
    pub fn vnpu_kind(&self) -> Result<VNpuKind, RuntimeError> {
        self.require_init()
    }

    pub fn backend_name(&self) -> &str {
        self.executor.backend.name()
    }

    // ── Model lifecycle ────────────────────────────────────────

    /// Loads a model image from disk onto the current context's device.
    pub fn load_from_file(&self, path: &Path) -> Result<ModelId, RuntimeError> {
        let vnpu = self.require_init()?;
        let image = ImageLoader::load(path)?;
        self.insert_model(vnpu, image)
    }

    /// Loads a model image from a byte buffer.
    pub fn load_from_memory(&self, bytes: &[u8]) -> Result<ModelId, RuntimeError> {
        if bytes.is_empty() {
            return Err(RuntimeError::InvalidArgument("model buffer is empty".into()));
        }
        let vnpu = self.require_init()?;
        let image = ModelImage::parse(bytes)?;
        self.insert_model(vnpu, image)
    }

    /// Loads a model image staged in pinned host memory.
    pub fn load_from_host(&self, ptr: MemPtr, size: usize) -> Result<ModelId, RuntimeError> {
        if ptr.is_null() {
            return Err(RuntimeError::InvalidArgument("model buffer pointer is null".into()));
        }
        if size == 0 {
            return Err(RuntimeError::InvalidArgument("model buffer is empty".into()));
        }
        let bytes = self.executor.allocator.read_bytes(ptr, size)?;
        self.load_from_memory(&bytes)
    }

    /// Unloads `model`, invalidating every handle derived from it.
    pub fn unload(&self, model: ModelId) -> Result<(), RuntimeError> {
        let (name, derived) = self.state.unload(model)?;
        info!(%model, %name, derived, "Model unloaded");
        Ok(())
    }

    /// Loaded models in load order.
    pub fn models(&self) -> Vec<ModelId> {
        let mut ids: Vec<ModelId> = self
            .state
            .tables
            .lock()
            .map(|t| t.models.iter().map(|(id, _)| id).collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    pub fn model_info(&self, model: ModelId) -> Result<ModelSummary, RuntimeError> {
        self.with_model(model, |m| Ok(m.summary()))
    }

    pub fn model_state(&self, model: ModelId) -> Result<ModelState, RuntimeError> {
        self.with_model(model, |m| Ok(m.state))
    }

    pub fn model_kind(&self, model: ModelId) -> Result<ModelKind, RuntimeError> {
        self.with_model(model, |m| Ok(m.kind))
    }

    pub fn compiler_version(&self, model: ModelId) -> Result<String, RuntimeError> {
        self.with_model(model, |m| Ok(m.compiler_version.clone()))
    }

    pub fn usage(&self, model: ModelId) -> Result<Usage, RuntimeError> {
        self.with_model(model, |m| Ok(m.usage))
    }

    pub fn metrics(&self, model: ModelId) -> Result<ExecutionMetrics, RuntimeError> {
        self.with_model(model, |m| Ok(m.metrics.clone()))
    }

    /// Device memory holding the weights, if the model has any.
    pub fn weights_region(&self, model: ModelId) -> Result<Option<(MemPtr, usize)>, RuntimeError> {
        self.with_model(model, |m| Ok(m.weights.as_ref().map(|w| (w.ptr(), w.size_bytes()))))
    }

    /// Model kind from the image header, without loading.
    pub fn kind_from_file(&self, path: &Path) -> Result<ModelKind, RuntimeError> {
        Ok(ImageLoader::kind(path)?)
    }

    pub fn kind_from_memory(&self, bytes: &[u8]) -> Result<ModelKind, RuntimeError> {
        Ok(ModelImage::kind_of(bytes)?)
    }

    /// Working-set estimate from the image header, without loading.
    pub fn usage_from_file(&self, path: &Path) -> Result<Usage, RuntimeError> {
        Ok(ImageLoader::usage(path)?)
    }

    pub fn usage_from_memory(&self, bytes: &[u8]) -> Result<Usage, RuntimeError> {
        Ok(ModelImage::usage_of(bytes)?)
    }

    /// Restricts `model` to the partitions selected by `mask`.
    pub fn set_affinity(&self, model: ModelId, mask: u32) -> Result<(), RuntimeError> {
        let vnpu = self.require_init()?;
        let mut tables = lock(&self.state.tables)?;
        let m = tables.models.get_mut(model)?;
        vnpu.check_affinity(mask, m.kind)?;
        m.affinity = mask;
        debug!(%model, mask, "Affinity set");
        Ok(())
    }

    pub fn affinity(&self, model: ModelId) -> Result<u32, RuntimeError> {
        self.with_model(model, |m| Ok(m.affinity))
    }

    // ── IO introspection ───────────────────────────────────────

    pub fn get_io_info(&self, model: ModelId) -> Result<IoInfoHandle, RuntimeError> {
        let mut tables = lock(&self.state.tables)?;
        let m = tables.models.get_mut(model)?;
        m.advance(ModelState::IoIntrospected);
        let contract = Arc::clone(&m.contract);
        Ok(tables.io_infos.insert(IoInfoEntry { model, contract }))
    }

    pub fn destroy_io_info(&self, info: IoInfoHandle) -> Result<(), RuntimeError> {
        lock(&self.state.tables)?.io_infos.remove(info)?;
        Ok(())
    }

    pub fn num_inputs(&self, info: IoInfoHandle) -> Result<usize, RuntimeError> {
        self.with_contract(info, |c| Ok(c.num_inputs()))
    }

    pub fn num_outputs(&self, info: IoInfoHandle) -> Result<usize, RuntimeError> {
        self.with_contract(info, |c| Ok(c.num_outputs()))
    }

    pub fn num_groups(&self, info: IoInfoHandle) -> Result<usize, RuntimeError> {
        self.with_contract(info, |c| Ok(c.num_groups()))
    }

    /// Describes tensor `index` of `dir` in shape group `group`.
    pub fn tensor(
        &self,
        info: IoInfoHandle,
        dir: Direction,
        index: usize,
        group: usize,
    ) -> Result<TensorInfo, RuntimeError> {
        self.with_contract(info, |c| {
            let desc = c.tensor(dir, index).ok_or_else(|| out_of_range(c, dir, index))?;
            TensorInfo::from_desc(desc, dir, group)
        })
    }

    pub fn input(&self, info: IoInfoHandle, index: usize, group: usize) -> Result<TensorInfo, RuntimeError> {
        self.tensor(info, Direction::Input, index, group)
    }

    pub fn output(&self, info: IoInfoHandle, index: usize, group: usize) -> Result<TensorInfo, RuntimeError> {
        self.tensor(info, Direction::Output, index, group)
    }

    /// Every tensor of `dir` in shape group `group`, in declaration order.
    pub fn tensors(&self, info: IoInfoHandle, dir: Direction, group: usize) -> Result<Vec<TensorInfo>, RuntimeError> {
        self.with_contract(info, |c| {
            c.tensors(dir)
                .iter()
                .map(|d| TensorInfo::from_desc(d, dir, group))
                .collect()
        })
    }

    pub fn tensor_by_name(
        &self,
        info: IoInfoHandle,
        dir: Direction,
        name: &str,
        group: usize,
    ) -> Result<TensorInfo, RuntimeError> {
        let index = self.index_of(info, dir, name)?;
        self.tensor(info, dir, index, group)
    }

    pub fn index_of(&self, info: IoInfoHandle, dir: Direction, name: &str) -> Result<usize, RuntimeError> {
        self.with_contract(info, |c| c.index_of(dir, name).ok_or_else(|| unknown_name(dir, name)))
    }

    pub fn tensor_name(&self, info: IoInfoHandle, dir: Direction, index: usize) -> Result<String, RuntimeError> {
        self.with_contract(info, |c| {
            c.tensor(dir, index)
                .map(|d| d.name.clone())
                .ok_or_else(|| out_of_range(c, dir, index))
        })
    }

    // ── IO binding ─────────────────────────────────────────────

    /// Creates an empty binding set for the model behind `info`.
    pub fn create_io(&self, info: IoInfoHandle) -> Result<IoSetHandle, RuntimeError> {
        let mut tables = lock(&self.state.tables)?;
        let entry = tables.io_infos.get(info)?;
        let model = entry.model;
        let contract = Arc::clone(&entry.contract);
        tables.models.get_mut(model)?.advance(ModelState::IoBound);
        Ok(tables.io_sets.insert(IoSetEntry::new(model, contract)))
    }

    pub fn destroy_io(&self, set: IoSetHandle) -> Result<(), RuntimeError> {
        lock(&self.state.tables)?.io_sets.remove(set)?;
        Ok(())
    }

    /// Binds `size` bytes at `ptr` to tensor `index` of `dir`.
    ///
    /// Sizes are checked at execute time, so a set can be bound before
    /// the dynamic batch is chosen.
    pub fn bind(
        &self,
        set: IoSetHandle,
        dir: Direction,
        index: usize,
        ptr: MemPtr,
        size: usize,
    ) -> Result<(), RuntimeError> {
        lock(&self.state.tables)?
            .io_sets
            .get_mut(set)?
            .bind(dir, index, Binding { ptr, size })?;
        debug!(%set, %dir, index, %ptr, size, "Bound buffer");
        Ok(())
    }

    pub fn bind_by_name(
        &self,
        set: IoSetHandle,
        dir: Direction,
        name: &str,
        ptr: MemPtr,
        size: usize,
    ) -> Result<(), RuntimeError> {
        let mut tables = lock(&self.state.tables)?;
        let entry = tables.io_sets.get_mut(set)?;
        let index = entry
            .contract
            .index_of(dir, name)
            .ok_or_else(|| unknown_name(dir, name))?;
        entry.bind(dir, index, Binding { ptr, size })?;
        debug!(%set, %dir, name, index, %ptr, size, "Bound buffer");
        Ok(())
    }

    pub fn bind_input(&self, set: IoSetHandle, index: usize, ptr: MemPtr, size: usize) -> Result<(), RuntimeError> {
        self.bind(set, Direction::Input, index, ptr, size)
    }

    pub fn bind_output(&self, set: IoSetHandle, index: usize, ptr: MemPtr, size: usize) -> Result<(), RuntimeError> {
        self.bind(set, Direction::Output, index, ptr, size)
    }

    pub fn bind_input_by_name(&self, set: IoSetHandle, name: &str, ptr: MemPtr, size: usize) -> Result<(), RuntimeError> {
        self.bind_by_name(set, Direction::Input, name, ptr, size)
    }

    pub fn bind_output_by_name(&self, set: IoSetHandle, name: &str, ptr: MemPtr, size: usize) -> Result<(), RuntimeError> {
        self.bind_by_name(set, Direction::Output, name, ptr, size)
    }

    /// The buffer bound to tensor `index` of `dir`, if any.
    pub fn buffer(&self, set: IoSetHandle, dir: Direction, index: usize) -> Result<Option<Binding>, RuntimeError> {
        lock(&self.state.tables)?.io_sets.get(set)?.get(dir, index)
    }

    pub fn buffer_by_name(&self, set: IoSetHandle, dir: Direction, name: &str) -> Result<Option<Binding>, RuntimeError> {
        let tables = lock(&self.state.tables)?;
        let entry = tables.io_sets.get(set)?;
        let index = entry
            .contract
            .index_of(dir, name)
            .ok_or_else(|| unknown_name(dir, name))?;
        entry.get(dir, index)
    }

    /// Overrides the batch dimension of batch-variable tensors.
    ///
    /// The range is checked per shape group at execute time.
    pub fn set_dynamic_batch(&self, set: IoSetHandle, batch: u32) -> Result<(), RuntimeError> {
        if batch == 0 {
            return Err(RuntimeError::InvalidArgument("dynamic batch must be at least 1".into()));
        }
        lock(&self.state.tables)?.io_sets.get_mut(set)?.batch = Some(batch);
        debug!(%set, batch, "Dynamic batch set");
        Ok(())
    }

    pub fn dynamic_batch(&self, set: IoSetHandle) -> Result<Option<u32>, RuntimeError> {
        Ok(lock(&self.state.tables)?.io_sets.get(set)?.batch)
    }

    // ── Execution ──────────────────────────────────────────────

    pub fn create_context(&self, model: ModelId) -> Result<ModelContextHandle, RuntimeError> {
        let mut tables = lock(&self.state.tables)?;
        tables.models.get_mut(model)?.advance(ModelState::Executable);
        Ok(tables.contexts.insert(ExecContextEntry { model }))
    }

    pub fn destroy_context(&self, ctx: ModelContextHandle) -> Result<(), RuntimeError> {
        lock(&self.state.tables)?.contexts.remove(ctx)?;
        Ok(())
    }

    /// Runs `model` on shape group `group` and blocks until its outputs
    /// are written.
    pub fn execute(
        &self,
        model: ModelId,
        ctx: ModelContextHandle,
        group: usize,
        set: IoSetHandle,
    ) -> Result<(), RuntimeError> {
        let dispatch = self.prepare(model, ctx, group, set)?;
        self.work.begin(dispatch.device);
        let result = dispatch.run(&self.executor);
        self.work.end(dispatch.device);
        self.state.complete(model, result, false)
    }

    /// Queues an execution on `stream` and returns immediately.
    ///
    /// Bindings are validated now. Buffers must stay allocated until
    /// `wait` on the stream returns; failures during the run are reported
    /// by that `wait`.
    pub fn execute_async(
        &self,
        model: ModelId,
        ctx: ModelContextHandle,
        group: usize,
        set: IoSetHandle,
        stream: StreamHandle,
    ) -> Result<(), RuntimeError> {
        let dispatch = self.prepare(model, ctx, group, set)?;
        let stream_device = self.streams.device_of(stream)?;
        if stream_device != dispatch.device {
            return Err(RuntimeError::InvalidArgument(format!(
                "{stream} is on device {stream_device} but {model} is loaded on device {}",
                dispatch.device
            )));
        }

        let label = format!("execute {} ({model})", dispatch.name);
        let regions = dispatch.regions();
        let state = Arc::clone(&self.state);
        let executor = self.executor.clone();
        self.streams.submit(
            stream,
            StreamOp {
                label,
                regions,
                job: Box::new(move || {
                    let result = dispatch.run(&executor);
                    state.complete(model, result, true)
                }),
            },
        )
    }

    // ── Private helpers ────────────────────────────────────────

    fn require_init(&self) -> Result<VNpuKind, RuntimeError> {
        lock(&self.state.vnpu)?.ok_or_else(|| RuntimeError::InvalidState("engine is not initialized".into()))
    }

    fn insert_model(&self, vnpu: VNpuKind, image: ModelImage) -> Result<ModelId, RuntimeError> {
        let device = self.contexts.current_device()?;
        vnpu.check_fits(image.kind())?;

        let weights = if image.weights().is_empty() {
            None
        } else {
            let buffer = self.executor.allocator.alloc_device_buffer(
                device,
                image.weights().len(),
                AllocPolicy::HugeFirst,
            )?;
            buffer.upload(0, image.weights())?;
            Some(buffer)
        };
        let usage = image.usage();
        self.executor.platform.reserve_sys(device, usage.sys_size);

        let model = LoadedModel {
            name: image.name().to_string(),
            kind: image.kind(),
            compiler_version: image.compiler_version().to_string(),
            contract: Arc::clone(image.contract()),
            device,
            usage,
            weights,
            affinity: vnpu.eligible_mask(image.kind()),
            latency: if self.simulate_latency {
                Duration::from_micros(image.manifest().latency_us)
            } else {
                Duration::ZERO
            },
            state: ModelState::Loaded,
            metrics: ExecutionMetrics::default(),
        };
        let id = lock(&self.state.tables)?.models.insert(model);
        info!(
            model = %id,
            name = image.name(),
            kind = %image.kind(),
            device,
            inputs = image.contract().num_inputs(),
            outputs = image.contract().num_outputs(),
            weights = image.weights().len(),
            "Model loaded"
        );
        Ok(id)
    }

    fn prepare(
        &self,
        model: ModelId,
        ctx: ModelContextHandle,
        group: usize,
        set: IoSetHandle,
    ) -> Result<Dispatch, RuntimeError> {
        self.require_init()?;
        let tables = lock(&self.state.tables)?;
        let m = tables.models.get(model)?;
        if tables.contexts.get(ctx)?.model != model {
            return Err(RuntimeError::handle(ctx));
        }
        let io = tables.io_sets.get(set)?;
        if io.model != model {
            return Err(RuntimeError::handle(set));
        }
        let (inputs, outputs) = io.resolve(group, m.device, &self.executor.allocator)?;
        Ok(Dispatch {
            model,
            name: m.name.clone(),
            device: m.device,
            group,
            contract: Arc::clone(&m.contract),
            inputs,
            outputs,
            latency: m.latency,
        })
    }

    fn with_model<R>(&self, model: ModelId, f: impl FnOnce(&LoadedModel) -> Result<R, RuntimeError>) -> Result<R, RuntimeError> {
        f(lock(&self.state.tables)?.models.get(model)?)
    }

    fn with_contract<R>(
        &self,
        info: IoInfoHandle,
        f: impl FnOnce(&IoContract) -> Result<R, RuntimeError>,
    ) -> Result<R, RuntimeError> {
        f(&lock(&self.state.tables)?.io_infos.get(info)?.contract)
    }
}

impl std::fmt::Debug for EngineRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineRuntime")
            .field("vnpu", &self.state.vnpu.lock().ok().and_then(|v| *v))
            .field("models", &self.models().len())
            .field("backend", &self.backend_name())
            .finish()
    }
}

fn out_of_range(contract: &IoContract, dir: Direction, index: usize) -> RuntimeError {
    RuntimeError::InvalidArgument(format!(
        "{dir} index {index} out of range (model has {})",
        contract.tensors(dir).len()
    ))
}

fn unknown_name(dir: Direction, name: &str) -> RuntimeError {
    RuntimeError::InvalidArgument(format!("model has no {dir} named '{name}'"))
}
