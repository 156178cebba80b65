// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # npu-runtime
//!
//! Host-side runtime for PCIe-attached NPU accelerator boards.
//!
//! A [`Runtime`] owns a set of simulated boards and exposes five managers:
//! - [`DeviceManager`]: enumeration, activation, property snapshots,
//!   `synchronize_all` and reset.
//! - [`ContextManager`]: per-device contexts and the thread-local current
//!   context; one default context per device.
//! - [`StreamManager`]: in-order work queues, each drained by its own
//!   worker thread, with blocking, timed and forced teardown.
//! - [`MemoryManager`]: device and pinned host memory, copies, `set`,
//!   `compare`, cache maintenance.
//! - [`EngineRuntime`]: vNPU init, model loading, IO introspection and
//!   binding, blocking and stream-ordered execution.
//!
//! # Handles
//! Every object is named by a typed handle ([`ContextHandle`], [`StreamHandle`],
//! [`ModelId`], ...). Handles are never reused within a runtime, so a handle
//! to a destroyed object always fails with [`ErrorKind::InvalidHandle`].
//!
//! # Teardown Cascade
//! ```text
//! deactivate(device)
//!   ├─▶ streams on device      force-destroyed, pending work abandoned
//!   ├─▶ models on device       unloaded with IO info/sets/exec contexts
//!   ├─▶ contexts on device     destroyed, default context included
//!   └─▶ device memory          released
//! ```
//!
//! # Example
//! ```
//! use npu_runtime::{AllocPolicy, CopyKind, Runtime, RuntimeConfig};
//!
//! let rt = Runtime::new(RuntimeConfig::default()).unwrap();
//! rt.contexts().create(0).unwrap();
//!
//! let host = rt.memory().alloc_host(4).unwrap();
//! let dev = rt.memory().alloc_device(4, AllocPolicy::NormalOnly).unwrap();
//! rt.memory().write_mapped(host, &[1, 2, 3, 4]).unwrap();
//! rt.memory().copy(dev, host, 4, CopyKind::HostToDevice).unwrap();
//! assert!(rt.memory().compare(dev, host, 4).unwrap());
//! ```

mod config;
mod context;
mod device;
mod engine;
mod error;
mod handle;
mod memory;
mod metrics;
mod runtime;
mod stream;

pub use config::RuntimeConfig;
pub use context::{ContextManager, ContextScope};
pub use device::DeviceManager;
pub use engine::{
    Binding, ComputeBackend, ComputeRequest, EchoBackend, EngineRuntime, ModelState, ModelSummary,
    TensorInfo, VNpuKind,
};
pub use error::{ErrorKind, RuntimeError};
pub use handle::{
    ContextHandle, Handle, IoInfoHandle, IoSetHandle, ModelContextHandle, ModelId, StreamHandle,
};
pub use memory::MemoryManager;
pub use metrics::ExecutionMetrics;
pub use runtime::Runtime;
pub use stream::{ForcedTeardown, StreamManager};

pub use model_image::{Direction, ModelKind, Usage};
pub use npu_memory::{AllocPolicy, BlockInfo, CopyKind, MemPtr, MemoryBudget, PoolUsage};
pub use npu_platform::{BoardConfig, DeviceProperties};
pub use tensor_meta::{DType, Layout};
