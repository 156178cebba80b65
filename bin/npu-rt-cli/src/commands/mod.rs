// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Subcommand implementations and the helpers they share.

pub mod bench;
pub mod devices;
pub mod inspect;
pub mod pack;
pub mod run;

use anyhow::Context;
use npu_runtime::{
    AllocPolicy, CopyKind, IoSetHandle, MemPtr, ModelContextHandle, ModelId, Runtime, RuntimeConfig,
    TensorInfo, VNpuKind,
};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Installs the fmt subscriber. `RUST_LOG` wins over `-v`.
pub fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

pub fn build_runtime(config: Option<PathBuf>) -> anyhow::Result<Runtime> {
    let config = match config {
        Some(path) => RuntimeConfig::from_file(&path)
            .with_context(|| format!("loading config '{}'", path.display()))?,
        None => RuntimeConfig::default(),
    };
    Ok(Runtime::new(config)?)
}

/// A model loaded with every tensor bound to a fresh device buffer.
pub struct Prepared {
    pub model: ModelId,
    pub ctx: ModelContextHandle,
    pub set: IoSetHandle,
    pub inputs: Vec<(TensorInfo, MemPtr)>,
    pub outputs: Vec<(TensorInfo, MemPtr)>,
}

/// Creates a context on `device`, loads the model and binds generated inputs.
pub fn prepare(
    rt: &Runtime,
    path: &Path,
    device: u32,
    vnpu: VNpuKind,
    group: usize,
    batch: Option<u32>,
) -> anyhow::Result<Prepared> {
    rt.contexts().create(device)?;
    let engine = rt.engine();
    engine.init(vnpu)?;
    let model = engine
        .load_from_file(path)
        .with_context(|| format!("loading model '{}'", path.display()))?;

    let info = engine.get_io_info(model)?;
    let set = engine.create_io(info)?;
    if let Some(n) = batch {
        engine.set_dynamic_batch(set, n)?;
    }

    let mut inputs = Vec::new();
    for tensor in engine.tensors(info, npu_runtime::Direction::Input, group)? {
        let ptr = upload(rt, &pattern(tensor.index, tensor.size))?;
        engine.bind_input(set, tensor.index, ptr, tensor.size)?;
        inputs.push((tensor, ptr));
    }
    let mut outputs = Vec::new();
    for tensor in engine.tensors(info, npu_runtime::Direction::Output, group)? {
        let ptr = rt.memory().alloc_device(tensor.size, AllocPolicy::HugeFirst)?;
        engine.bind_output(set, tensor.index, ptr, tensor.size)?;
        outputs.push((tensor, ptr));
    }
    engine.destroy_io_info(info)?;

    let ctx = engine.create_context(model)?;
    Ok(Prepared {
        model,
        ctx,
        set,
        inputs,
        outputs,
    })
}

/// Copies `len` device bytes back to the host.
pub fn download(rt: &Runtime, ptr: MemPtr, len: usize) -> anyhow::Result<Vec<u8>> {
    let mem = rt.memory();
    let host = mem.alloc_host(len)?;
    mem.copy(host, ptr, len, CopyKind::DeviceToHost)?;
    let data = mem.read_mapped(host, len)?;
    mem.free_host(host)?;
    Ok(data)
}

fn upload(rt: &Runtime, data: &[u8]) -> anyhow::Result<MemPtr> {
    let mem = rt.memory();
    let host = mem.alloc_host(data.len())?;
    mem.write_mapped(host, data)?;
    let dev = mem.alloc_device(data.len(), AllocPolicy::HugeFirst)?;
    mem.copy(dev, host, data.len(), CopyKind::HostToDevice)?;
    mem.free_host(host)?;
    Ok(dev)
}

/// Deterministic filler so repeated runs produce identical outputs.
fn pattern(seed: usize, len: usize) -> Vec<u8> {
    (0..len).map(|i| (i.wrapping_mul(31) + seed * 17) as u8).collect()
}

/// Formats a byte count as KiB/MiB.
pub fn human_bytes(bytes: u64) -> String {
    if bytes >= 1024 * 1024 {
        format!("{:.1} MiB", bytes as f64 / (1024.0 * 1024.0))
    } else if bytes >= 1024 {
        format!("{:.1} KiB", bytes as f64 / 1024.0)
    } else {
        format!("{bytes} B")
    }
}
