// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `npu-rt run` command: load a model, execute it once and report outputs.

use super::{download, human_bytes, prepare};
use anyhow::Context;
use npu_runtime::VNpuKind;
use std::path::PathBuf;
use std::time::Instant;

pub struct RunOptions {
    pub device: u32,
    pub vnpu: VNpuKind,
    pub group: usize,
    pub batch: Option<u32>,
    pub use_stream: bool,
    pub output_dir: Option<PathBuf>,
}

pub async fn execute(config: Option<PathBuf>, model: PathBuf, opts: RunOptions) -> anyhow::Result<()> {
    println!("╔══════════════════════════════════════════════════════╗");
    println!("║           npu-rt · Run                               ║");
    println!("╚══════════════════════════════════════════════════════╝");
    println!();

    let rt = super::build_runtime(config)?;
    let p = prepare(&rt, &model, opts.device, opts.vnpu, opts.group, opts.batch)?;
    let engine = rt.engine();

    println!("  {}", engine.model_info(p.model)?.summary());
    println!("  vNPU:      {}  affinity {:#b}", opts.vnpu, engine.affinity(p.model)?);
    for (t, _) in &p.inputs {
        println!("  Input  #{} {:<16} {:?} {} {}", t.index, t.name, t.dims, t.dtype, human_bytes(t.size as u64));
    }
    println!();

    let start = Instant::now();
    if opts.use_stream {
        let ctx = rt.contexts().get_current()?;
        let stream = rt.streams().create(ctx)?;
        engine.execute_async(p.model, p.ctx, opts.group, p.set, stream)?;
        rt.streams().wait(stream)?;
        rt.streams().destroy(stream)?;
    } else {
        engine.execute(p.model, p.ctx, opts.group, p.set)?;
    }
    let elapsed = start.elapsed();

    println!("  Outputs");
    for (t, ptr) in &p.outputs {
        let data = download(&rt, *ptr, t.size)?;
        let checksum = data.iter().fold(0u32, |acc, b| acc.wrapping_mul(31).wrapping_add(u32::from(*b)));
        println!(
            "   #{} {:<16} {:?} {}  checksum {:08x}  head {:02x?}",
            t.index,
            t.name,
            t.dims,
            human_bytes(t.size as u64),
            checksum,
            &data[..data.len().min(8)],
        );
        if let Some(dir) = &opts.output_dir {
            std::fs::create_dir_all(dir)?;
            let path = dir.join(format!("{}.bin", t.name));
            std::fs::write(&path, &data).with_context(|| format!("writing '{}'", path.display()))?;
        }
    }
    println!();
    println!("  Wall time: {:.2} ms ({})", elapsed.as_secs_f64() * 1e3, if opts.use_stream { "stream" } else { "inline" });
    println!("  {}", engine.metrics(p.model)?.summary());
    println!();

    engine.unload(p.model)?;
    engine.finalize()?;
    Ok(())
}
