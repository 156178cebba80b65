// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `npu-rt bench` command: repeated execution with latency statistics.
//!
//! Inline mode times every `execute` call. Stream mode round-robins
//! `execute_async` over N streams and times the whole batch, which shows
//! how much the per-stream workers overlap.

use super::prepare;
use npu_runtime::{StreamHandle, VNpuKind};
use std::path::PathBuf;
use std::time::{Duration, Instant};

pub struct BenchOptions {
    pub device: u32,
    pub vnpu: VNpuKind,
    pub iterations: usize,
    pub warmup: usize,
    pub streams: usize,
}

pub async fn execute(config: Option<PathBuf>, model: PathBuf, opts: BenchOptions) -> anyhow::Result<()> {
    println!("╔══════════════════════════════════════════════════════╗");
    println!("║           npu-rt · Benchmark                         ║");
    println!("╚══════════════════════════════════════════════════════╝");
    println!();

    if opts.iterations == 0 {
        anyhow::bail!("--iterations must be at least 1");
    }

    let rt = super::build_runtime(config)?;
    let p = prepare(&rt, &model, opts.device, opts.vnpu, 0, None)?;
    let engine = rt.engine();
    println!("  {}", engine.model_info(p.model)?.summary());
    println!(
        "  Iterations: {} (+{} warmup), mode: {}",
        opts.iterations,
        opts.warmup,
        if opts.streams == 0 { "inline".to_string() } else { format!("{} stream(s)", opts.streams) }
    );
    println!();

    for _ in 0..opts.warmup {
        engine.execute(p.model, p.ctx, 0, p.set)?;
    }

    if opts.streams == 0 {
        let mut samples = Vec::with_capacity(opts.iterations);
        for _ in 0..opts.iterations {
            let start = Instant::now();
            engine.execute(p.model, p.ctx, 0, p.set)?;
            samples.push(start.elapsed());
        }
        samples.sort();
        println!("  Latency");
        println!("   p50:  {:>9.3} ms", ms(percentile(&samples, 50)));
        println!("   p90:  {:>9.3} ms", ms(percentile(&samples, 90)));
        println!("   p99:  {:>9.3} ms", ms(percentile(&samples, 99)));
        println!("   max:  {:>9.3} ms", ms(samples[samples.len() - 1]));
    } else {
        let ctx = rt.contexts().get_current()?;
        let streams: Vec<StreamHandle> = (0..opts.streams)
            .map(|_| rt.streams().create(ctx))
            .collect::<Result<_, _>>()?;

        let start = Instant::now();
        for i in 0..opts.iterations {
            engine.execute_async(p.model, p.ctx, 0, p.set, streams[i % streams.len()])?;
        }
        for stream in &streams {
            rt.streams().wait(*stream)?;
        }
        let wall = start.elapsed();
        for stream in streams {
            rt.streams().destroy(stream)?;
        }

        println!("  Wall time:  {:.3} ms", ms(wall));
        println!("  Throughput: {:.1} runs/s", opts.iterations as f64 / wall.as_secs_f64().max(f64::EPSILON));
    }

    let metrics = engine.metrics(p.model)?;
    let props = rt.devices().properties(opts.device)?;
    println!();
    println!("  {}", metrics.summary());
    println!("  {}", props.summary());
    println!();
    println!("  Raw metrics:");
    println!("{}", serde_json::to_string_pretty(&metrics)?);

    engine.unload(p.model)?;
    engine.finalize()?;
    Ok(())
}

fn percentile(sorted: &[Duration], pct: usize) -> Duration {
    let idx = (sorted.len() * pct / 100).min(sorted.len() - 1);
    sorted[idx]
}

fn ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1e3
}
