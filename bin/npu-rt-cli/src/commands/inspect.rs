// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `npu-rt inspect` command: print a model's IO contract and working set.
//!
//! Works on the image alone; no board is touched.

use super::human_bytes;
use model_image::{Direction, ImageLoader};
use std::path::PathBuf;

pub async fn execute(model: PathBuf) -> anyhow::Result<()> {
    println!("╔══════════════════════════════════════════════════════╗");
    println!("║           npu-rt · Model Inspector                   ║");
    println!("╚══════════════════════════════════════════════════════╝");
    println!();

    let image = ImageLoader::load(&model)?;
    let contract = image.contract();
    let usage = image.usage();

    println!("  File:         {}", model.display());
    println!("  Name:         {}", image.name());
    println!("  Kind:         {} ({} core(s))", image.kind(), image.kind().cores());
    println!(
        "  Compiler:     {}",
        if image.compiler_version().is_empty() { "unknown" } else { image.compiler_version() }
    );
    println!("  Latency:      {} us", image.manifest().latency_us);
    println!("  Weights:      {}", human_bytes(image.weights().len() as u64));
    println!("  Shape groups: {}", contract.num_groups());
    println!();

    for dir in [Direction::Input, Direction::Output] {
        println!("  {}s", capitalise(dir.as_str()));
        println!(
            "   {:<4} {:<20} {:<8} {:<6} {:<24} {:>10}",
            "#", "Name", "DType", "Layout", "Dims (per group)", "Max size"
        );
        println!("   {}", "-".repeat(76));
        for desc in contract.tensors(dir) {
            let dims = desc
                .shapes
                .iter()
                .map(|s| s.to_string())
                .collect::<Vec<_>>()
                .join(" | ");
            println!(
                "   {:<4} {:<20} {:<8} {:<6} {:<24} {:>10}{}",
                desc.index,
                desc.name,
                desc.dtype.to_string(),
                desc.layout.to_string(),
                dims,
                human_bytes(desc.max_size_bytes()? as u64),
                if desc.batch_variable { "  (dynamic batch)" } else { "" },
            );
        }
        println!();
    }

    println!("  Working set");
    println!("   System memory: {}", human_bytes(usage.sys_size));
    println!("   CMM memory:    {}", human_bytes(usage.cmm_size));
    println!();

    Ok(())
}

fn capitalise(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
