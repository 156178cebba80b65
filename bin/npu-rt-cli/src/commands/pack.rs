// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `npu-rt pack` command: assemble a model image from its parts.

use super::human_bytes;
use anyhow::Context;
use model_image::{ImageBuilder, ModelImage, ModelManifest};
use std::path::PathBuf;

pub async fn execute(manifest: PathBuf, weights: Option<PathBuf>, out: PathBuf) -> anyhow::Result<()> {
    let json = std::fs::read_to_string(&manifest)
        .with_context(|| format!("reading manifest '{}'", manifest.display()))?;
    let parsed = ModelManifest::from_json(&json)?;

    let mut builder = ImageBuilder::from_manifest(parsed);
    if let Some(path) = &weights {
        let blob = std::fs::read(path).with_context(|| format!("reading weights '{}'", path.display()))?;
        builder = builder.weights(blob);
    }
    let written = builder.write_to(&out)?;

    // Read back the header so a broken image never leaves this command.
    let bytes = std::fs::read(&out)?;
    let usage = ModelImage::usage_of(&bytes)?;
    let kind = ModelImage::kind_of(&bytes)?;

    println!(
        "  Wrote {} ({}, {} model, working set sys {} / cmm {})",
        out.display(),
        human_bytes(written as u64),
        kind,
        human_bytes(usage.sys_size),
        human_bytes(usage.cmm_size),
    );
    Ok(())
}
