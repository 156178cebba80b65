// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # npu-rt
//!
//! Command-line driver for the npu-rt accelerator runtime.
//!
//! ## Usage
//! ```bash
//! # List boards and their live properties
//! npu-rt devices
//!
//! # Print a model's IO contract and working-set estimate
//! npu-rt inspect --model ./yolo.npu
//!
//! # Execute a model once, optionally through a stream
//! npu-rt run --model ./yolo.npu --vnpu big-little --async
//!
//! # Measure execution latency
//! npu-rt bench --model ./yolo.npu --iterations 200
//!
//! # Build a model image from a JSON manifest and a weight blob
//! npu-rt pack --manifest yolo.json --weights yolo.bin --out yolo.npu
//! ```

mod commands;

use clap::{Parser, Subcommand};
use npu_runtime::VNpuKind;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "npu-rt",
    about = "Host runtime for PCIe-attached NPU accelerator boards",
    version,
    author
)]
struct Cli {
    /// Path to a TOML runtime configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging (repeat for more: -v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List boards with firmware, memory, load and temperature.
    Devices,

    /// Inspect a model image without loading it onto a device.
    Inspect {
        /// Path to the model image.
        #[arg(short, long)]
        model: PathBuf,
    },

    /// Load a model and execute it once with generated inputs.
    Run {
        #[arg(short, long)]
        model: PathBuf,

        /// Device to run on.
        #[arg(short, long, default_value_t = 0)]
        device: u32,

        /// vNPU partitioning: disable, enable, big-little, little-big.
        #[arg(long, default_value = "disable")]
        vnpu: VNpuKind,

        /// Shape group to execute.
        #[arg(short, long, default_value_t = 0)]
        group: usize,

        /// Dynamic batch override for batch-variable tensors.
        #[arg(short, long)]
        batch: Option<u32>,

        /// Submit through a stream and wait, instead of executing inline.
        #[arg(long = "async")]
        use_stream: bool,

        /// Write each output to `<dir>/<name>.bin`.
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },

    /// Execute a model repeatedly and report latency.
    Bench {
        #[arg(short, long)]
        model: PathBuf,

        #[arg(short, long, default_value_t = 0)]
        device: u32,

        #[arg(long, default_value = "disable")]
        vnpu: VNpuKind,

        /// Timed iterations.
        #[arg(short, long, default_value_t = 100)]
        iterations: usize,

        /// Untimed iterations before measuring.
        #[arg(long, default_value_t = 5)]
        warmup: usize,

        /// Streams to spread asynchronous executions over. 0 runs inline.
        #[arg(long, default_value_t = 0)]
        streams: usize,
    },

    /// Build a model image from a JSON manifest and an optional weight blob.
    Pack {
        #[arg(short, long)]
        manifest: PathBuf,

        #[arg(short, long)]
        weights: Option<PathBuf>,

        #[arg(short, long)]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    commands::init_tracing(cli.verbose);

    match cli.command {
        Commands::Devices => commands::devices::execute(cli.config).await,
        Commands::Inspect { model } => commands::inspect::execute(model).await,
        Commands::Run {
            model,
            device,
            vnpu,
            group,
            batch,
            use_stream,
            output_dir,
        } => {
            let opts = commands::run::RunOptions {
                device,
                vnpu,
                group,
                batch,
                use_stream,
                output_dir,
            };
            commands::run::execute(cli.config, model, opts).await
        }
        Commands::Bench {
            model,
            device,
            vnpu,
            iterations,
            warmup,
            streams,
        } => {
            let opts = commands::bench::BenchOptions {
                device,
                vnpu,
                iterations,
                warmup,
                streams,
            };
            commands::bench::execute(cli.config, model, opts).await
        }
        Commands::Pack {
            manifest,
            weights,
            out,
        } => commands::pack::execute(manifest, weights, out).await,
    }
}
