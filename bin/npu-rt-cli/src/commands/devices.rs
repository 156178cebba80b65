// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `npu-rt devices` command: enumerate boards and print their properties.

use super::human_bytes;
use npu_runtime::Runtime;
use std::path::PathBuf;

pub async fn execute(config: Option<PathBuf>) -> anyhow::Result<()> {
    let rt = super::build_runtime(config)?;

    println!("╔══════════════════════════════════════════════════════╗");
    println!("║           npu-rt · Devices                           ║");
    println!("╚══════════════════════════════════════════════════════╝");
    println!();
    println!(
        "  Runtime {}  SoC {}  {} device(s)",
        Runtime::full_version(),
        Runtime::soc_name(),
        rt.devices().count()
    );
    println!();

    for id in rt.devices().list() {
        let props = match rt.devices().properties(id) {
            Ok(p) => p,
            Err(e) => {
                println!("  Device {id}: unavailable ({e})");
                continue;
            }
        };
        let reachable = rt.devices().activate(id).is_ok();

        println!("  Device {id}{}", if reachable { "" } else { "  [OFFLINE]" });
        println!("   UID:          {:#018x}", props.uid);
        println!(
            "   PCI:          {:04x}:{:02x}:{:02x}.0",
            props.pci_domain, props.pci_bus, props.pci_device
        );
        println!("   Firmware:     {}", props.firmware_version);
        println!(
            "   CMM:          {} free of {}",
            human_bytes(props.free_cmm_memory),
            human_bytes(props.total_cmm_memory)
        );
        println!(
            "   System:       {} free of {}",
            human_bytes(props.free_sys_memory),
            human_bytes(props.total_sys_memory)
        );
        println!(
            "   Load:         NPU {:.0}%  CPU {:.0}%",
            props.npu_loading, props.cpu_loading
        );
        println!("   Temperature:  {:.1} C", props.thermal.temp_celsius);
        if props.is_resource_constrained() {
            println!("   WARNING: board is resource constrained");
        }
        println!();
    }

    Ok(())
}
