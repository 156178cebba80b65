// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! A validated, self-contained execution ready to run inline or on a stream.

use super::backend::{ComputeBackend, ComputeRequest};
use super::io::ResolvedSlot;
use crate::handle::ModelId;
use crate::metrics::ExecStats;
use crate::RuntimeError;
use model_image::{Direction, IoContract};
use npu_memory::{MemPtr, MemoryAllocator};
use npu_platform::Platform;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

pub(crate) struct Dispatch {
    pub(crate) model: ModelId,
    pub(crate) name: String,
    pub(crate) device: u32,
    pub(crate) group: usize,
    pub(crate) contract: Arc<IoContract>,
    pub(crate) inputs: Vec<ResolvedSlot>,
    pub(crate) outputs: Vec<ResolvedSlot>,
    pub(crate) latency: Duration,
}

/// Shared collaborators a dispatch runs against.
#[derive(Clone)]
pub(crate) struct Executor {
    pub(crate) allocator: Arc<MemoryAllocator>,
    pub(crate) platform: Arc<Platform>,
    pub(crate) backend: Arc<dyn ComputeBackend>,
}

impl Dispatch {
    /// Device addresses this dispatch reads or writes.
    pub(crate) fn regions(&self) -> Vec<MemPtr> {
        self.inputs
            .iter()
            .chain(&self.outputs)
            .map(|s| s.ptr)
            .collect()
    }

    /// Reads inputs, computes, then writes outputs.
    ///
    /// No output is written unless every buffer is still live and the
    /// backend returned well-formed results.
    pub(crate) fn run(&self, exec: &Executor) -> Result<ExecStats, RuntimeError> {
        let start = Instant::now();
        self.check_live(Direction::Input, &self.inputs, &exec.allocator)?;
        self.check_live(Direction::Output, &self.outputs, &exec.allocator)?;

        let inputs = self
            .inputs
            .iter()
            .map(|s| exec.allocator.dma_read(s.ptr, s.len))
            .collect::<Result<Vec<_>, _>>()?;
        let sizes: Vec<usize> = self.outputs.iter().map(|s| s.len).collect();

        let outputs = exec.backend.compute(&ComputeRequest {
            model: &self.name,
            group: self.group,
            inputs: &inputs,
            output_sizes: &sizes,
        })?;
        if outputs.len() != sizes.len() || outputs.iter().zip(&sizes).any(|(o, s)| o.len() != *s) {
            return Err(RuntimeError::Fatal(format!(
                "backend '{}' returned {} output(s) with sizes {:?}, expected {:?}",
                exec.backend.name(),
                outputs.len(),
                outputs.iter().map(Vec::len).collect::<Vec<_>>(),
                sizes
            )));
        }

        let remaining = self.latency.saturating_sub(start.elapsed());
        if !remaining.is_zero() {
            std::thread::sleep(remaining);
        }

        for (slot, data) in self.outputs.iter().zip(&outputs) {
            exec.allocator.dma_write(slot.ptr, data)?;
        }

        let device_time = start.elapsed();
        exec.platform.record_npu_busy(self.device, start, device_time);
        debug!(
            model = %self.model,
            name = %self.name,
            group = self.group,
            device_time_us = device_time.as_micros() as u64,
            "Executed"
        );
        Ok(ExecStats {
            device_time,
            bytes_in: self.inputs.iter().map(|s| s.len).sum(),
            bytes_out: sizes.iter().sum(),
        })
    }

    fn check_live(
        &self,
        dir: Direction,
        slots: &[ResolvedSlot],
        allocator: &MemoryAllocator,
    ) -> Result<(), RuntimeError> {
        for (desc, slot) in self.contract.tensors(dir).iter().zip(slots) {
            allocator
                .block(slot.ptr, slot.len)
                .map_err(|e| RuntimeError::IoBindingIncomplete {
                    direction: dir.as_str(),
                    tensor: desc.name.clone(),
                    index: desc.index,
                    detail: format!("buffer {} released before dispatch: {e}", slot.ptr),
                })?;
        }
        Ok(())
    }
}
