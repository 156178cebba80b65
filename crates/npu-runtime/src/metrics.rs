// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Per-model execution metrics.
//!
//! [`ExecutionMetrics`] accumulates device time and IO volume across every
//! blocking and stream execution of one loaded model.

use std::time::Duration;

/// What one execution did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct ExecStats {
    pub(crate) device_time: Duration,
    pub(crate) bytes_in: usize,
    pub(crate) bytes_out: usize,
}

/// Aggregate metrics for one loaded model.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct ExecutionMetrics {
    /// Completed executions, blocking and async.
    pub executions: u64,
    /// Completed executions dispatched through a stream.
    pub async_executions: u64,
    /// Executions that failed after dispatch.
    pub failures: u64,
    /// Total device time across completed executions.
    pub total_device_time: Duration,
    pub min_device_time: Option<Duration>,
    pub max_device_time: Duration,
    /// Input bytes read by the NPU.
    pub bytes_in: u64,
    /// Output bytes written by the NPU.
    pub bytes_out: u64,
}

impl ExecutionMetrics {
    pub(crate) fn record(&mut self, stats: ExecStats, is_async: bool) {
        self.executions += 1;
        if is_async {
            self.async_executions += 1;
        }
        self.total_device_time += stats.device_time;
        self.min_device_time = Some(match self.min_device_time {
            Some(min) => min.min(stats.device_time),
            None => stats.device_time,
        });
        self.max_device_time = self.max_device_time.max(stats.device_time);
        self.bytes_in += stats.bytes_in as u64;
        self.bytes_out += stats.bytes_out as u64;
    }

    pub(crate) fn record_failure(&mut self) {
        self.failures += 1;
    }

    pub fn mean_device_time(&self) -> Duration {
        if self.executions == 0 {
            return Duration::ZERO;
        }
        self.total_device_time / self.executions as u32
    }

    /// Executions per second of device time.
    pub fn throughput(&self) -> f64 {
        let secs = self.total_device_time.as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        self.executions as f64 / secs
    }

    /// Returns a human-readable summary suitable for CLI output.
    pub fn summary(&self) -> String {
        format!(
            "Execution: {} runs ({} async, {} failed), mean {:.3}ms, min {:.3}ms, max {:.3}ms, \
             {:.2} MB in, {:.2} MB out ({:.1} runs/s)",
            self.executions,
            self.async_executions,
            self.failures,
            ms(self.mean_device_time()),
            ms(self.min_device_time.unwrap_or(Duration::ZERO)),
            ms(self.max_device_time),
            self.bytes_in as f64 / (1024.0 * 1024.0),
            self.bytes_out as f64 / (1024.0 * 1024.0),
            self.throughput(),
        )
    }
}

fn ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}
