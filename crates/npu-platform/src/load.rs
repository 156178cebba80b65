// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Sliding-window utilisation tracking.
//!
//! Every completed unit of device work is recorded as a busy interval.
//! Utilisation is the busy time overlapping the last `window`, as a
//! percentage of the window, clamped to 100.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Busy-interval tracker for one engine (NPU or device CPU).
#[derive(Debug)]
pub struct LoadTracker {
    window: Duration,
    intervals: Mutex<VecDeque<(Instant, Instant)>>,
}

impl LoadTracker {
    pub fn new(window: Duration) -> Self {
        Self {
            window: window.max(Duration::from_millis(1)),
            intervals: Mutex::new(VecDeque::new()),
        }
    }

    /// Records work that started at `start` and ran for `busy`.
    pub fn record(&self, start: Instant, busy: Duration) {
        if let Ok(mut q) = self.intervals.lock() {
            q.push_back((start, start + busy));
            let horizon = start.checked_sub(self.window);
            if let Some(horizon) = horizon {
                while q.front().is_some_and(|(_, end)| *end < horizon) {
                    q.pop_front();
                }
            }
        }
    }

    /// Utilisation over the window ending at `now`, in percent.
    pub fn utilisation_at(&self, now: Instant) -> f32 {
        let from = now.checked_sub(self.window).unwrap_or(now);
        let busy: Duration = self
            .intervals
            .lock()
            .map(|q| {
                q.iter()
                    .map(|(s, e)| {
                        let s = (*s).max(from);
                        let e = (*e).min(now);
                        e.saturating_duration_since(s)
                    })
                    .sum()
            })
            .unwrap_or_default();
        let pct = busy.as_secs_f32() / self.window.as_secs_f32() * 100.0;
        pct.min(100.0)
    }

    pub fn utilisation(&self) -> f32 {
        self.utilisation_at(Instant::now())
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}
