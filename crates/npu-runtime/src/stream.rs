// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Ordered asynchronous work queues.
//!
//! Each stream owns one worker thread that drains its queue strictly in
//! submission order, which gives FIFO ordering within a stream and no
//! ordering between streams. `wait` returns once everything submitted
//! before the call has completed; the first failure recorded since the last
//! wait is returned to the waiter.
//!
//! ```text
//!  submit ─▶ [op3][op2][op1] ─▶ worker ─▶ completed += 1 ─▶ notify waiters
//! ```

use crate::context::ContextManager;
use crate::device::{ResetHook, WorkTracker};
use crate::error::lock;
use crate::handle::{ContextHandle, HandleTable, StreamHandle};
use crate::RuntimeError;
use npu_memory::MemPtr;
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// A unit of stream work.
pub(crate) type Job = Box<dyn FnOnce() -> Result<(), RuntimeError> + Send>;

/// Work queued on a stream, with the device regions it touches.
pub(crate) struct StreamOp {
    pub(crate) label: String,
    pub(crate) regions: Vec<MemPtr>,
    pub(crate) job: Job,
}

/// What a forced destroy abandoned.
///
/// Regions referenced by abandoned operations may be left partially
/// written. An operation already running when the stream was torn down
/// finishes in the background; `in_flight` reports it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForcedTeardown {
    pub abandoned_ops: usize,
    pub in_flight: bool,
    /// Device addresses bound to abandoned or in-flight operations, sorted
    /// and deduplicated.
    pub regions: Vec<MemPtr>,
}

impl ForcedTeardown {
    pub fn is_clean(&self) -> bool {
        self.abandoned_ops == 0 && !self.in_flight
    }

    pub fn summary(&self) -> String {
        format!(
            "{} op(s) abandoned, {} in flight, {} region(s) affected",
            self.abandoned_ops,
            if self.in_flight { 1 } else { 0 },
            self.regions.len()
        )
    }
}

#[derive(Default)]
struct QueueState {
    queue: VecDeque<StreamOp>,
    submitted: u64,
    completed: u64,
    running: Option<Vec<MemPtr>>,
    error: Option<RuntimeError>,
    shutdown: bool,
}

struct StreamShared {
    device: u32,
    state: Mutex<QueueState>,
    work_ready: Condvar,
    progress: Condvar,
    work: Arc<WorkTracker>,
}

impl StreamShared {
    fn state(&self) -> Result<MutexGuard<'_, QueueState>, RuntimeError> {
        lock(&self.state)
    }
}

struct StreamEntry {
    context: ContextHandle,
    shared: Arc<StreamShared>,
    worker: Option<JoinHandle<()>>,
}

/// Creates streams and dispatches work onto them.
pub struct StreamManager {
    contexts: Arc<ContextManager>,
    work: Arc<WorkTracker>,
    busy_on_pending_destroy: bool,
    table: Mutex<HandleTable<StreamHandle, StreamEntry>>,
}

impl StreamManager {
    pub(crate) fn new(
        contexts: Arc<ContextManager>,
        work: Arc<WorkTracker>,
        busy_on_pending_destroy: bool,
    ) -> Self {
        Self {
            contexts,
            work,
            busy_on_pending_destroy,
            table: Mutex::new(HandleTable::new()),
        }
    }

    /// Creates a stream on `ctx` and starts its worker.
    pub fn create(&self, ctx: ContextHandle) -> Result<StreamHandle, RuntimeError> {
        let device = self.contexts.retain_stream(ctx)?;
        let shared = Arc::new(StreamShared {
            device,
            state: Mutex::new(QueueState::default()),
            work_ready: Condvar::new(),
            progress: Condvar::new(),
            work: Arc::clone(&self.work),
        });

        let worker_shared = Arc::clone(&shared);
        let worker = std::thread::Builder::new()
            .name(format!("npu-stream-d{device}"))
            .spawn(move || worker_loop(worker_shared));
        let worker = match worker {
            Ok(w) => w,
            Err(e) => {
                self.contexts.release_stream(ctx);
                return Err(RuntimeError::OutOfResources(format!("cannot spawn stream worker: {e}")));
            }
        };

        let stream = lock(&self.table)?.insert(StreamEntry {
            context: ctx,
            shared,
            worker: Some(worker),
        });
        info!(%stream, %ctx, device, "Stream created");
        Ok(stream)
    }

    /// Destroys `stream` after its pending work drains.
    ///
    /// With `busy_on_pending_destroy` set, pending work fails the call
    /// with `Busy` and the stream stays alive.
    pub fn destroy(&self, stream: StreamHandle) -> Result<(), RuntimeError> {
        let mut entry = {
            let mut table = lock(&self.table)?;
            let entry = table.get(stream)?;
            if self.busy_on_pending_destroy {
                let st = entry.shared.state()?;
                let pending = st.submitted - st.completed;
                if pending > 0 {
                    return Err(RuntimeError::Busy(format!(
                        "{stream} has {pending} pending operation(s)"
                    )));
                }
            }
            table.remove(stream)?
        };

        {
            let mut st = entry.shared.state()?;
            let target = st.submitted;
            while st.completed < target {
                st = wait_progress(&entry.shared, st)?;
            }
            if let Some(e) = st.error.take() {
                debug!(%stream, error = %e, "Discarding unobserved stream error");
            }
            st.shutdown = true;
        }
        entry.shared.work_ready.notify_all();
        if let Some(worker) = entry.worker.take() {
            let _ = worker.join();
        }
        self.contexts.release_stream(entry.context);
        info!(%stream, "Stream destroyed");
        Ok(())
    }

    /// Destroys `stream` without waiting, abandoning queued work.
    pub fn destroy_force(&self, stream: StreamHandle) -> Result<ForcedTeardown, RuntimeError> {
        let entry = lock(&self.table)?.remove(stream)?;
        let report = teardown(&entry.shared)?;
        // The worker exits after any in-flight op; it is not joined.
        drop(entry.worker);
        self.contexts.release_stream(entry.context);

        if report.is_clean() {
            info!(%stream, "Stream force-destroyed");
        } else {
            warn!(%stream, report = %report.summary(), "Stream force-destroyed with pending work");
        }
        Ok(report)
    }

    /// Blocks until every operation submitted before this call completes.
    ///
    /// Returns the first failure recorded by those operations.
    pub fn wait(&self, stream: StreamHandle) -> Result<(), RuntimeError> {
        let shared = self.shared(stream)?;
        let mut st = shared.state()?;
        let target = st.submitted;
        while st.completed < target {
            st = wait_progress(&shared, st)?;
        }
        take_error(&mut st)
    }

    /// Waits up to `timeout`. Returns `false` when work is still pending;
    /// the work itself keeps running.
    ///
    /// A timeout too large to represent as a deadline (e.g. `Duration::MAX`)
    /// waits without limit.
    pub fn wait_timeout(&self, stream: StreamHandle, timeout: Duration) -> Result<bool, RuntimeError> {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            return self.wait(stream).map(|()| true);
        };
        let shared = self.shared(stream)?;
        let mut st = shared.state()?;
        let target = st.submitted;
        while st.completed < target {
            let now = Instant::now();
            if now >= deadline {
                debug!(%stream, pending = target - st.completed, "Stream wait timed out");
                return Ok(false);
            }
            let (guard, _) = shared
                .progress
                .wait_timeout(st, deadline - now)
                .map_err(|_| RuntimeError::Fatal("stream state poisoned".into()))?;
            st = guard;
        }
        take_error(&mut st)?;
        Ok(true)
    }

    /// Like [`wait_timeout`](Self::wait_timeout) but reports expiry as
    /// `ErrorKind::Timeout`.
    pub fn wait_for(&self, stream: StreamHandle, timeout: Duration) -> Result<(), RuntimeError> {
        if self.wait_timeout(stream, timeout)? {
            Ok(())
        } else {
            Err(RuntimeError::Timeout(timeout))
        }
    }

    pub fn device_of(&self, stream: StreamHandle) -> Result<u32, RuntimeError> {
        Ok(self.shared(stream)?.device)
    }

    pub fn context_of(&self, stream: StreamHandle) -> Result<ContextHandle, RuntimeError> {
        Ok(lock(&self.table)?.get(stream)?.context)
    }

    /// Number of live streams.
    pub fn count(&self) -> usize {
        self.table.lock().map(|t| t.len()).unwrap_or(0)
    }

    /// Queues `op` on `stream`.
    pub(crate) fn submit(&self, stream: StreamHandle, op: StreamOp) -> Result<(), RuntimeError> {
        let shared = self.shared(stream)?;
        {
            let mut st = shared.state()?;
            if st.shutdown {
                return Err(RuntimeError::handle(stream));
            }
            debug!(%stream, op = %op.label, queued = st.queue.len(), "Submitting stream op");
            st.queue.push_back(op);
            st.submitted += 1;
            shared.work.begin(shared.device);
        }
        shared.work_ready.notify_one();
        Ok(())
    }

    fn shared(&self, stream: StreamHandle) -> Result<Arc<StreamShared>, RuntimeError> {
        Ok(Arc::clone(&lock(&self.table)?.get(stream)?.shared))
    }
}

impl ResetHook for StreamManager {
    fn on_reset(&self, device: u32) {
        let doomed = match self.table.lock() {
            Ok(mut table) => table.remove_where(|e| e.shared.device == device),
            Err(_) => {
                warn!(device, "Stream table poisoned during device reset");
                return;
            }
        };
        for (stream, entry) in doomed {
            match teardown(&entry.shared) {
                Ok(report) if !report.is_clean() => {
                    warn!(%stream, device, report = %report.summary(), "Stream abandoned by device reset");
                }
                Ok(_) => debug!(%stream, device, "Stream destroyed by device reset"),
                Err(e) => warn!(%stream, device, error = %e, "Stream teardown failed"),
            }
            self.contexts.release_stream(entry.context);
        }
    }
}

impl Drop for StreamManager {
    fn drop(&mut self) {
        let Ok(mut table) = self.table.lock() else {
            return;
        };
        for (_, mut entry) in table.remove_where(|_| true) {
            if let Ok(mut st) = entry.shared.state() {
                st.shutdown = true;
            }
            entry.shared.work_ready.notify_all();
            if let Some(worker) = entry.worker.take() {
                let _ = worker.join();
            }
        }
    }
}

impl std::fmt::Debug for StreamManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamManager")
            .field("streams", &self.count())
            .field("busy_on_pending_destroy", &self.busy_on_pending_destroy)
            .finish()
    }
}

// ── Private helpers ────────────────────────────────────────────

fn worker_loop(shared: Arc<StreamShared>) {
    loop {
        let op = {
            let Ok(mut st) = shared.state.lock() else {
                return;
            };
            loop {
                if let Some(op) = st.queue.pop_front() {
                    st.running = Some(op.regions.clone());
                    break op;
                }
                if st.shutdown {
                    return;
                }
                st = match shared.work_ready.wait(st) {
                    Ok(g) => g,
                    Err(_) => return,
                };
            }
        };

        let label = op.label;
        let result = catch_unwind(AssertUnwindSafe(op.job)).unwrap_or_else(|_| {
            Err(RuntimeError::Fatal(format!("stream operation '{label}' panicked")))
        });

        if let Ok(mut st) = shared.state.lock() {
            st.running = None;
            st.completed += 1;
            if let Err(e) = result {
                warn!(device = shared.device, op = %label, error = %e, "Stream operation failed");
                if st.error.is_none() {
                    st.error = Some(e);
                }
            }
        }
        shared.work.end(shared.device);
        shared.progress.notify_all();
    }
}

fn wait_progress<'a>(
    shared: &'a StreamShared,
    st: MutexGuard<'a, QueueState>,
) -> Result<MutexGuard<'a, QueueState>, RuntimeError> {
    shared
        .progress
        .wait(st)
        .map_err(|_| RuntimeError::Fatal("stream state poisoned".into()))
}

fn take_error(st: &mut QueueState) -> Result<(), RuntimeError> {
    match st.error.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Drops queued work, stops the worker and reports what was lost.
fn teardown(shared: &StreamShared) -> Result<ForcedTeardown, RuntimeError> {
    let mut report = ForcedTeardown::default();
    {
        let mut st = shared.state()?;
        let abandoned: Vec<StreamOp> = st.queue.drain(..).collect();
        report.abandoned_ops = abandoned.len();
        for op in &abandoned {
            report.regions.extend(op.regions.iter().copied());
        }
        if let Some(running) = &st.running {
            report.in_flight = true;
            report.regions.extend(running.iter().copied());
        }
        // Abandoned ops count as completed so blocked waiters return.
        st.completed += abandoned.len() as u64;
        st.shutdown = true;
        for _ in &abandoned {
            shared.work.end(shared.device);
        }
    }
    report.regions.sort();
    report.regions.dedup();
    shared.work_ready.notify_all();
    shared.progress.notify_all();
    Ok(report)
}
