//! Worker pool: dequeues filesystem events and drives per-file processing.
//!
//! Routing guarantees, in concert with the registry:
//! - at most one worker processes a given path at a time (the gate),
//! - every appended byte for a live path is eventually processed (losers of
//!   the gate race leave a dirty flag the holder drains in its catch-up
//!   loop),
//! - once a delete is pending no further bytes are processed and the gate
//!   holder finalizes the state,
//! - swap acknowledgements happen only at safe points: after a dequeue
//!   timeout, after handling an event, and twice per catch-up iteration.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use logsift_core::types::{FsEvent, FsEventKind};
use logsift_core::{SiftError, SiftResult};
use tracing::{debug, warn};

use crate::bus::EventBus;
use crate::processor::FileProcessor;
use crate::registry::FileStateRegistry;
use crate::stats::WorkerStats;

/// How long a worker waits on the bus before re-checking flags.
const DEQUEUE_WAIT: Duration = Duration::from_millis(100);
/// Bounded per-worker join wait during shutdown.
const WORKER_JOIN_TIMEOUT: Duration = Duration::from_secs(2);
const JOIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Owns the worker threads and their per-worker stats.
pub struct ProcessingCoordinator {
    bus: Arc<EventBus<FsEvent>>,
    stopping: Arc<AtomicBool>,
    stats: Vec<Arc<WorkerStats>>,
    workers: Vec<thread::JoinHandle<()>>,
    stopped_once: AtomicBool,
}

impl ProcessingCoordinator {
    /// Spawns `worker_count` workers consuming from `bus`.
    ///
    /// # Errors
    ///
    /// Returns an error if a worker thread cannot be spawned.
    pub fn start(
        bus: Arc<EventBus<FsEvent>>,
        registry: Arc<FileStateRegistry>,
        processor: Arc<FileProcessor>,
        worker_count: usize,
    ) -> SiftResult<Self> {
        let worker_count = worker_count.max(1);
        let stopping = Arc::new(AtomicBool::new(false));
        let mut stats = Vec::with_capacity(worker_count);
        let mut workers = Vec::with_capacity(worker_count);

        for index in 0..worker_count {
            let worker_stats = Arc::new(WorkerStats::new());
            stats.push(Arc::clone(&worker_stats));
            let context = WorkerContext {
                bus: Arc::clone(&bus),
                registry: Arc::clone(&registry),
                processor: Arc::clone(&processor),
                stats: worker_stats,
                stopping: Arc::clone(&stopping),
            };
            let handle = thread::Builder::new()
                .name(format!("logsift-worker-{index}"))
                .spawn(move || run_worker_loop(&context))
                .map_err(|error| SiftError::SubsystemError {
                    subsystem: "coordinator",
                    source: Box::new(std::io::Error::other(format!(
                        "failed to spawn worker {index}: {error}"
                    ))),
                })?;
            workers.push(handle);
        }

        Ok(Self {
            bus,
            stopping,
            stats,
            workers,
            stopped_once: AtomicBool::new(false),
        })
    }

    /// Per-worker stats handles, in worker order. Consumed by the reporter.
    #[must_use]
    pub fn worker_stats(&self) -> &[Arc<WorkerStats>] {
        &self.stats
    }

    /// Stops the pool: sets the stop flag, stops the bus, then joins each
    /// worker with a bounded timeout. Safe to call once; later calls are
    /// no-ops.
    pub fn stop(&mut self) {
        if self.stopped_once.swap(true, Ordering::AcqRel) {
            return;
        }
        self.stopping.store(true, Ordering::Release);
        self.bus.stop();

        for (index, handle) in self.workers.drain(..).enumerate() {
            let deadline = Instant::now() + WORKER_JOIN_TIMEOUT;
            while !handle.is_finished() && Instant::now() < deadline {
                thread::sleep(JOIN_POLL_INTERVAL);
            }
            if handle.is_finished() {
                if handle.join().is_err() {
                    warn!(worker = index, "worker panicked before shutdown");
                }
            } else {
                // Rust threads cannot be interrupted; the loop re-checks the
                // stop flag at every safe point, so an unfinished worker is
                // wedged in a blocking filesystem call. Abandon it.
                warn!(worker = index, "worker did not stop in time; abandoning");
            }
        }
    }
}

impl Drop for ProcessingCoordinator {
    fn drop(&mut self) {
        self.stop();
    }
}

struct WorkerContext {
    bus: Arc<EventBus<FsEvent>>,
    registry: Arc<FileStateRegistry>,
    processor: Arc<FileProcessor>,
    stats: Arc<WorkerStats>,
    stopping: Arc<AtomicBool>,
}

impl WorkerContext {
    fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::Acquire)
    }
}

fn run_worker_loop(context: &WorkerContext) {
    loop {
        let Some(event) = context.bus.try_dequeue(DEQUEUE_WAIT) else {
            context.stats.ack_swap_if_requested();
            if context.is_stopping() {
                return;
            }
            continue;
        };
        handle_event(context, &event);
        context.stats.ack_swap_if_requested();
        if context.is_stopping() {
            return;
        }
    }
}

fn handle_event(context: &WorkerContext, event: &FsEvent) {
    // The fs_* counter always moves, whether or not the path is processable.
    context.stats.active().record_event_kind(event.kind);

    match event.kind {
        FsEventKind::Created | FsEventKind::Modified => {
            if event.processable {
                handle_create_or_modify(context, &event.path);
            }
        }
        FsEventKind::Deleted => handle_delete(context, &event.path),
        FsEventKind::Renamed => {
            if let Some(old_path) = &event.old_path {
                handle_delete(context, old_path);
            }
            if event.processable {
                handle_create_or_modify(context, &event.path);
            }
        }
    }
}

fn handle_create_or_modify(context: &WorkerContext, path: &Path) {
    let state = context.registry.get_or_create(path);
    let Some(mut cursor) = state.try_acquire() else {
        // Another worker is on this path; leave a marker for its catch-up
        // loop instead of waiting.
        state.mark_dirty_if_allowed();
        context.stats.active().coalesced_due_to_busy_gate += 1;
        return;
    };

    if state.is_delete_pending() {
        context.stats.active().skipped_due_to_delete_pending += 1;
        finalize_under_gate(context, path);
        return;
    }

    loop {
        context.stats.ack_swap_if_requested();
        if state.is_delete_pending() {
            finalize_under_gate(context, path);
            return;
        }

        {
            let mut stats = context.stats.active();
            context.processor.process_once(path, &mut cursor, &mut stats);
        }

        context.stats.ack_swap_if_requested();
        if state.is_delete_pending() {
            finalize_under_gate(context, path);
            return;
        }
        if state.is_dirty() {
            state.clear_dirty();
            continue;
        }
        break;
    }
}

fn handle_delete(context: &WorkerContext, path: &Path) {
    let Some(state) = context.registry.try_get(path) else {
        return;
    };
    match state.try_acquire() {
        None => {
            state.mark_delete_pending();
            context.stats.active().delete_pending_set += 1;
            debug!(path = %path.display(), "delete pending; gate busy");
        }
        Some(_cursor) => {
            state.mark_delete_pending();
            finalize_under_gate(context, path);
        }
    }
}

fn finalize_under_gate(context: &WorkerContext, path: &Path) {
    context.registry.finalize_delete(path);
    context.stats.active().file_state_removed += 1;
}
