//! Periodic reporter: swaps every worker's stats, merges the inactive
//! buffers into a global snapshot, computes derived outputs, and prints one
//! frame per interval to stdout.
//!
//! Frames go to stdout and diagnostics to stderr (via tracing), so piping
//! the report stream stays clean. A worker that misses the swap-ack window
//! is merged best-effort from whatever its inactive buffer holds.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, SecondsFormat, Utc};
use logsift_core::types::{FsEvent, LogLevel};
use logsift_core::{OVERFLOW_BIN, SiftError, SiftResult, top_k};
use tracing::warn;

use crate::bus::EventBus;
use crate::stats::{WorkerStats, WorkerStatsBuffer};

/// How long the reporter waits for each worker to acknowledge a swap.
const SWAP_ACK_TIMEOUT: Duration = Duration::from_millis(200);

/// Bus counters captured once per frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BusCounters {
    pub published: u64,
    pub dropped: u64,
    pub depth: usize,
}

/// Reporter-owned merge target plus the outputs derived after each merge.
#[derive(Default)]
pub struct GlobalSnapshot {
    pub totals: WorkerStatsBuffer,
    pub bus: BusCounters,
    pub top_keys: Vec<(Vec<u8>, u32)>,
    pub p50: Option<u32>,
    pub p95: Option<u32>,
    pub p99: Option<u32>,
}

impl GlobalSnapshot {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears the merge target while keeping its allocations.
    pub fn reset_for_next_merge(&mut self) {
        self.totals.reset();
        self.bus = BusCounters::default();
        self.top_keys.clear();
        self.p50 = None;
        self.p95 = None;
        self.p99 = None;
    }

    /// Accumulates one worker's buffer into the totals.
    pub fn merge_worker(&mut self, buffer: &WorkerStatsBuffer) {
        self.totals.merge_from(buffer);
    }

    pub fn attach_bus(&mut self, bus: BusCounters) {
        self.bus = bus;
    }

    /// Computes top-K and percentiles from the merged totals.
    pub fn compute_derived(&mut self, k: usize) {
        self.top_keys = top_k(&self.totals.message_counts, k);
        self.p50 = self.totals.histogram.percentile(0.50);
        self.p95 = self.totals.histogram.percentile(0.95);
        self.p99 = self.totals.histogram.percentile(0.99);
    }
}

/// One formatted report block.
pub struct ReportFrame<'a> {
    pub reported_at: DateTime<Utc>,
    pub elapsed_seconds: f64,
    pub snapshot: &'a GlobalSnapshot,
}

impl ReportFrame<'_> {
    /// Renders the frame deterministically (invariant locale, fixed field
    /// order). Percentile `None` renders `n/a`; the overflow bin renders
    /// `>10000`.
    #[must_use]
    pub fn render(&self) -> String {
        use std::fmt::Write as _;

        let totals = &self.snapshot.totals;
        let mut out = String::with_capacity(512);
        let _ = writeln!(
            out,
            "[logsift] {} elapsed={:.2}s",
            self.reported_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            self.elapsed_seconds,
        );
        let _ = writeln!(
            out,
            "  fs_events: created={} modified={} deleted={} renamed={} rate={:.1}/s",
            totals.fs_created,
            totals.fs_modified,
            totals.fs_deleted,
            totals.fs_renamed,
            rate(totals.fs_total(), self.elapsed_seconds),
        );
        let _ = writeln!(
            out,
            "  lines: processed={} malformed={} rate={:.1}/s",
            totals.lines_processed,
            totals.malformed_lines,
            rate(totals.lines_processed, self.elapsed_seconds),
        );
        let _ = writeln!(
            out,
            "  levels: info={} warn={} error={} debug={} other={}",
            totals.level_counts[LogLevel::Info.index()],
            totals.level_counts[LogLevel::Warn.index()],
            totals.level_counts[LogLevel::Error.index()],
            totals.level_counts[LogLevel::Debug.index()],
            totals.level_counts[LogLevel::Other.index()],
        );
        let _ = writeln!(
            out,
            "  latency_ms: p50={} p95={} p99={}",
            render_percentile(self.snapshot.p50),
            render_percentile(self.snapshot.p95),
            render_percentile(self.snapshot.p99),
        );
        let _ = writeln!(out, "  top keys:");
        for (key, count) in &self.snapshot.top_keys {
            let _ = writeln!(out, "    {}: {}", String::from_utf8_lossy(key), count);
        }
        let _ = writeln!(
            out,
            "  io: not_found={} access_denied={} io_error={} truncation_reset={}",
            totals.file_not_found, totals.access_denied, totals.io_exception, totals.truncation_reset,
        );
        let _ = writeln!(
            out,
            "  gate: coalesced={} delete_pending_set={} skipped_delete_pending={} state_removed={}",
            totals.coalesced_due_to_busy_gate,
            totals.delete_pending_set,
            totals.skipped_due_to_delete_pending,
            totals.file_state_removed,
        );
        let _ = writeln!(
            out,
            "  bus: published={} dropped={} depth={}",
            self.snapshot.bus.published, self.snapshot.bus.dropped, self.snapshot.bus.depth,
        );
        out
    }
}

fn render_percentile(value: Option<u32>) -> String {
    match value {
        None => "n/a".to_owned(),
        Some(OVERFLOW_BIN) => ">10000".to_owned(),
        Some(bin) => bin.to_string(),
    }
}

/// `total / elapsed`, with zero-length intervals reporting 0.0 (never NaN).
#[allow(clippy::cast_precision_loss)]
fn rate(total: u64, elapsed_seconds: f64) -> f64 {
    if elapsed_seconds > f64::EPSILON {
        total as f64 / elapsed_seconds
    } else {
        0.0
    }
}

struct StopSignal {
    stopped: Mutex<bool>,
    condvar: Condvar,
}

struct ReporterShared {
    workers: Vec<Arc<WorkerStats>>,
    bus: Arc<EventBus<FsEvent>>,
    interval: Duration,
    top_k: usize,
    stop: StopSignal,
}

/// Background reporter thread handle.
pub struct Reporter {
    shared: Arc<ReporterShared>,
    thread: Mutex<Option<thread::JoinHandle<()>>>,
    stopped_once: AtomicBool,
}

impl Reporter {
    /// Spawns the reporter thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the thread cannot be spawned.
    pub fn start(
        workers: Vec<Arc<WorkerStats>>,
        bus: Arc<EventBus<FsEvent>>,
        interval: Duration,
        top_k: usize,
    ) -> SiftResult<Self> {
        let shared = Arc::new(ReporterShared {
            workers,
            bus,
            interval: interval.max(Duration::from_millis(1)),
            top_k,
            stop: StopSignal {
                stopped: Mutex::new(false),
                condvar: Condvar::new(),
            },
        });
        let loop_shared = Arc::clone(&shared);
        let thread = thread::Builder::new()
            .name("logsift-reporter".to_owned())
            .spawn(move || run_reporter_loop(&loop_shared))
            .map_err(|error| SiftError::SubsystemError {
                subsystem: "reporter",
                source: Box::new(std::io::Error::other(format!(
                    "failed to spawn reporter thread: {error}"
                ))),
            })?;
        Ok(Self {
            shared,
            thread: Mutex::new(Some(thread)),
            stopped_once: AtomicBool::new(false),
        })
    }

    /// Stops the timer and joins the thread; the thread prints a final frame
    /// (elapsed 0) on its way out. Idempotent.
    ///
    /// Call only after the coordinator has joined its workers, so the final
    /// frame can read the remaining active buffers without a swap round.
    pub fn stop(&self) {
        if self.stopped_once.swap(true, Ordering::AcqRel) {
            return;
        }
        {
            let mut stopped = lock_or_recover(&self.shared.stop.stopped);
            *stopped = true;
        }
        self.shared.stop.condvar.notify_all();

        let handle = lock_or_recover(&self.thread).take();
        if let Some(handle) = handle
            && handle.join().is_err()
        {
            warn!("reporter thread panicked during shutdown");
        }
    }
}

impl Drop for Reporter {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_reporter_loop(shared: &ReporterShared) {
    let mut snapshot = GlobalSnapshot::new();
    let mut last_tick = Instant::now();
    loop {
        if wait_for_stop_or_interval(shared) {
            break;
        }
        let now = Instant::now();
        let elapsed_seconds = now.duration_since(last_tick).as_secs_f64();
        run_tick(shared, &mut snapshot, elapsed_seconds);
        last_tick = now;
    }
    emit_final_frame(shared, &mut snapshot);
}

/// Returns true when stop was requested; false on an elapsed interval.
fn wait_for_stop_or_interval(shared: &ReporterShared) -> bool {
    let guard = lock_or_recover(&shared.stop.stopped);
    let (stopped, _timeout_result) = shared
        .stop
        .condvar
        .wait_timeout_while(guard, shared.interval, |stopped| !*stopped)
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    *stopped
}

fn run_tick(shared: &ReporterShared, snapshot: &mut GlobalSnapshot, elapsed_seconds: f64) {
    for worker in &shared.workers {
        worker.request_swap();
    }
    for (index, worker) in shared.workers.iter().enumerate() {
        if !worker.wait_for_swap_ack(SWAP_ACK_TIMEOUT) {
            warn!(
                worker = index,
                "swap ack timed out; merging best-effort data"
            );
        }
    }

    snapshot.reset_for_next_merge();
    for worker in &shared.workers {
        snapshot.merge_worker(&worker.inactive());
    }
    snapshot.attach_bus(BusCounters {
        published: shared.bus.published(),
        dropped: shared.bus.dropped(),
        depth: shared.bus.depth(),
    });
    snapshot.compute_derived(shared.top_k);

    let frame = ReportFrame {
        reported_at: Utc::now(),
        elapsed_seconds,
        snapshot,
    };
    print!("{}", frame.render());
}

/// Final frame after the worker pool has been joined: the unreported tail of
/// each worker's data sits in its active buffer, so merge those directly —
/// no swap round, elapsed pinned to 0.
fn emit_final_frame(shared: &ReporterShared, snapshot: &mut GlobalSnapshot) {
    snapshot.reset_for_next_merge();
    for worker in &shared.workers {
        snapshot.merge_worker(&worker.active());
    }
    snapshot.attach_bus(BusCounters {
        published: shared.bus.published(),
        dropped: shared.bus.dropped(),
        depth: shared.bus.depth(),
    });
    snapshot.compute_derived(shared.top_k);

    let frame = ReportFrame {
        reported_at: Utc::now(),
        elapsed_seconds: 0.0,
        snapshot,
    };
    print!("{}", frame.render());
}

fn lock_or_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
