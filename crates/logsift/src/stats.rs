//! Per-worker statistics and the reporter-driven double-buffer swap.
//!
//! Each worker owns a [`WorkerStats`]: two buffers, an `active` pointer the
//! worker writes through, and an `inactive` buffer the reporter reads after
//! the worker acknowledges a swap. The worker only acknowledges at safe
//! points in its loop, so the reporter never observes a half-accumulated
//! line. The mutexes around the buffers are uncontended by construction;
//! they exist so the pair can cross the thread boundary without `unsafe`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Duration;

use logsift_core::types::{FsEventKind, LogLevel, TailStatus};
use logsift_core::LatencyHistogram;

/// Single-writer accumulator for one worker over one report interval.
#[derive(Debug, Default)]
pub struct WorkerStatsBuffer {
    pub fs_created: u64,
    pub fs_modified: u64,
    pub fs_deleted: u64,
    pub fs_renamed: u64,

    pub lines_processed: u64,
    pub malformed_lines: u64,

    pub coalesced_due_to_busy_gate: u64,
    pub delete_pending_set: u64,
    pub skipped_due_to_delete_pending: u64,
    pub file_state_removed: u64,

    pub file_not_found: u64,
    pub access_denied: u64,
    pub io_exception: u64,
    pub truncation_reset: u64,

    pub level_counts: [u64; LogLevel::COUNT],
    pub message_counts: HashMap<Vec<u8>, u32>,
    pub histogram: LatencyHistogram,
}

impl WorkerStatsBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            histogram: LatencyHistogram::new(),
            ..Self::default()
        }
    }

    /// Bumps the fs counter matching `kind`.
    pub fn record_event_kind(&mut self, kind: FsEventKind) {
        match kind {
            FsEventKind::Created => self.fs_created += 1,
            FsEventKind::Modified => self.fs_modified += 1,
            FsEventKind::Deleted => self.fs_deleted += 1,
            FsEventKind::Renamed => self.fs_renamed += 1,
        }
    }

    /// Accumulates one successfully parsed line.
    pub fn record_parsed(&mut self, level: LogLevel, key: &[u8], latency_ms: Option<i32>) {
        self.level_counts[level.index()] += 1;
        match self.message_counts.get_mut(key) {
            Some(count) => *count = count.saturating_add(1),
            None => {
                self.message_counts.insert(key.to_vec(), 1);
            }
        }
        if let Some(latency) = latency_ms {
            self.histogram.add(latency);
        }
    }

    /// Maps a tail status onto its counter; `NoData`/`ReadSome` count nothing.
    pub fn record_tail_status(&mut self, status: TailStatus) {
        match status {
            TailStatus::FileNotFound => self.file_not_found += 1,
            TailStatus::AccessDenied => self.access_denied += 1,
            TailStatus::IoError => self.io_exception += 1,
            TailStatus::TruncatedReset => self.truncation_reset += 1,
            TailStatus::NoData | TailStatus::ReadSome => {}
        }
    }

    /// Total filesystem events recorded.
    #[must_use]
    pub const fn fs_total(&self) -> u64 {
        self.fs_created + self.fs_modified + self.fs_deleted + self.fs_renamed
    }

    /// Elementwise merge of `other` into `self`.
    pub fn merge_from(&mut self, other: &Self) {
        self.fs_created += other.fs_created;
        self.fs_modified += other.fs_modified;
        self.fs_deleted += other.fs_deleted;
        self.fs_renamed += other.fs_renamed;
        self.lines_processed += other.lines_processed;
        self.malformed_lines += other.malformed_lines;
        self.coalesced_due_to_busy_gate += other.coalesced_due_to_busy_gate;
        self.delete_pending_set += other.delete_pending_set;
        self.skipped_due_to_delete_pending += other.skipped_due_to_delete_pending;
        self.file_state_removed += other.file_state_removed;
        self.file_not_found += other.file_not_found;
        self.access_denied += other.access_denied;
        self.io_exception += other.io_exception;
        self.truncation_reset += other.truncation_reset;
        for (dst, src) in self.level_counts.iter_mut().zip(&other.level_counts) {
            *dst += src;
        }
        for (key, &count) in &other.message_counts {
            match self.message_counts.get_mut(key.as_slice()) {
                Some(existing) => *existing = existing.saturating_add(count),
                None => {
                    self.message_counts.insert(key.clone(), count);
                }
            }
        }
        self.histogram.merge_from(&other.histogram);
    }

    /// Zeros everything without shrinking the key map or histogram storage.
    pub fn reset(&mut self) {
        self.fs_created = 0;
        self.fs_modified = 0;
        self.fs_deleted = 0;
        self.fs_renamed = 0;
        self.lines_processed = 0;
        self.malformed_lines = 0;
        self.coalesced_due_to_busy_gate = 0;
        self.delete_pending_set = 0;
        self.skipped_due_to_delete_pending = 0;
        self.file_state_removed = 0;
        self.file_not_found = 0;
        self.access_denied = 0;
        self.io_exception = 0;
        self.truncation_reset = 0;
        self.level_counts = [0; LogLevel::COUNT];
        self.message_counts.clear();
        self.histogram.reset();
    }
}

struct AckSignal {
    acked: Mutex<bool>,
    condvar: Condvar,
}

/// Double-buffered stats pair with the swap-request/ack protocol.
///
/// Protocol: the reporter calls [`request_swap`](Self::request_swap), the
/// worker observes it at a safe point via
/// [`ack_swap_if_requested`](Self::ack_swap_if_requested) (swapping the
/// buffers, resetting the new active one, and signaling), and the reporter
/// then reads [`inactive`](Self::inactive) after
/// [`wait_for_swap_ack`](Self::wait_for_swap_ack) returns. At most one swap
/// may be outstanding per worker at a time.
pub struct WorkerStats {
    buffers: [Mutex<WorkerStatsBuffer>; 2],
    active_index: AtomicUsize,
    swap_requested: AtomicBool,
    ack: AckSignal,
}

impl Default for WorkerStats {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerStats {
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffers: [
                Mutex::new(WorkerStatsBuffer::new()),
                Mutex::new(WorkerStatsBuffer::new()),
            ],
            active_index: AtomicUsize::new(0),
            swap_requested: AtomicBool::new(false),
            ack: AckSignal {
                acked: Mutex::new(false),
                condvar: Condvar::new(),
            },
        }
    }

    /// The buffer the owning worker writes through. Worker-side only.
    #[must_use]
    pub fn active(&self) -> MutexGuard<'_, WorkerStatsBuffer> {
        let index = self.active_index.load(Ordering::Acquire);
        lock_or_recover(&self.buffers[index])
    }

    /// Reporter-side: arms a swap and resets the single-use ack signal.
    pub fn request_swap(&self) {
        *lock_or_recover(&self.ack.acked) = false;
        self.swap_requested.store(true, Ordering::Release);
    }

    /// Worker-side, safe points only: performs the pending swap, resets the
    /// new active buffer, and signals the ack. No-op without a request.
    pub fn ack_swap_if_requested(&self) {
        if !self.swap_requested.swap(false, Ordering::AcqRel) {
            return;
        }
        let new_active = 1 - self.active_index.load(Ordering::Acquire);
        lock_or_recover(&self.buffers[new_active]).reset();
        self.active_index.store(new_active, Ordering::Release);

        *lock_or_recover(&self.ack.acked) = true;
        self.ack.condvar.notify_all();
    }

    /// Reporter-side: blocks until the worker acknowledges or `timeout`
    /// elapses. Returns `true` iff the swap was acknowledged.
    #[must_use]
    pub fn wait_for_swap_ack(&self, timeout: Duration) -> bool {
        let guard = lock_or_recover(&self.ack.acked);
        let (acked, _timeout_result) = self
            .ack
            .condvar
            .wait_timeout_while(guard, timeout, |acked| !*acked)
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *acked
    }

    /// The stable inactive buffer. Defined for the reporter only while the
    /// ack is signaled (or the worker is known to be stopped).
    #[must_use]
    pub fn inactive(&self) -> MutexGuard<'_, WorkerStatsBuffer> {
        let index = 1 - self.active_index.load(Ordering::Acquire);
        lock_or_recover(&self.buffers[index])
    }
}

fn lock_or_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
