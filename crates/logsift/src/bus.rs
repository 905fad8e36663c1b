//! Bounded multi-producer/multi-consumer event bus with drop-newest
//! backpressure.
//!
//! `publish` never blocks: when the queue is at capacity the producer's item
//! is discarded and counted. `stop` unblocks all waiting consumers while
//! leaving queued items drainable. A stopped bus refuses new items without
//! counting them as capacity drops — a stopped bus is not a full bus.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

struct BusInner<T> {
    queue: VecDeque<T>,
    stopped: bool,
}

/// Bounded drop-newest queue shared between the watcher and the worker pool.
pub struct EventBus<T> {
    capacity: usize,
    inner: Mutex<BusInner<T>>,
    available: Condvar,
    published: AtomicU64,
    dropped: AtomicU64,
    depth: AtomicUsize,
}

impl<T> EventBus<T> {
    /// Creates a bus holding at most `capacity` items (clamped to ≥ 1).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            inner: Mutex::new(BusInner {
                queue: VecDeque::with_capacity(capacity),
                stopped: false,
            }),
            available: Condvar::new(),
            published: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            depth: AtomicUsize::new(0),
        }
    }

    /// Enqueues `item`, returning `true` iff it was accepted.
    ///
    /// Returns `false` without counting a drop when the bus is stopped;
    /// returns `false` and increments `dropped` when the queue is full.
    /// Never waits for capacity.
    pub fn publish(&self, item: T) -> bool {
        {
            let mut inner = lock_or_recover(&self.inner);
            if inner.stopped {
                return false;
            }
            if inner.queue.len() >= self.capacity {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                return false;
            }
            inner.queue.push_back(item);
            self.depth.store(inner.queue.len(), Ordering::Relaxed);
            self.published.fetch_add(1, Ordering::Relaxed);
        }
        self.available.notify_one();
        true
    }

    /// Dequeues one item, waiting up to `timeout` for one to arrive.
    ///
    /// Returns `None` once `timeout` elapses, or immediately when the bus is
    /// stopped and the queue is empty. Queued items remain drainable after
    /// `stop`. A zero timeout polls without waiting.
    pub fn try_dequeue(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut inner = lock_or_recover(&self.inner);
        loop {
            if let Some(item) = inner.queue.pop_front() {
                self.depth.store(inner.queue.len(), Ordering::Relaxed);
                return Some(item);
            }
            if inner.stopped {
                return None;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }
            let (guard, _timed_out) = self
                .available
                .wait_timeout(inner, remaining)
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            inner = guard;
        }
    }

    /// Stops the bus: idempotent, wakes all waiters.
    pub fn stop(&self) {
        {
            let mut inner = lock_or_recover(&self.inner);
            inner.stopped = true;
        }
        self.available.notify_all();
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        lock_or_recover(&self.inner).stopped
    }

    /// Items accepted since creation.
    #[must_use]
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Items refused because the queue was at capacity.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Instantaneous queue size.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }
}

fn lock_or_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
