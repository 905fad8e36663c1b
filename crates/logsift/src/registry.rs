//! Per-file tail state and the path-keyed registry that owns it.
//!
//! Each tracked file gets one [`FileState`] shared (via `Arc`) between the
//! registry and whichever worker currently holds its gate. The gate is the
//! `Mutex` around [`TailCursor`]: a successful `try_lock` is the non-blocking
//! acquire, and holding the guard is the only way to touch offset or carry.
//! `dirty` and `delete_pending` live beside the cursor as atomics so workers
//! that lose the gate race can still leave a signal for the holder.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Offset and carry for one tailed file. Mutable only through the gate.
#[derive(Debug, Default)]
pub struct TailCursor {
    /// Next byte to read. Non-decreasing except on truncation reset to 0.
    pub offset: u64,
    /// Partial trailing line retained between chunk reads.
    pub carry: Vec<u8>,
}

/// Shared per-path state: cursor behind the gate, signal flags beside it.
#[derive(Debug)]
pub struct FileState {
    cursor: Mutex<TailCursor>,
    dirty: AtomicBool,
    delete_pending: AtomicBool,
    generation: u32,
}

impl FileState {
    fn new(generation: u32) -> Self {
        Self {
            cursor: Mutex::new(TailCursor::default()),
            dirty: AtomicBool::new(false),
            delete_pending: AtomicBool::new(false),
            generation,
        }
    }

    /// Non-blocking gate acquire. `None` means another worker holds it.
    #[must_use]
    pub fn try_acquire(&self) -> Option<MutexGuard<'_, TailCursor>> {
        match self.cursor.try_lock() {
            Ok(guard) => Some(guard),
            Err(std::sync::TryLockError::WouldBlock) => None,
            Err(std::sync::TryLockError::Poisoned(poisoned)) => Some(poisoned.into_inner()),
        }
    }

    /// Flags unprocessed work for the gate holder. Suppressed once a delete
    /// is pending; the recheck closes the race with a concurrent
    /// [`Self::mark_delete_pending`].
    pub fn mark_dirty_if_allowed(&self) {
        if self.delete_pending.load(Ordering::Acquire) {
            return;
        }
        self.dirty.store(true, Ordering::Release);
        if self.delete_pending.load(Ordering::Acquire) {
            self.dirty.store(false, Ordering::Release);
        }
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Clears the dirty flag. Caller must hold the gate.
    pub fn clear_dirty(&self) {
        self.dirty.store(false, Ordering::Release);
    }

    /// Monotonic: once set, the dirty flag is forced false and no further
    /// processing is permitted for this path.
    pub fn mark_delete_pending(&self) {
        self.delete_pending.store(true, Ordering::Release);
        self.dirty.store(false, Ordering::Release);
    }

    #[must_use]
    pub fn is_delete_pending(&self) -> bool {
        self.delete_pending.load(Ordering::Acquire)
    }

    #[must_use]
    pub const fn generation(&self) -> u32 {
        self.generation
    }
}

#[derive(Default)]
struct RegistryInner {
    states: HashMap<PathBuf, Arc<FileState>>,
    epochs: HashMap<PathBuf, u32>,
}

/// Path→state map plus a monotonic per-path epoch counter.
///
/// Removal never invalidates a worker's `Arc`; the state dies when the last
/// gate holder drops it.
#[derive(Default)]
pub struct FileStateRegistry {
    inner: Mutex<RegistryInner>,
}

impl FileStateRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the existing state or atomically creates a fresh one
    /// (offset 0, empty carry, flags clear, generation = epoch + 1).
    #[must_use]
    pub fn get_or_create(&self, path: &Path) -> Arc<FileState> {
        let mut inner = lock_or_recover(&self.inner);
        if let Some(state) = inner.states.get(path) {
            return Arc::clone(state);
        }
        let epoch = inner.epochs.get(path).copied().unwrap_or(0);
        let state = Arc::new(FileState::new(epoch.wrapping_add(1)));
        inner.states.insert(path.to_path_buf(), Arc::clone(&state));
        state
    }

    #[must_use]
    pub fn try_get(&self, path: &Path) -> Option<Arc<FileState>> {
        lock_or_recover(&self.inner).states.get(path).map(Arc::clone)
    }

    /// Removes the state and bumps the path's epoch. Caller must hold the
    /// state's gate.
    pub fn finalize_delete(&self, path: &Path) {
        let mut inner = lock_or_recover(&self.inner);
        inner.states.remove(path);
        let epoch = inner.epochs.entry(path.to_path_buf()).or_insert(0);
        *epoch = epoch.wrapping_add(1);
    }

    /// Current epoch for `path` (0 if never finalized).
    #[must_use]
    pub fn epoch(&self, path: &Path) -> u32 {
        lock_or_recover(&self.inner)
            .epochs
            .get(path)
            .copied()
            .unwrap_or(0)
    }

    #[must_use]
    pub fn contains(&self, path: &Path) -> bool {
        lock_or_recover(&self.inner).states.contains_key(path)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        lock_or_recover(&self.inner).states.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn lock_or_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::FileStateRegistry;
    use std::path::Path;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn get_or_create_returns_same_state_for_same_path() {
        let registry = FileStateRegistry::new();
        let a = registry.get_or_create(Path::new("/logs/a.log"));
        let b = registry.get_or_create(Path::new("/logs/a.log"));
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn fresh_state_starts_clean() {
        let registry = FileStateRegistry::new();
        let state = registry.get_or_create(Path::new("/logs/a.log"));
        let cursor = state.try_acquire().expect("uncontended gate");
        assert_eq!(cursor.offset, 0);
        assert!(cursor.carry.is_empty());
        drop(cursor);
        assert!(!state.is_dirty());
        assert!(!state.is_delete_pending());
        assert_eq!(state.generation(), 1);
    }

    #[test]
    fn finalize_delete_removes_state_and_bumps_epoch() {
        let registry = FileStateRegistry::new();
        let path = Path::new("/logs/a.log");
        let state = registry.get_or_create(path);
        let epoch_before = registry.epoch(path);

        let _gate = state.try_acquire().expect("gate");
        registry.finalize_delete(path);

        assert!(!registry.contains(path));
        assert!(registry.epoch(path) > epoch_before);
    }

    #[test]
    fn recreated_state_is_fresh_with_next_generation() {
        let registry = FileStateRegistry::new();
        let path = Path::new("/logs/a.log");

        let first = registry.get_or_create(path);
        {
            let mut cursor = first.try_acquire().expect("gate");
            cursor.offset = 4_096;
            cursor.carry.extend_from_slice(b"partial");
            registry.finalize_delete(path);
        }

        let second = registry.get_or_create(path);
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(second.generation(), 2);
        let cursor = second.try_acquire().expect("gate");
        assert_eq!(cursor.offset, 0);
        assert!(cursor.carry.is_empty());
    }

    #[test]
    fn gate_is_exclusive_and_nonblocking() {
        let registry = FileStateRegistry::new();
        let state = registry.get_or_create(Path::new("/logs/a.log"));
        let held = state.try_acquire().expect("first acquire");
        assert!(state.try_acquire().is_none(), "second acquire must fail");
        drop(held);
        assert!(state.try_acquire().is_some());
    }

    #[test]
    fn delete_pending_suppresses_dirty() {
        let registry = FileStateRegistry::new();
        let state = registry.get_or_create(Path::new("/logs/a.log"));

        state.mark_dirty_if_allowed();
        assert!(state.is_dirty());

        state.mark_delete_pending();
        assert!(!state.is_dirty(), "delete pending forces dirty false");

        state.mark_dirty_if_allowed();
        assert!(!state.is_dirty(), "dirty suppressed after delete pending");
    }

    #[test]
    fn removal_does_not_invalidate_live_gate_holder() {
        let registry = Arc::new(FileStateRegistry::new());
        let path = Path::new("/logs/a.log");
        let state = registry.get_or_create(path);

        let mut cursor = state.try_acquire().expect("gate");
        cursor.offset = 128;

        let remover = {
            let registry = Arc::clone(&registry);
            thread::spawn(move || registry.finalize_delete(Path::new("/logs/a.log")))
        };
        remover.join().expect("remover join");

        // The registry entry is gone but our reference is still valid.
        assert!(!registry.contains(path));
        cursor.offset = 256;
        assert_eq!(cursor.offset, 256);
    }
}
