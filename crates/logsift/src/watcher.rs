//! Directory watcher: bridges OS change notifications onto the event bus.
//!
//! Watches a single directory (non-recursive), normalizes notify's event
//! taxonomy into `FsEvent`s, stamps each with the extension-policy decision,
//! and publishes without ever blocking — bus backpressure shows up in the
//! bus drop counter, while backend-internal errors and overflows are tallied
//! separately so the two cannot be conflated.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use logsift_core::types::{FsEvent, now_millis};
use logsift_core::{SiftError, SiftResult};
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, warn};

use crate::bus::EventBus;

const WATCHER_POLL_INTERVAL: Duration = Duration::from_millis(25);

#[derive(Default)]
struct WatcherControl {
    stop_flag: Option<Arc<AtomicBool>>,
    worker: Option<thread::JoinHandle<()>>,
}

/// Filesystem event source feeding the processing pipeline.
pub struct DirectoryWatcher {
    watch_path: PathBuf,
    extension: String,
    bus: Arc<EventBus<FsEvent>>,
    external_errors: Arc<AtomicU64>,
    control: Mutex<WatcherControl>,
}

impl DirectoryWatcher {
    #[must_use]
    pub fn new(
        watch_path: PathBuf,
        extension: impl Into<String>,
        bus: Arc<EventBus<FsEvent>>,
    ) -> Self {
        Self {
            watch_path,
            extension: extension.into(),
            bus,
            external_errors: Arc::new(AtomicU64::new(0)),
            control: Mutex::new(WatcherControl::default()),
        }
    }

    /// Backend-internal errors and overflow notifications, counted apart
    /// from bus capacity drops.
    #[must_use]
    pub fn external_error_count(&self) -> u64 {
        self.external_errors.load(Ordering::Relaxed)
    }

    /// Starts the background watch thread. Idempotent while running.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker thread cannot be spawned. Backend
    /// creation failures inside the worker are counted and logged, not
    /// raised — the pipeline keeps running on injected events.
    pub fn start(&self) -> SiftResult<()> {
        let mut control = lock_or_recover(&self.control);
        if control.worker.is_some() {
            return Ok(());
        }

        let stop_flag = Arc::new(AtomicBool::new(false));
        let context = WatchContext {
            watch_path: self.watch_path.clone(),
            extension: self.extension.clone(),
            bus: Arc::clone(&self.bus),
            external_errors: Arc::clone(&self.external_errors),
            stop_flag: Arc::clone(&stop_flag),
        };
        let errors = Arc::clone(&self.external_errors);
        let worker = thread::Builder::new()
            .name("logsift-watcher".to_owned())
            .spawn(move || {
                if let Err(error) = run_watch_loop(&context) {
                    errors.fetch_add(1, Ordering::Relaxed);
                    warn!(error = %error, "watch backend failed to start");
                }
            })
            .map_err(|error| SiftError::SubsystemError {
                subsystem: "watcher",
                source: Box::new(std::io::Error::other(format!(
                    "failed to spawn watcher thread: {error}"
                ))),
            })?;

        control.stop_flag = Some(stop_flag);
        control.worker = Some(worker);
        Ok(())
    }

    /// Stops the watch thread. Idempotent.
    pub fn stop(&self) {
        let (stop_flag, worker) = {
            let mut control = lock_or_recover(&self.control);
            (control.stop_flag.take(), control.worker.take())
        };
        if let Some(flag) = stop_flag {
            flag.store(true, Ordering::Release);
        }
        if let Some(worker) = worker
            && worker.join().is_err()
        {
            warn!("watcher thread panicked during shutdown");
        }
    }
}

struct WatchContext {
    watch_path: PathBuf,
    extension: String,
    bus: Arc<EventBus<FsEvent>>,
    external_errors: Arc<AtomicU64>,
    stop_flag: Arc<AtomicBool>,
}

fn run_watch_loop(context: &WatchContext) -> notify::Result<()> {
    let (event_tx, event_rx) = std::sync::mpsc::channel::<notify::Result<Event>>();
    let mut backend: RecommendedWatcher = notify::recommended_watcher(move |event| {
        if event_tx.send(event).is_err() {
            debug!("watch event dropped because worker channel is closed");
        }
    })?;
    backend.watch(&context.watch_path, RecursiveMode::NonRecursive)?;

    while !context.stop_flag.load(Ordering::Acquire) {
        match event_rx.recv_timeout(WATCHER_POLL_INTERVAL) {
            Ok(result) => forward_notify_result(context, result),
            Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {}
            Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }
    Ok(())
}

fn forward_notify_result(context: &WatchContext, result: notify::Result<Event>) {
    match result {
        Ok(event) => {
            for fs_event in map_notify_event(event, &context.extension) {
                // Drop-newest backpressure: a refused publish is already
                // counted by the bus; never block the OS notification path.
                let _accepted = context.bus.publish(fs_event);
            }
        }
        Err(error) => {
            context.external_errors.fetch_add(1, Ordering::Relaxed);
            warn!(error = %error, "watch backend emitted error");
        }
    }
}

/// Normalizes one notify event into zero or more bus events.
fn map_notify_event(event: Event, extension: &str) -> Vec<FsEvent> {
    let observed_at_ms = now_millis();
    let Event { kind, paths, .. } = event;
    match kind {
        EventKind::Create(_) => paths
            .into_iter()
            .map(|path| {
                let processable = matches_extension(&path, extension);
                FsEvent::created(path, observed_at_ms, processable)
            })
            .collect(),
        EventKind::Remove(_) => paths
            .into_iter()
            .map(|path| FsEvent::deleted(path, observed_at_ms))
            .collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if paths.len() == 2 => {
            let mut paths = paths.into_iter();
            let old_path = paths.next().unwrap_or_default();
            let new_path = paths.next().unwrap_or_default();
            let processable = matches_extension(&new_path, extension);
            vec![FsEvent::renamed(
                old_path,
                new_path,
                observed_at_ms,
                processable,
            )]
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => paths
            .into_iter()
            .map(|path| FsEvent::deleted(path, observed_at_ms))
            .collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => paths
            .into_iter()
            .map(|path| {
                let processable = matches_extension(&path, extension);
                FsEvent::created(path, observed_at_ms, processable)
            })
            .collect(),
        EventKind::Modify(_) => paths
            .into_iter()
            .map(|path| {
                let processable = matches_extension(&path, extension);
                FsEvent::modified(path, observed_at_ms, processable)
            })
            .collect(),
        EventKind::Access(_) | EventKind::Any | EventKind::Other => Vec::new(),
    }
}

fn matches_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
}

fn lock_or_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
