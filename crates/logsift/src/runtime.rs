//! Wires the pipeline together and owns its ordered teardown.
//!
//! Startup: bus → registry → processor → coordinator → reporter → watcher.
//! Teardown runs the reverse of the dataflow — watcher first (no new
//! events), then bus (drains and unblocks), then coordinator (workers join),
//! then reporter (final frame) — behind a one-shot guard so racing shutdown
//! requests tear down exactly once. Teardown never raises; late failures are
//! logged and the remaining steps continue.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use logsift_core::SiftResult;
use logsift_core::types::FsEvent;
use tracing::{debug, info};

use crate::bus::EventBus;
use crate::config::SiftConfig;
use crate::coordinator::ProcessingCoordinator;
use crate::processor::FileProcessor;
use crate::registry::FileStateRegistry;
use crate::reporter::Reporter;
use crate::shutdown::{ShutdownCoordinator, ShutdownReason};
use crate::tailer::FsTailer;
use crate::watcher::DirectoryWatcher;

/// Owns every running component for one `logsift` invocation.
pub struct SiftRuntime {
    config: SiftConfig,
    teardown_once: AtomicBool,
}

impl SiftRuntime {
    #[must_use]
    pub fn new(config: SiftConfig) -> Self {
        Self {
            config,
            teardown_once: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub const fn config(&self) -> &SiftConfig {
        &self.config
    }

    /// Runs the pipeline until `shutdown` fires, then tears it down in
    /// order.
    ///
    /// # Errors
    ///
    /// Returns an error only for startup failures (thread spawning, watcher
    /// backend registration); once running, failures are counted and
    /// reported, never raised.
    pub fn run(&self, shutdown: &ShutdownCoordinator) -> SiftResult<()> {
        println!("{}", self.config.startup_line());

        let bus: Arc<EventBus<FsEvent>> = Arc::new(EventBus::new(self.config.queue_capacity));
        let registry = Arc::new(FileStateRegistry::new());
        let processor = Arc::new(FileProcessor::new(Arc::new(FsTailer::new())));

        let mut coordinator = ProcessingCoordinator::start(
            Arc::clone(&bus),
            Arc::clone(&registry),
            processor,
            self.config.workers,
        )?;
        let reporter = Reporter::start(
            coordinator.worker_stats().to_vec(),
            Arc::clone(&bus),
            self.config.report_interval(),
            self.config.top_k,
        )?;
        let watcher = DirectoryWatcher::new(
            self.config.watch_path.clone(),
            self.config.extension.clone(),
            Arc::clone(&bus),
        );
        watcher.start()?;

        info!(
            watch_path = %self.config.watch_path.display(),
            workers = self.config.workers,
            "pipeline running"
        );

        let reason = shutdown.wait_for_shutdown();
        info!(reason = ?reason, "draining pipeline");
        self.teardown(&watcher, &bus, &mut coordinator, &reporter, &reason);
        Ok(())
    }

    fn teardown(
        &self,
        watcher: &DirectoryWatcher,
        bus: &EventBus<FsEvent>,
        coordinator: &mut ProcessingCoordinator,
        reporter: &Reporter,
        reason: &ShutdownReason,
    ) {
        if self.teardown_once.swap(true, Ordering::AcqRel) {
            return;
        }
        watcher.stop();
        bus.stop();
        coordinator.stop();
        reporter.stop();
        debug!(
            reason = ?reason,
            watcher_errors = watcher.external_error_count(),
            "teardown complete"
        );
    }
}
