//! Signal-driven shutdown state machine.
//!
//! First SIGINT (or SIGTERM) requests a graceful drain; a second SIGINT
//! within the force-exit window promotes to immediate exit. All transitions
//! are one-shot compare-and-set so shutdown stays idempotent no matter how
//! many sources race to request it.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use logsift_core::{SiftError, SiftResult};
use signal_hook::consts::signal::{SIGINT, SIGTERM};
use tracing::{debug, info, warn};

/// Time window where a second `SIGINT` forces immediate exit.
pub const FORCE_EXIT_WINDOW: Duration = Duration::from_secs(3);
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(25);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    Running,
    ShuttingDown,
    ForceExit,
}

impl ShutdownState {
    const fn as_u8(self) -> u8 {
        match self {
            Self::Running => 0,
            Self::ShuttingDown => 1,
            Self::ForceExit => 2,
        }
    }

    const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::ShuttingDown,
            2 => Self::ForceExit,
            _ => Self::Running,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    Signal(i32),
    Error(String),
    UserRequest,
}

/// Tracks lifecycle shutdown intent and signal-driven transitions.
#[derive(Debug)]
pub struct ShutdownCoordinator {
    shutdown_state: AtomicU8,
    shutdown_reason: Mutex<Option<ShutdownReason>>,
    first_sigint_at: Mutex<Option<Instant>>,
    signal_registration_active: AtomicBool,
    signal_handle: Mutex<Option<signal_hook::iterator::Handle>>,
    signal_listener_thread: Mutex<Option<thread::JoinHandle<()>>>,
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownCoordinator {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            shutdown_state: AtomicU8::new(ShutdownState::Running.as_u8()),
            shutdown_reason: Mutex::new(None),
            first_sigint_at: Mutex::new(None),
            signal_registration_active: AtomicBool::new(false),
            signal_handle: Mutex::new(None),
            signal_listener_thread: Mutex::new(None),
        }
    }

    /// Registers process signal listeners exactly once.
    ///
    /// # Errors
    ///
    /// Returns an error when signal handler registration fails.
    pub fn register_signals(self: &Arc<Self>) -> SiftResult<()> {
        if self
            .signal_registration_active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(());
        }

        let mut signals =
            signal_hook::iterator::Signals::new([SIGINT, SIGTERM]).map_err(|error| {
                self.signal_registration_active
                    .store(false, Ordering::Release);
                SiftError::SubsystemError {
                    subsystem: "shutdown",
                    source: Box::new(io::Error::other(format!(
                        "failed to register signal listeners: {error}"
                    ))),
                }
            })?;
        let handle = signals.handle();

        let coordinator = Arc::clone(self);
        let listener = thread::Builder::new()
            .name("logsift-signal-listener".to_owned())
            .spawn(move || {
                for signal in signals.forever() {
                    coordinator.handle_signal(signal);
                }
            })
            .map_err(|error| {
                self.signal_registration_active
                    .store(false, Ordering::Release);
                SiftError::SubsystemError {
                    subsystem: "shutdown",
                    source: Box::new(io::Error::other(format!(
                        "failed to start signal listener thread: {error}"
                    ))),
                }
            })?;

        *lock_or_recover(&self.signal_handle) = Some(handle);
        *lock_or_recover(&self.signal_listener_thread) = Some(listener);
        Ok(())
    }

    /// Stops the signal listener thread and clears registration state.
    pub fn stop_signal_listener(&self) {
        let signal_handle = lock_or_recover(&self.signal_handle).take();
        if let Some(handle) = signal_handle {
            handle.close();
        }

        let listener_thread = lock_or_recover(&self.signal_listener_thread).take();
        if let Some(listener_thread) = listener_thread
            && listener_thread.join().is_err()
        {
            warn!("signal listener thread panicked while stopping");
        }

        self.signal_registration_active
            .store(false, Ordering::Release);
    }

    /// Blocks until shutdown is requested (signal/user/error) and returns
    /// the reason.
    pub fn wait_for_shutdown(&self) -> ShutdownReason {
        loop {
            if self.is_shutting_down()
                && let Some(reason) = self.current_reason()
            {
                return reason;
            }
            thread::sleep(WAIT_POLL_INTERVAL);
        }
    }

    /// Requests graceful shutdown from non-signal sources (user, internal
    /// error). First caller wins; later calls are no-ops.
    pub fn request_shutdown(&self, reason: ShutdownReason) {
        if self
            .shutdown_state
            .compare_exchange(
                ShutdownState::Running.as_u8(),
                ShutdownState::ShuttingDown.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
        {
            self.set_reason(reason);
            info!(reason = ?self.current_reason(), "shutdown requested");
        }
    }

    #[must_use]
    pub fn state(&self) -> ShutdownState {
        ShutdownState::from_u8(self.shutdown_state.load(Ordering::Acquire))
    }

    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.state() != ShutdownState::Running
    }

    #[must_use]
    pub fn is_force_exit_requested(&self) -> bool {
        self.state() == ShutdownState::ForceExit
    }

    #[must_use]
    pub fn current_reason(&self) -> Option<ShutdownReason> {
        lock_or_recover(&self.shutdown_reason).clone()
    }

    fn handle_signal(&self, signal: i32) {
        match signal {
            SIGINT => self.handle_sigint(),
            SIGTERM => {
                self.request_shutdown(ShutdownReason::Signal(SIGTERM));
                info!("received SIGTERM, initiating graceful shutdown");
            }
            _ => {
                debug!(signal, "received unsupported signal");
            }
        }
    }

    fn handle_sigint(&self) {
        let now = Instant::now();
        match self.state() {
            ShutdownState::Running => {
                *lock_or_recover(&self.first_sigint_at) = Some(now);
                self.request_shutdown(ShutdownReason::Signal(SIGINT));
                info!("received first SIGINT, initiating graceful shutdown");
            }
            ShutdownState::ShuttingDown => {
                let first_sigint_at = *lock_or_recover(&self.first_sigint_at);
                if let Some(first) = first_sigint_at
                    && now.saturating_duration_since(first) <= FORCE_EXIT_WINDOW
                {
                    self.promote_force_exit();
                    return;
                }

                *lock_or_recover(&self.first_sigint_at) = Some(now);
                debug!("received SIGINT outside force-exit window; remaining in graceful shutdown");
            }
            ShutdownState::ForceExit => {}
        }
    }

    fn promote_force_exit(&self) {
        self.shutdown_state
            .store(ShutdownState::ForceExit.as_u8(), Ordering::Release);
        self.set_reason(ShutdownReason::Signal(SIGINT));
        warn!("received second SIGINT within window, forcing immediate exit");
    }

    fn set_reason(&self, reason: ShutdownReason) {
        *lock_or_recover(&self.shutdown_reason) = Some(reason);
    }

    #[cfg(test)]
    pub(crate) fn process_signal_for_test(&self, signal: i32) {
        self.handle_signal(signal);
    }
}

fn lock_or_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
