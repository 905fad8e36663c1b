//! logsift: watches a single directory of append-only log files, tails each
//! file as it grows, parses newline-delimited records, and periodically
//! prints aggregated statistics to stdout.
//!
//! The concurrent pipeline, front to back:
//!
//! - [`watcher`]: OS change notifications normalized onto the bus,
//! - [`bus`]: bounded drop-newest queue between watcher and workers,
//! - [`coordinator`]: worker pool with per-file serialization,
//! - [`registry`] + [`processor`] + [`tailer`]: per-file tail/scan/parse,
//! - [`stats`]: double-buffered per-worker counters,
//! - [`reporter`]: interval swap/merge/print.

#![forbid(unsafe_code)]

pub mod bus;
pub mod cli;
pub mod config;
pub mod coordinator;
pub mod processor;
pub mod registry;
pub mod reporter;
pub mod runtime;
pub mod shutdown;
pub mod stats;
pub mod tailer;
pub mod tracing_setup;
pub mod watcher;

pub use bus::EventBus;
pub use config::SiftConfig;
pub use coordinator::ProcessingCoordinator;
pub use processor::FileProcessor;
pub use registry::{FileState, FileStateRegistry, TailCursor};
pub use reporter::{BusCounters, GlobalSnapshot, ReportFrame, Reporter};
pub use runtime::SiftRuntime;
pub use shutdown::{ShutdownCoordinator, ShutdownReason, ShutdownState};
pub use stats::{WorkerStats, WorkerStatsBuffer};
pub use tailer::{ChunkFn, FileTailer, FsTailer, TailOutcome, TailSink};
pub use watcher::DirectoryWatcher;
