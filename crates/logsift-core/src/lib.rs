//! Core types, parsers, and statistics primitives for the logsift pipeline.
//!
//! This crate defines the shared data model (`FsEvent`, `LogLevel`,
//! `TailStatus`), the pure line scanner and log-record parser, the fixed-bin
//! latency histogram with exact top-K ranking, and the error type
//! (`SiftError`) used across the workspace.
//!
//! It performs no IO and spawns no threads; everything here is directly
//! unit-testable and is consumed by the `logsift` binary crate.

#![forbid(unsafe_code)]

pub mod error;
pub mod metrics;
pub mod parser;
pub mod scanner;
pub mod tracing_config;
pub mod types;

pub use error::{SiftError, SiftResult};
pub use metrics::{HISTOGRAM_BINS, LatencyHistogram, OVERFLOW_BIN, top_k};
pub use parser::{ParsedLine, parse_line};
pub use scanner::scan;
pub use types::{FsEvent, FsEventKind, LogLevel, TailStatus};
