//! Runtime configuration with layered sources.
//!
//! Precedence, highest to lowest: CLI flags, `LOGSIFT_*` environment
//! variables, built-in defaults. Invalid environment values are warned about
//! and skipped (the CLI is strict; the environment is advisory). Validation
//! runs once on the fully resolved value.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use logsift_core::{SiftError, SiftResult};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::cli::CliInput;

pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;
pub const DEFAULT_REPORT_INTERVAL_SECONDS: u64 = 2;
pub const DEFAULT_TOP_K: usize = 10;
pub const DEFAULT_EXTENSION: &str = "log";

/// Fully resolved runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SiftConfig {
    /// Directory whose log files are watched (flat, non-recursive).
    pub watch_path: PathBuf,
    /// Worker pool size.
    pub workers: usize,
    /// Event bus capacity.
    pub queue_capacity: usize,
    /// Seconds between report frames.
    pub report_interval_seconds: u64,
    /// Number of message keys ranked per frame.
    pub top_k: usize,
    /// File extension (without dot) marking a path processable.
    pub extension: String,
}

impl Default for SiftConfig {
    fn default() -> Self {
        Self {
            watch_path: PathBuf::from("."),
            workers: default_worker_count(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            report_interval_seconds: DEFAULT_REPORT_INTERVAL_SECONDS,
            top_k: DEFAULT_TOP_K,
            extension: DEFAULT_EXTENSION.to_owned(),
        }
    }
}

fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(1)
}

impl SiftConfig {
    /// Resolves defaults, then environment overrides, then CLI flags.
    ///
    /// # Errors
    ///
    /// Returns [`SiftError::InvalidConfig`] or
    /// [`SiftError::WatchPathUnavailable`] when the resolved value fails
    /// validation.
    pub fn from_sources(cli: &CliInput, env: &HashMap<String, String>) -> SiftResult<Self> {
        let mut config = Self::default();
        config.apply_env(env);
        config.apply_cli(cli);
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self, env: &HashMap<String, String>) {
        if let Some(value) = env_parse::<usize>(env, "LOGSIFT_WORKERS") {
            self.workers = value;
        }
        if let Some(value) = env_parse::<usize>(env, "LOGSIFT_QUEUE_CAPACITY") {
            self.queue_capacity = value;
        }
        if let Some(value) = env_parse::<u64>(env, "LOGSIFT_REPORT_INTERVAL_SECONDS") {
            self.report_interval_seconds = value;
        }
        if let Some(value) = env_parse::<usize>(env, "LOGSIFT_TOPK") {
            self.top_k = value;
        }
        if let Some(value) = env.get("LOGSIFT_EXTENSION") {
            self.extension = value.trim_start_matches('.').to_owned();
        }
    }

    fn apply_cli(&mut self, cli: &CliInput) {
        if let Some(path) = &cli.watch_path {
            self.watch_path = path.clone();
        }
        if let Some(workers) = cli.workers {
            self.workers = workers;
        }
        if let Some(capacity) = cli.queue_capacity {
            self.queue_capacity = capacity;
        }
        if let Some(interval) = cli.report_interval_seconds {
            self.report_interval_seconds = interval;
        }
        if let Some(top_k) = cli.top_k {
            self.top_k = top_k;
        }
        if let Some(extension) = &cli.extension {
            self.extension = extension.trim_start_matches('.').to_owned();
        }
    }

    /// Validates the resolved configuration.
    ///
    /// # Errors
    ///
    /// Returns an error naming the offending field.
    pub fn validate(&self) -> SiftResult<()> {
        if !self.watch_path.is_dir() {
            return Err(SiftError::WatchPathUnavailable {
                path: self.watch_path.clone(),
            });
        }
        for (field, value) in [
            ("workers", self.workers),
            ("queue_capacity", self.queue_capacity),
            ("topk", self.top_k),
        ] {
            if value < 1 {
                return Err(SiftError::InvalidConfig {
                    field: field.to_owned(),
                    value: value.to_string(),
                    reason: "must be at least 1".to_owned(),
                });
            }
        }
        if self.report_interval_seconds < 1 {
            return Err(SiftError::InvalidConfig {
                field: "report_interval_seconds".to_owned(),
                value: self.report_interval_seconds.to_string(),
                reason: "must be at least 1".to_owned(),
            });
        }
        if self.extension.is_empty() {
            return Err(SiftError::InvalidConfig {
                field: "extension".to_owned(),
                value: String::new(),
                reason: "must name a file extension".to_owned(),
            });
        }
        Ok(())
    }

    #[must_use]
    pub const fn report_interval(&self) -> Duration {
        Duration::from_secs(self.report_interval_seconds)
    }

    /// One-line startup summary for stdout.
    #[must_use]
    pub fn startup_line(&self) -> String {
        format!(
            "[logsift] watching {} workers={} queue_capacity={} report_interval={}s topk={} extension={}",
            self.watch_path.display(),
            self.workers,
            self.queue_capacity,
            self.report_interval_seconds,
            self.top_k,
            self.extension,
        )
    }
}

fn env_parse<T: std::str::FromStr>(env: &HashMap<String, String>, key: &str) -> Option<T> {
    let raw = env.get(key)?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "ignoring unparseable environment override");
            None
        }
    }
}
