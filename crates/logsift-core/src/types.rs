use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Filesystem events
// ---------------------------------------------------------------------------

/// Event kind published by the directory watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FsEventKind {
    Created,
    Modified,
    Deleted,
    Renamed,
}

/// One normalized filesystem change event.
///
/// Immutable once published onto the bus. `processable` is decided at the
/// watcher boundary (extension policy) so workers never re-stat paths just
/// to route an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsEvent {
    pub kind: FsEventKind,
    pub path: PathBuf,
    /// Prior path, present only for [`FsEventKind::Renamed`].
    pub old_path: Option<PathBuf>,
    pub observed_at_ms: u64,
    /// True iff `path` matches the configured extension policy.
    pub processable: bool,
}

impl FsEvent {
    #[must_use]
    pub fn created(path: impl Into<PathBuf>, observed_at_ms: u64, processable: bool) -> Self {
        Self {
            kind: FsEventKind::Created,
            path: path.into(),
            old_path: None,
            observed_at_ms,
            processable,
        }
    }

    #[must_use]
    pub fn modified(path: impl Into<PathBuf>, observed_at_ms: u64, processable: bool) -> Self {
        Self {
            kind: FsEventKind::Modified,
            path: path.into(),
            old_path: None,
            observed_at_ms,
            processable,
        }
    }

    #[must_use]
    pub fn deleted(path: impl Into<PathBuf>, observed_at_ms: u64) -> Self {
        Self {
            kind: FsEventKind::Deleted,
            path: path.into(),
            old_path: None,
            observed_at_ms,
            processable: false,
        }
    }

    #[must_use]
    pub fn renamed(
        old_path: impl Into<PathBuf>,
        new_path: impl Into<PathBuf>,
        observed_at_ms: u64,
        processable: bool,
    ) -> Self {
        Self {
            kind: FsEventKind::Renamed,
            path: new_path.into(),
            old_path: Some(old_path.into()),
            observed_at_ms,
            processable,
        }
    }
}

/// Milliseconds since the Unix epoch, saturating on clock skew.
#[must_use]
pub fn now_millis() -> u64 {
    let duration = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

// ---------------------------------------------------------------------------
// Log levels
// ---------------------------------------------------------------------------

/// Severity parsed from a log record's level token.
///
/// Unrecognized, empty, or missing tokens map to [`LogLevel::Other`]; an
/// unknown level never marks a line malformed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
    Debug,
    Other,
}

impl LogLevel {
    /// Number of variants; sizes the per-level counter array.
    pub const COUNT: usize = 5;

    /// Case-insensitive ASCII match on the level token.
    #[must_use]
    pub fn from_token(token: &[u8]) -> Self {
        if token.eq_ignore_ascii_case(b"INFO") {
            Self::Info
        } else if token.eq_ignore_ascii_case(b"WARN") {
            Self::Warn
        } else if token.eq_ignore_ascii_case(b"ERROR") {
            Self::Error
        } else if token.eq_ignore_ascii_case(b"DEBUG") {
            Self::Debug
        } else {
            Self::Other
        }
    }

    /// Stable index into a `[u64; LogLevel::COUNT]` counter array.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Info => 0,
            Self::Warn => 1,
            Self::Error => 2,
            Self::Debug => 3,
            Self::Other => 4,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
            Self::Debug => "debug",
            Self::Other => "other",
        }
    }
}

// ---------------------------------------------------------------------------
// Tail status
// ---------------------------------------------------------------------------

/// Outcome of one tailer pass over a file.
///
/// Error-shaped variants are counters, not failures: the pipeline keeps
/// running and the reporter surfaces them per interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TailStatus {
    /// Nothing new past the current offset.
    NoData,
    /// At least one byte was read and delivered.
    ReadSome,
    /// The file (or its directory) no longer exists.
    FileNotFound,
    /// The file exists but cannot be opened for reading.
    AccessDenied,
    /// Any other IO failure while opening, seeking, or reading.
    IoError,
    /// The file shrank below the stored offset; the offset was reset to 0.
    TruncatedReset,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_token_matching_is_case_insensitive() {
        assert_eq!(LogLevel::from_token(b"INFO"), LogLevel::Info);
        assert_eq!(LogLevel::from_token(b"info"), LogLevel::Info);
        assert_eq!(LogLevel::from_token(b"Warn"), LogLevel::Warn);
        assert_eq!(LogLevel::from_token(b"ERROR"), LogLevel::Error);
        assert_eq!(LogLevel::from_token(b"dEbUg"), LogLevel::Debug);
    }

    #[test]
    fn unknown_and_empty_level_tokens_map_to_other() {
        assert_eq!(LogLevel::from_token(b"TRACE"), LogLevel::Other);
        assert_eq!(LogLevel::from_token(b"FATAL"), LogLevel::Other);
        assert_eq!(LogLevel::from_token(b""), LogLevel::Other);
    }

    #[test]
    fn level_indices_are_distinct_and_in_range() {
        let levels = [
            LogLevel::Info,
            LogLevel::Warn,
            LogLevel::Error,
            LogLevel::Debug,
            LogLevel::Other,
        ];
        let mut seen = [false; LogLevel::COUNT];
        for level in levels {
            let idx = level.index();
            assert!(idx < LogLevel::COUNT);
            assert!(!seen[idx], "duplicate index {idx}");
            seen[idx] = true;
        }
    }

    #[test]
    fn renamed_event_carries_both_paths() {
        let event = FsEvent::renamed("/logs/a.log", "/logs/b.log", 1_000, true);
        assert_eq!(event.kind, FsEventKind::Renamed);
        assert_eq!(event.path, PathBuf::from("/logs/b.log"));
        assert_eq!(event.old_path, Some(PathBuf::from("/logs/a.log")));
        assert!(event.processable);
    }

    #[test]
    fn deleted_event_is_never_processable() {
        let event = FsEvent::deleted("/logs/a.log", 42);
        assert!(!event.processable);
        assert_eq!(event.old_path, None);
    }
}
