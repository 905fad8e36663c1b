use std::path::PathBuf;

/// Unified error type for failures that must stop the pipeline or the host.
///
/// Transient per-file conditions (missing file, access denied, truncation)
/// are deliberately NOT represented here: they are encoded in
/// [`crate::types::TailStatus`] and surfaced as counters so that processing
/// continues. `SiftError` covers the cases the host must act on:
/// configuration rejection (exit code 2) and subsystem startup failures
/// (exit code 1).
#[derive(Debug, thiserror::Error)]
pub enum SiftError {
    /// A configuration value is invalid.
    #[error("Invalid config: {field} = \"{value}\" — {reason}")]
    InvalidConfig {
        /// Which config field.
        field: String,
        /// The invalid value.
        value: String,
        /// Why it is invalid.
        reason: String,
    },

    /// The watch path does not exist or is not a directory.
    #[error("Watch path {path} is not a readable directory. Pass an existing directory to watch.")]
    WatchPathUnavailable {
        /// The rejected path.
        path: PathBuf,
    },

    /// Wraps `std::io::Error` for host-level file operations.
    #[error("I/O error: {0}. Check file permissions and disk space.")]
    Io(#[from] std::io::Error),

    /// Wraps errors from background subsystems (watcher backend, thread
    /// spawning, signal registration).
    #[error("{subsystem} error: {source}")]
    SubsystemError {
        /// Which subsystem produced the error (e.g., "watcher", "coordinator").
        subsystem: &'static str,
        /// The underlying error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Convenience alias used throughout the logsift crate hierarchy.
pub type SiftResult<T> = Result<T, SiftError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SiftError>();
    }

    #[test]
    fn io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let sift_err: SiftError = io_err.into();
        assert!(matches!(sift_err, SiftError::Io(_)));
        assert!(sift_err.to_string().contains("gone"));
    }

    #[test]
    fn invalid_config_display() {
        let err = SiftError::InvalidConfig {
            field: "queue_capacity".into(),
            value: "0".into(),
            reason: "must be at least 1".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("queue_capacity"));
        assert!(msg.contains('0'));
        assert!(msg.contains("at least 1"));
    }

    #[test]
    fn watch_path_unavailable_display() {
        let err = SiftError::WatchPathUnavailable {
            path: PathBuf::from("/var/log/missing"),
        };
        let msg = err.to_string();
        assert!(msg.contains("/var/log/missing"));
        assert!(msg.contains("directory"));
    }

    #[test]
    fn subsystem_error_wraps_arbitrary_errors() {
        let inner = std::io::Error::other("inotify limit reached");
        let err = SiftError::SubsystemError {
            subsystem: "watcher",
            source: Box::new(inner),
        };
        assert!(err.to_string().contains("watcher"));
        assert!(err.to_string().contains("inotify limit reached"));
        assert!(err.source().is_some());
    }
}
