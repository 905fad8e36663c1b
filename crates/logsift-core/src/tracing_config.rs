//! Tracing conventions shared across the logsift workspace.
//!
//! Consumers may bring their own subscriber; the `logsift` binary wires one
//! up in its `tracing_setup` module. The constants here keep target and
//! field naming consistent so logs stay filterable:
//!
//! ```text
//! RUST_LOG=logsift=debug
//! ```

/// Target prefix used by all logsift tracing spans and events.
pub const TARGET_PREFIX: &str = "logsift";

/// Standard structured field names used in tracing events.
pub mod field_names {
    /// Absolute path of the file an event refers to.
    pub const PATH: &str = "path";
    /// Byte offset into a tailed file.
    pub const OFFSET: &str = "offset";
    /// Worker index within the pool.
    pub const WORKER: &str = "worker";
    /// Count of items affected by the operation.
    pub const COUNT: &str = "count";
}
