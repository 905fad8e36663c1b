//! Hand-rolled CLI argument parsing for the `logsift` binary.

use std::path::PathBuf;

use logsift_core::{SiftError, SiftResult};

// ─── Exit Codes ──────────────────────────────────────────────────────────────

/// Standardized exit codes for the logsift CLI.
pub mod exit_code {
    /// Success.
    pub const OK: i32 = 0;
    /// Runtime error (subsystem startup, watcher backend).
    pub const RUNTIME_ERROR: i32 = 1;
    /// Usage error (invalid args, bad configuration).
    pub const USAGE_ERROR: i32 = 2;
    /// Interrupted by a forced signal exit.
    pub const INTERRUPTED: i32 = 130;
}

/// Parsed command-line input; `None` fields fall back to env/defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliInput {
    pub watch_path: Option<PathBuf>,
    pub workers: Option<usize>,
    pub queue_capacity: Option<usize>,
    pub report_interval_seconds: Option<u64>,
    pub top_k: Option<usize>,
    pub extension: Option<String>,
    pub verbose: bool,
    pub quiet: bool,
    pub no_color: bool,
    pub show_help: bool,
    pub show_version: bool,
}

/// Usage text printed for `--help` and usage errors.
pub const USAGE: &str = "\
usage: logsift <watch_path> [options]

Watches a directory of append-only log files and prints aggregated
statistics to stdout each report interval.

options:
  --workers <n>                   worker pool size (default: CPU count)
  --queue-capacity <n>            event bus capacity (default: 10000)
  --report-interval-seconds <n>   seconds between reports (default: 2)
  --topk <n>                      ranked message keys per report (default: 10)
  --extension <ext>               processable file extension (default: log)
  -v, --verbose                   debug-level diagnostics on stderr
  -q, --quiet                     errors only on stderr
  --no-color                      disable ANSI colors on stderr
  -h, --help                      show this help
  --version                       show version
";

/// Parses raw arguments (without the program name).
///
/// # Errors
///
/// Returns [`SiftError::InvalidConfig`] on unknown flags, missing or
/// unparseable values, and surplus positionals.
pub fn parse_cli_args<I, S>(args: I) -> SiftResult<CliInput>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut input = CliInput::default();
    let mut iter = args.into_iter().map(Into::into);

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--workers" => input.workers = Some(parse_count(&arg, iter.next())?),
            "--queue-capacity" => input.queue_capacity = Some(parse_count(&arg, iter.next())?),
            "--report-interval-seconds" => {
                input.report_interval_seconds = Some(parse_count(&arg, iter.next())?);
            }
            "--topk" => input.top_k = Some(parse_count(&arg, iter.next())?),
            "--extension" => {
                input.extension = Some(require_value(&arg, iter.next())?);
            }
            "-v" | "--verbose" => input.verbose = true,
            "-q" | "--quiet" => input.quiet = true,
            "--no-color" => input.no_color = true,
            "-h" | "--help" => input.show_help = true,
            "--version" => input.show_version = true,
            flag if flag.starts_with('-') => {
                return Err(SiftError::InvalidConfig {
                    field: flag.to_owned(),
                    value: String::new(),
                    reason: "unknown flag".to_owned(),
                });
            }
            positional => {
                if input.watch_path.is_some() {
                    return Err(SiftError::InvalidConfig {
                        field: "watch_path".to_owned(),
                        value: positional.to_owned(),
                        reason: "only one watch path may be given".to_owned(),
                    });
                }
                input.watch_path = Some(PathBuf::from(positional));
            }
        }
    }

    Ok(input)
}

fn require_value(flag: &str, value: Option<String>) -> SiftResult<String> {
    value.ok_or_else(|| SiftError::InvalidConfig {
        field: flag.to_owned(),
        value: String::new(),
        reason: "missing value".to_owned(),
    })
}

fn parse_count<T>(flag: &str, value: Option<String>) -> SiftResult<T>
where
    T: std::str::FromStr + PartialOrd + From<u8>,
{
    let raw = require_value(flag, value)?;
    let parsed: T = raw.parse().map_err(|_| SiftError::InvalidConfig {
        field: flag.to_owned(),
        value: raw.clone(),
        reason: "must be an integer".to_owned(),
    })?;
    if parsed < T::from(1) {
        return Err(SiftError::InvalidConfig {
            field: flag.to_owned(),
            value: raw,
            reason: "must be at least 1".to_owned(),
        });
    }
    Ok(parsed)
}
