//! Drives one tail→scan→parse→accumulate pass for a single file.
//!
//! Callers must hold the file's gate and have verified that no delete is
//! pending; the processor itself is oblivious to the registry.

use std::path::Path;
use std::sync::Arc;

use logsift_core::types::TailStatus;
use logsift_core::{parse_line, scan};

use crate::registry::TailCursor;
use crate::stats::WorkerStatsBuffer;
use crate::tailer::{FileTailer, TailSink};

/// Stateless orchestrator shared by all workers.
pub struct FileProcessor {
    tailer: Arc<dyn FileTailer>,
}

impl FileProcessor {
    #[must_use]
    pub fn new(tailer: Arc<dyn FileTailer>) -> Self {
        Self { tailer }
    }

    /// One catch-up pass over `path`.
    ///
    /// Reads appended bytes, splits them into lines through the cursor's
    /// carry, parses each line into `stats`, maps the tail status onto its
    /// counter, and commits the advanced offset when bytes were consumed or
    /// a truncation reset occurred.
    pub fn process_once(
        &self,
        path: &Path,
        cursor: &mut TailCursor,
        stats: &mut WorkerStatsBuffer,
    ) -> TailStatus {
        let TailCursor { offset, carry } = cursor;
        let mut local_offset = *offset;
        let mut sink = LineSink {
            carry,
            stats: &mut *stats,
        };
        let outcome = self
            .tailer
            .read_appended(path, &mut local_offset, &mut sink);

        stats.record_tail_status(outcome.status);
        if outcome.bytes_read > 0 || outcome.status == TailStatus::TruncatedReset {
            *offset = local_offset;
        }
        outcome.status
    }
}

/// Splits tailer chunks into lines and accumulates parse results.
struct LineSink<'a> {
    carry: &'a mut Vec<u8>,
    stats: &'a mut WorkerStatsBuffer,
}

impl TailSink for LineSink<'_> {
    fn truncated(&mut self) {
        // Whatever partial line was carried belongs to the overwritten
        // content; parsing it against the fresh bytes would fabricate a
        // record that never existed.
        self.carry.clear();
    }

    fn chunk(&mut self, data: &[u8]) {
        let stats = &mut *self.stats;
        scan(data, self.carry, &mut |line| {
            stats.lines_processed += 1;
            match parse_line(line) {
                Some(parsed) => {
                    stats.record_parsed(parsed.level, parsed.message_key, parsed.latency_ms);
                }
                None => stats.malformed_lines += 1,
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::FileProcessor;
    use crate::registry::TailCursor;
    use crate::stats::WorkerStatsBuffer;
    use crate::tailer::{FileTailer, TailOutcome, TailSink};
    use logsift_core::types::{LogLevel, TailStatus};
    use std::path::Path;
    use std::sync::{Arc, Mutex};

    /// In-memory tailer: replays scripted passes without touching the disk.
    struct ScriptedTailer {
        passes: Mutex<Vec<ScriptedPass>>,
    }

    struct ScriptedPass {
        chunks: Vec<Vec<u8>>,
        status: TailStatus,
        truncates: bool,
    }

    impl ScriptedTailer {
        fn new(passes: Vec<ScriptedPass>) -> Self {
            Self {
                passes: Mutex::new(passes),
            }
        }
    }

    impl FileTailer for ScriptedTailer {
        fn read_appended(
            &self,
            _path: &Path,
            offset: &mut u64,
            sink: &mut dyn TailSink,
        ) -> TailOutcome {
            let mut passes = self.passes.lock().expect("scripted passes");
            if passes.is_empty() {
                return TailOutcome {
                    status: TailStatus::NoData,
                    bytes_read: 0,
                };
            }
            let pass = passes.remove(0);
            if pass.truncates {
                *offset = 0;
                sink.truncated();
            }
            let mut total = 0_u64;
            for chunk in &pass.chunks {
                sink.chunk(chunk);
                total += chunk.len() as u64;
            }
            if total > 0 || pass.truncates {
                *offset += total;
            }
            TailOutcome {
                status: pass.status,
                bytes_read: total,
            }
        }
    }

    #[test]
    fn accumulates_parsed_lines_and_advances_offset() {
        let tailer = ScriptedTailer::new(vec![ScriptedPass {
            chunks: vec![
                b"2024-01-15T10:30:02Z INFO Alpha latency_ms=5\n".to_vec(),
                b"2024-01-15T10:30:03Z ERROR Beta\nnot a record\n".to_vec(),
            ],
            status: TailStatus::ReadSome,
            truncates: false,
        }]);
        let processor = FileProcessor::new(Arc::new(tailer));
        let mut cursor = TailCursor::default();
        let mut stats = WorkerStatsBuffer::new();

        let status = processor.process_once(Path::new("/logs/a.log"), &mut cursor, &mut stats);
        assert_eq!(status, TailStatus::ReadSome);
        assert_eq!(stats.lines_processed, 3);
        assert_eq!(stats.malformed_lines, 1);
        assert_eq!(stats.level_counts[LogLevel::Info.index()], 1);
        assert_eq!(stats.level_counts[LogLevel::Error.index()], 1);
        assert_eq!(stats.message_counts.get(&b"Alpha".to_vec()), Some(&1));
        assert_eq!(stats.histogram.count(), 1);
        assert!(cursor.offset > 0);
        assert!(cursor.carry.is_empty());
    }

    #[test]
    fn partial_line_spans_two_passes() {
        let tailer = ScriptedTailer::new(vec![
            ScriptedPass {
                chunks: vec![b"2024-01-15T10:30:02Z INFO Spl".to_vec()],
                status: TailStatus::ReadSome,
                truncates: false,
            },
            ScriptedPass {
                chunks: vec![b"itKey done\n".to_vec()],
                status: TailStatus::ReadSome,
                truncates: false,
            },
        ]);
        let processor = FileProcessor::new(Arc::new(tailer));
        let mut cursor = TailCursor::default();
        let mut stats = WorkerStatsBuffer::new();
        let path = Path::new("/logs/a.log");

        processor.process_once(path, &mut cursor, &mut stats);
        assert_eq!(stats.lines_processed, 0);
        assert!(!cursor.carry.is_empty());

        processor.process_once(path, &mut cursor, &mut stats);
        assert_eq!(stats.lines_processed, 1);
        assert_eq!(stats.message_counts.get(&b"SplitKey".to_vec()), Some(&1));
        assert!(cursor.carry.is_empty());
    }

    #[test]
    fn truncation_discards_stale_carry_and_counts_reset() {
        let tailer = ScriptedTailer::new(vec![
            ScriptedPass {
                chunks: vec![b"2024-01-15T10:30:02Z INFO Stale".to_vec()],
                status: TailStatus::ReadSome,
                truncates: false,
            },
            ScriptedPass {
                chunks: vec![b"2024-01-15T10:30:05Z WARN Fresh\n".to_vec()],
                status: TailStatus::TruncatedReset,
                truncates: true,
            },
        ]);
        let processor = FileProcessor::new(Arc::new(tailer));
        let mut cursor = TailCursor::default();
        let mut stats = WorkerStatsBuffer::new();
        let path = Path::new("/logs/a.log");

        processor.process_once(path, &mut cursor, &mut stats);
        assert!(!cursor.carry.is_empty());

        let status = processor.process_once(path, &mut cursor, &mut stats);
        assert_eq!(status, TailStatus::TruncatedReset);
        assert_eq!(stats.truncation_reset, 1);
        assert_eq!(stats.lines_processed, 1);
        assert_eq!(stats.message_counts.get(&b"Fresh".to_vec()), Some(&1));
        assert!(
            stats.message_counts.get(&b"Stale".to_vec()).is_none(),
            "stale carry must not leak into post-truncation lines"
        );
        // Offset restarts from zero and covers only the fresh bytes.
        assert_eq!(cursor.offset, 32);
        assert!(cursor.carry.is_empty());
    }

    #[test]
    fn error_statuses_map_to_counters_without_moving_offset() {
        for (status, check) in [
            (
                TailStatus::FileNotFound,
                (|s: &WorkerStatsBuffer| s.file_not_found) as fn(&WorkerStatsBuffer) -> u64,
            ),
            (TailStatus::AccessDenied, |s| s.access_denied),
            (TailStatus::IoError, |s| s.io_exception),
        ] {
            let tailer = ScriptedTailer::new(vec![ScriptedPass {
                chunks: Vec::new(),
                status,
                truncates: false,
            }]);
            let processor = FileProcessor::new(Arc::new(tailer));
            let mut cursor = TailCursor {
                offset: 42,
                carry: Vec::new(),
            };
            let mut stats = WorkerStatsBuffer::new();
            processor.process_once(Path::new("/logs/a.log"), &mut cursor, &mut stats);
            assert_eq!(check(&stats), 1);
            assert_eq!(cursor.offset, 42, "offset untouched on {status:?}");
        }
    }
}
