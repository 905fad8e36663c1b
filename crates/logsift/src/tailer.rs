//! Incremental file tailer: reads bytes appended past a stored offset.
//!
//! Reads happen in fixed 64 KiB chunks through a pooled buffer that is
//! returned on every exit path, including panics in the sink. Truncation
//! (file length below the stored offset) resets the effective offset to 0
//! and is reported to the sink before any chunk so the caller can discard a
//! stale carry.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use logsift_core::TailStatus;
use tracing::debug;

/// Fixed read chunk size.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Result of one tail pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TailOutcome {
    pub status: TailStatus,
    pub bytes_read: u64,
}

impl TailOutcome {
    const fn empty(status: TailStatus) -> Self {
        Self {
            status,
            bytes_read: 0,
        }
    }
}

/// Receiver for tailer output.
///
/// `truncated` fires at most once, before any `chunk` call, when the file
/// shrank below the stored offset. The slice passed to `chunk` is valid only
/// for the duration of the call.
pub trait TailSink {
    fn truncated(&mut self) {}
    fn chunk(&mut self, data: &[u8]);
}

/// Adapter turning a chunk closure into a sink that ignores truncation;
/// handy in tests.
pub struct ChunkFn<F>(pub F);

impl<F: FnMut(&[u8])> TailSink for ChunkFn<F> {
    fn chunk(&mut self, data: &[u8]) {
        (self.0)(data);
    }
}

/// Seam between the file processor and the filesystem; lets tests drive the
/// pipeline with in-memory tailers.
pub trait FileTailer: Send + Sync {
    /// Reads bytes appended past `*offset`, delivering them to `sink`.
    ///
    /// On return `*offset` covers every byte delivered (and is 0-based anew
    /// after a truncation reset); it is left untouched when nothing was
    /// consumed and no truncation occurred.
    fn read_appended(&self, path: &Path, offset: &mut u64, sink: &mut dyn TailSink) -> TailOutcome;
}

/// Production tailer over `std::fs` with a pooled chunk buffer.
#[derive(Default)]
pub struct FsTailer {
    pool: BufferPool,
}

impl FsTailer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl FileTailer for FsTailer {
    fn read_appended(&self, path: &Path, offset: &mut u64, sink: &mut dyn TailSink) -> TailOutcome {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(error) => return TailOutcome::empty(map_io_error(&error)),
        };
        let length = match file.metadata() {
            Ok(metadata) => metadata.len(),
            Err(error) => return TailOutcome::empty(map_io_error(&error)),
        };

        let mut truncated = false;
        let mut effective_offset = *offset;
        if length < effective_offset {
            debug!(
                path = %path.display(),
                stored_offset = effective_offset,
                length,
                "file shrank below stored offset; resetting to start"
            );
            truncated = true;
            effective_offset = 0;
            sink.truncated();
        }

        if effective_offset >= length {
            if truncated {
                *offset = 0;
                return TailOutcome::empty(TailStatus::TruncatedReset);
            }
            return TailOutcome::empty(TailStatus::NoData);
        }

        let mut file = file;
        if let Err(error) = file.seek(SeekFrom::Start(effective_offset)) {
            return TailOutcome::empty(map_io_error(&error));
        }

        let mut buffer = self.pool.acquire();
        let mut total_read = 0_u64;
        let status = loop {
            match file.read(buffer.as_mut_slice()) {
                Ok(0) => {
                    break if truncated {
                        TailStatus::TruncatedReset
                    } else if total_read > 0 {
                        TailStatus::ReadSome
                    } else {
                        TailStatus::NoData
                    };
                }
                Ok(n) => {
                    sink.chunk(&buffer.as_slice()[..n]);
                    total_read += n as u64;
                }
                Err(error) if error.kind() == std::io::ErrorKind::Interrupted => {}
                Err(error) => break map_io_error(&error),
            }
        };

        // Bytes already delivered to the sink are consumed even when the
        // read loop ended in an error; never re-deliver them.
        if total_read > 0 || truncated {
            *offset = effective_offset + total_read;
        }
        TailOutcome {
            status,
            bytes_read: total_read,
        }
    }
}

fn map_io_error(error: &std::io::Error) -> TailStatus {
    match error.kind() {
        std::io::ErrorKind::NotFound => TailStatus::FileNotFound,
        std::io::ErrorKind::PermissionDenied => TailStatus::AccessDenied,
        _ => TailStatus::IoError,
    }
}

/// Pool of chunk buffers shared across workers.
#[derive(Default)]
struct BufferPool {
    buffers: Mutex<Vec<Vec<u8>>>,
}

impl BufferPool {
    fn acquire(&self) -> PooledBuffer<'_> {
        let buffer = lock_or_recover(&self.buffers)
            .pop()
            .unwrap_or_else(|| vec![0; CHUNK_SIZE]);
        PooledBuffer { pool: self, buffer }
    }
}

/// RAII handle returning its buffer to the pool on drop, on every exit path.
struct PooledBuffer<'a> {
    pool: &'a BufferPool,
    buffer: Vec<u8>,
}

impl PooledBuffer<'_> {
    fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.buffer
    }
}

impl Drop for PooledBuffer<'_> {
    fn drop(&mut self) {
        lock_or_recover(&self.pool.buffers).push(std::mem::take(&mut self.buffer));
    }
}

fn lock_or_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
