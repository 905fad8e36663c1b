//! Fixed-bin latency statistics and exact top-K ranking.
//!
//! The histogram trades generality for determinism: one bin per integer
//! millisecond from 0 to 10,000 plus a single overflow bin, so merges are
//! elementwise adds and percentile queries are exact (no interpolation, no
//! estimation error at the tail).

use std::collections::HashMap;

/// Total bin count: 0..=10,000 ms plus the overflow bin.
pub const HISTOGRAM_BINS: usize = 10_002;

/// Sentinel bin index for latencies strictly greater than 10,000 ms.
pub const OVERFLOW_BIN: u32 = 10_001;

/// Fixed-bin latency histogram supporting add, elementwise merge, and exact
/// percentile queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LatencyHistogram {
    bins: Vec<u64>,
    count: u64,
}

impl Default for LatencyHistogram {
    fn default() -> Self {
        Self::new()
    }
}

impl LatencyHistogram {
    #[must_use]
    pub fn new() -> Self {
        Self {
            bins: vec![0; HISTOGRAM_BINS],
            count: 0,
        }
    }

    /// Records one observation. Negative values clamp to bin 0; values above
    /// 10,000 land in the overflow bin.
    pub fn add(&mut self, latency_ms: i32) {
        let bin = if latency_ms < 0 {
            0
        } else {
            usize::try_from(latency_ms).unwrap_or(HISTOGRAM_BINS).min(OVERFLOW_BIN as usize)
        };
        self.bins[bin] += 1;
        self.count += 1;
    }

    /// Elementwise add of `other` into `self`.
    pub fn merge_from(&mut self, other: &Self) {
        for (dst, src) in self.bins.iter_mut().zip(&other.bins) {
            *dst += src;
        }
        self.count += other.count;
    }

    /// Exact percentile for `p` in `[0, 1]`: the first bin index whose
    /// cumulative count reaches `ceil(p × count)` (clamped to `[1, count]`).
    /// Returns `None` when the histogram is empty; [`OVERFLOW_BIN`] encodes
    /// latencies beyond the last bin.
    #[must_use]
    pub fn percentile(&self, p: f64) -> Option<u32> {
        if self.count == 0 {
            return None;
        }
        #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let target = ((p * self.count as f64).ceil() as u64).clamp(1, self.count);
        let mut cumulative = 0_u64;
        for (index, &bin) in self.bins.iter().enumerate() {
            cumulative += bin;
            if cumulative >= target {
                return u32::try_from(index).ok();
            }
        }
        Some(OVERFLOW_BIN)
    }

    #[must_use]
    pub const fn count(&self) -> u64 {
        self.count
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Zeroes every bin without releasing the allocation.
    pub fn reset(&mut self) {
        self.bins.fill(0);
        self.count = 0;
    }
}

/// Exact top-K over a key→count map: count descending, ties broken by key
/// bytes lexicographically ascending.
#[must_use]
pub fn top_k(counts: &HashMap<Vec<u8>, u32>, k: usize) -> Vec<(Vec<u8>, u32)> {
    let mut ranked: Vec<(Vec<u8>, u32)> = counts
        .iter()
        .map(|(key, &count)| (key.clone(), count))
        .collect();
    ranked.sort_unstable_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(k);
    ranked
}
