//! Append-only in-memory log of timestamped samples.
//!
//! `SampleBuffer` is the single shared resource between the acquisition
//! thread and its consumers. The concurrency contract is single-writer /
//! multi-reader: only the acquisition loop appends, while the UI snapshot
//! and the persistence flush take read views. Sharing happens through
//! [`SharedBuffer`] (`Arc<RwLock<_>>`), which makes every append atomic with
//! respect to snapshot reads — a reader can never observe a partially
//! constructed last element.
//!
//! The buffer also owns the derived `unsaved` counter: incremented on every
//! append, reset by `mark_saved` after a successful flush.

use chrono::{DateTime, Local};
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// One timestamped, parsed reading from the balance. Immutable once created.
#[derive(Clone, Debug)]
pub struct Sample {
    /// Wall-clock time the reading arrived.
    pub timestamp: DateTime<Local>,
    /// Seconds since the session start; the x-axis for trend statistics.
    pub elapsed_secs: f64,
    /// Parsed mass value.
    pub value: f64,
}

/// Summary statistics over the whole buffer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aggregate {
    /// Number of samples.
    pub count: usize,
    /// Smallest value seen.
    pub min: f64,
    /// Largest value seen.
    pub max: f64,
    /// Arithmetic mean.
    pub mean: f64,
}

/// Ordered, append-only sample log for one session.
#[derive(Debug, Default)]
pub struct SampleBuffer {
    samples: Vec<Sample>,
    unsaved: usize,
}

/// Buffer handle shared between the acquisition thread and readers.
pub type SharedBuffer = Arc<RwLock<SampleBuffer>>;

/// Create an empty shared buffer.
pub fn shared() -> SharedBuffer {
    Arc::new(RwLock::new(SampleBuffer::default()))
}

impl SampleBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one sample and bump the unsaved counter.
    ///
    /// Returns the new sample so the caller can hand it to chart/stats
    /// consumers without re-reading the buffer.
    pub fn append(&mut self, value: f64, timestamp: DateTime<Local>, elapsed_secs: f64) -> Sample {
        let sample = Sample {
            timestamp,
            elapsed_secs,
            value,
        };
        self.samples.push(sample.clone());
        self.unsaved += 1;
        sample
    }

    /// Clear all samples and counters. Called only at session start.
    pub fn reset(&mut self) {
        self.samples.clear();
        self.unsaved = 0;
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the buffer holds no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Samples appended since the last successful flush.
    pub fn unsaved_count(&self) -> usize {
        self.unsaved
    }

    /// Mark the current contents as persisted.
    pub fn mark_saved(&mut self) {
        self.unsaved = 0;
    }

    /// Most recent sample, if any.
    pub fn latest(&self) -> Option<Sample> {
        self.samples.last().cloned()
    }

    /// Owned copy of the current contents, in arrival order.
    pub fn snapshot(&self) -> Vec<Sample> {
        self.samples.clone()
    }

    /// Summary statistics, or `None` while the buffer is empty.
    pub fn aggregate(&self) -> Option<Aggregate> {
        if self.samples.is_empty() {
            return None;
        }
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut sum = 0.0;
        for sample in &self.samples {
            min = min.min(sample.value);
            max = max.max(sample.value);
            sum += sample.value;
        }
        let count = self.samples.len();
        Some(Aggregate {
            count,
            min,
            max,
            mean: sum / count as f64,
        })
    }

    /// Linear trend of value over elapsed time within the trailing `window`,
    /// expressed per minute.
    ///
    /// Computed as the least-squares slope over every sample whose elapsed
    /// time falls inside the window. Requires at least two in-window points
    /// with a non-degenerate time spread, otherwise `None`. When the
    /// regression denominator is degenerate the slope falls back to the
    /// simple two-point (first, last) estimate; neither path can panic.
    pub fn recent_slope(&self, window: Duration) -> Option<f64> {
        let last = self.samples.last()?;
        let cutoff = last.elapsed_secs - window.as_secs_f64();
        let in_window: Vec<&Sample> = self
            .samples
            .iter()
            .filter(|s| s.elapsed_secs >= cutoff)
            .collect();
        if in_window.len() < 2 {
            return None;
        }

        let mut t_min = f64::INFINITY;
        let mut t_max = f64::NEG_INFINITY;
        for s in &in_window {
            t_min = t_min.min(s.elapsed_secs);
            t_max = t_max.max(s.elapsed_secs);
        }
        let spread = t_max - t_min;
        if spread <= 0.0 {
            return None;
        }

        let n = in_window.len() as f64;
        let mut sum_t = 0.0;
        let mut sum_v = 0.0;
        let mut sum_tv = 0.0;
        let mut sum_tt = 0.0;
        for s in &in_window {
            sum_t += s.elapsed_secs;
            sum_v += s.value;
            sum_tv += s.elapsed_secs * s.value;
            sum_tt += s.elapsed_secs * s.elapsed_secs;
        }
        let denominator = n * sum_tt - sum_t * sum_t;
        let per_second = if denominator.abs() > f64::EPSILON {
            (n * sum_tv - sum_t * sum_v) / denominator
        } else {
            // Two-point fallback; spread > 0 was checked above.
            let first = in_window[0];
            (last.value - first.value) / (last.elapsed_secs - first.elapsed_secs)
        };
        Some(per_second * 60.0)
    }
}
