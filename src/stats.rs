// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 rmseq contributors
//
// Fixed-capacity ring of timing samples. One ring per measured quantity
// (release error, execution time, tick error), written by exactly one thread
// and summarized after the workers have been joined.

/// A fixed-capacity ring of millisecond samples with an O(1) running mean.
///
/// The ring never reallocates after construction, so `add` is safe to call
/// from a period-critical path. Summary queries (`max_ms`, `min_ms`,
/// `percentile_ms`, `completed_within`) scan or copy and are meant for the
/// post-run statistics dump.
#[derive(Clone, Debug)]
pub struct StatTracker {
    ring: Vec<f64>,
    head: usize,
    filled: usize,
    sum: f64,
}

impl StatTracker {
    /// Create a tracker holding up to `capacity` samples.
    ///
    /// # Panics
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "stat ring capacity must be non-zero");
        Self {
            ring: vec![0.0; capacity],
            head: 0,
            filled: 0,
            sum: 0.0,
        }
    }

    /// Record one sample, evicting the oldest when the ring is full. O(1).
    pub fn add(&mut self, sample_ms: f64) {
        let evicted = self.ring[self.head];
        self.ring[self.head] = sample_ms;
        self.head = (self.head + 1) % self.ring.len();
        self.sum += sample_ms;
        if self.filled < self.ring.len() {
            self.filled += 1;
        } else {
            self.sum -= evicted;
        }
    }

    /// Number of samples currently held (saturates at capacity).
    pub fn len(&self) -> usize {
        self.filled
    }

    pub fn is_empty(&self) -> bool {
        self.filled == 0
    }

    pub fn capacity(&self) -> usize {
        self.ring.len()
    }

    /// Arithmetic mean of the held samples, 0 when empty.
    pub fn mean_ms(&self) -> f64 {
        if self.filled == 0 {
            return 0.0;
        }
        self.sum / self.filled as f64
    }

    /// Largest held sample, 0 when empty.
    pub fn max_ms(&self) -> f64 {
        self.ring[..self.filled]
            .iter()
            .fold(0.0_f64, |acc, &v| acc.max(v))
    }

    /// Smallest held sample, `f64::MAX` when empty.
    pub fn min_ms(&self) -> f64 {
        self.ring[..self.filled]
            .iter()
            .fold(f64::MAX, |acc, &v| acc.min(v))
    }

    /// The sample at quantile `q` in [0, 1].
    ///
    /// Copies the whole ring and sorts out of line, indexing at
    /// `floor(capacity * q)`; intended for a ring that has wrapped at least
    /// once, where every slot holds a real sample.
    pub fn percentile_ms(&self, q: f64) -> f64 {
        let mut sorted = self.ring.clone();
        sorted.sort_by(f64::total_cmp);
        let index = ((sorted.len() as f64 * q) as usize).min(sorted.len() - 1);
        sorted[index]
    }

    /// Number of held samples at or under `deadline_ms`.
    pub fn completed_within(&self, deadline_ms: f64) -> usize {
        self.ring[..self.filled]
            .iter()
            .filter(|&&v| v <= deadline_ms)
            .count()
    }
}
