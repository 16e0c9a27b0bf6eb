//! Rolling sample window
//!
//! Holds the most recent readings of the active session for display and for
//! the peak detector's trailing statistics. The window is a ring of fixed
//! capacity: appending past capacity drops the oldest readings so that the
//! buffer always equals the trailing `capacity` samples in arrival order.

use std::collections::VecDeque;

/// A single reading as it was received from the source
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Raw magnitude as parsed from the transport
    pub value: f64,
    /// Seconds since the session started (monotonic)
    pub at: f64,
}

impl Sample {
    pub fn new(value: f64, at: f64) -> Self {
        Self { value, at }
    }
}

/// Fixed-capacity ordered window of recent samples
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    samples: VecDeque<Sample>,
    capacity: usize,
    total: u64,
}

impl SampleBuffer {
    /// Window size used when the configuration does not override it
    pub const DEFAULT_CAPACITY: usize = 100;

    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity + 1),
            capacity,
            total: 0,
        }
    }

    /// Append a sample, keeping only the trailing `capacity` entries
    pub fn append(&mut self, sample: Sample) {
        self.samples.push_back(sample);
        self.total += 1;

        if self.samples.len() > self.capacity {
            let excess = self.samples.len() - self.capacity;
            self.samples.drain(..excess);
        }
    }

    /// Ordered copy of the buffered readings
    pub fn snapshot(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.value).collect()
    }

    /// Clear the window and the accumulated count (new session)
    pub fn reset(&mut self) {
        self.samples.clear();
        self.total = 0;
    }

    /// Samples appended since the last reset, including evicted ones
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Sample `n` positions from the end (0 = newest)
    pub fn from_end(&self, n: usize) -> Option<&Sample> {
        self.samples
            .len()
            .checked_sub(n + 1)
            .and_then(|idx| self.samples.get(idx))
    }

    /// Iterator over the newest `n` samples (or all, if fewer), oldest first
    pub fn tail(&self, n: usize) -> impl Iterator<Item = &Sample> + Clone {
        let skip = self.samples.len().saturating_sub(n);
        self.samples.iter().skip(skip)
    }
}

impl Default for SampleBuffer {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}
