//! Recent peak storage
//!
//! Two independent bounded queues: corrected peak timestamps feed the rate
//! estimator, peak magnitudes are kept as a longer horizon for adaptive
//! statistics. Both evict their oldest entry on overflow.

use std::collections::VecDeque;

/// Bounded FIFO queues of recently detected peaks
#[derive(Debug, Clone, Default)]
pub struct PeakHistory {
    timestamps: VecDeque<f64>,
    magnitudes: VecDeque<f64>,
    recorded: u64,
}

impl PeakHistory {
    /// Peak timestamps retained for interval computation
    pub const TIMESTAMP_CAPACITY: usize = 10;
    /// Peak magnitudes retained for adaptive statistics
    pub const MAGNITUDE_CAPACITY: usize = 30;

    pub fn new() -> Self {
        Self {
            timestamps: VecDeque::with_capacity(Self::TIMESTAMP_CAPACITY),
            magnitudes: VecDeque::with_capacity(Self::MAGNITUDE_CAPACITY),
            recorded: 0,
        }
    }

    /// Record a detected peak
    pub fn record(&mut self, at: f64, magnitude: f64) {
        push_bounded(&mut self.timestamps, at, Self::TIMESTAMP_CAPACITY);
        push_bounded(&mut self.magnitudes, magnitude, Self::MAGNITUDE_CAPACITY);
        self.recorded += 1;
    }

    pub fn timestamps(&self) -> impl ExactSizeIterator<Item = f64> + '_ {
        self.timestamps.iter().copied()
    }

    /// Mean of retained peak magnitudes, if any
    pub fn mean_magnitude(&self) -> Option<f64> {
        if self.magnitudes.is_empty() {
            return None;
        }
        Some(self.magnitudes.iter().sum::<f64>() / self.magnitudes.len() as f64)
    }

    /// Peaks recorded since the last reset, including evicted ones
    pub fn recorded(&self) -> u64 {
        self.recorded
    }

    pub fn reset(&mut self) {
        self.timestamps.clear();
        self.magnitudes.clear();
        self.recorded = 0;
    }
}

fn push_bounded(queue: &mut VecDeque<f64>, value: f64, capacity: usize) {
    if queue.len() == capacity {
        queue.pop_front();
    }
    queue.push_back(value);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_independent_eviction_horizons() {
        let mut history = PeakHistory::new();
        for i in 0..40 {
            history.record(i as f64, 100.0 + i as f64);
        }

        let timestamps: Vec<f64> = history.timestamps().collect();
        assert_eq!(timestamps.len(), PeakHistory::TIMESTAMP_CAPACITY);
        assert_eq!(timestamps.first(), Some(&30.0));
        assert_eq!(timestamps.last(), Some(&39.0));

        assert_eq!(history.magnitudes.len(), PeakHistory::MAGNITUDE_CAPACITY);
        assert_eq!(history.magnitudes.front(), Some(&110.0));
        assert_eq!(history.recorded(), 40);
    }

    #[test]
    fn test_mean_magnitude() {
        let mut history = PeakHistory::new();
        assert_eq!(history.mean_magnitude(), None);

        history.record(0.0, 2.0);
        history.record(1.0, 4.0);
        assert_eq!(history.mean_magnitude(), Some(3.0));
    }

    #[test]
    fn test_reset() {
        let mut history = PeakHistory::new();
        history.record(0.5, 1.0);
        history.reset();

        assert_eq!(history.timestamps().len(), 0);
        assert!(history.magnitudes.is_empty());
        assert_eq!(history.recorded(), 0);
    }
}
