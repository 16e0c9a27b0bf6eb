//! Adaptive R-peak detection
//!
//! On every new sample the detector looks one sample back: a local maximum
//! can only be confirmed once its successor is known. The candidate must
//! beat both neighbours and clear a threshold derived from the trailing
//! window's mean and standard deviation, so the detector follows baseline
//! drift and gain changes instead of relying on a fixed voltage cutoff.

use super::buffer::SampleBuffer;

/// Tuning for the adaptive threshold
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Samples that must have been accumulated before detection activates
    pub warmup_samples: u64,
    /// Trailing samples used for mean/std
    pub window: usize,
    /// Threshold multiplier: `T = mean + threshold_k * std`
    pub threshold_k: f64,
    /// Noise margin multiplier: candidate must exceed mean by `margin_k * std`
    pub margin_k: f64,
    /// Seconds subtracted from the candidate's arrival time
    pub latency_offset: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            warmup_samples: 10,
            window: 20,
            threshold_k: 2.5,
            margin_k: 1.5,
            latency_offset: 0.01,
        }
    }
}

/// A confirmed peak
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Peak {
    /// Corrected timestamp in session seconds
    pub at: f64,
    pub magnitude: f64,
}

/// Window statistics used for one evaluation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowStats {
    pub mean: f64,
    pub std_dev: f64,
}

impl WindowStats {
    /// Mean and population standard deviation
    pub fn compute<I>(values: I) -> Option<Self>
    where
        I: IntoIterator<Item = f64>,
        I::IntoIter: Clone,
    {
        let values = values.into_iter();
        let (sum, count) = values
            .clone()
            .fold((0.0, 0usize), |(sum, n), v| (sum + v, n + 1));
        if count == 0 {
            return None;
        }

        let mean = sum / count as f64;
        let variance = values.map(|v| (v - mean).powi(2)).sum::<f64>() / count as f64;

        Some(Self {
            mean,
            std_dev: variance.sqrt(),
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct PeakDetector {
    config: DetectorConfig,
}

impl PeakDetector {
    pub fn new() -> Self {
        Self::with_config(DetectorConfig::default())
    }

    pub fn with_config(config: DetectorConfig) -> Self {
        Self { config }
    }

    /// Decide whether the second-newest buffered sample is a peak
    ///
    /// Returns `None` during warm-up, with fewer than three buffered samples,
    /// or when the candidate does not qualify.
    pub fn evaluate(&self, buffer: &SampleBuffer) -> Option<Peak> {
        if buffer.total() < self.config.warmup_samples {
            return None;
        }

        let (Some(next), Some(candidate), Some(prev)) =
            (buffer.from_end(0), buffer.from_end(1), buffer.from_end(2))
        else {
            return None;
        };

        let stats = WindowStats::compute(buffer.tail(self.config.window).map(|s| s.value))?;
        let threshold = stats.mean + self.config.threshold_k * stats.std_dev;
        let margin = self.config.margin_k * stats.std_dev;

        let x = candidate.value;
        let is_local_max = x > prev.value && x > next.value;

        if is_local_max && x > threshold && x - stats.mean > margin {
            Some(Peak {
                at: candidate.at - self.config.latency_offset,
                magnitude: x,
            })
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::buffer::Sample;

    const DT: f64 = 0.05;

    fn buffer_of(values: &[f64]) -> SampleBuffer {
        let mut buffer = SampleBuffer::new(100);
        for (i, &v) in values.iter().enumerate() {
            buffer.append(Sample::new(v, i as f64 * DT));
        }
        buffer
    }

    #[test]
    fn test_window_stats_population_std() {
        let stats = WindowStats::compute([2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert!((stats.mean - 5.0).abs() < 1e-12);
        assert!((stats.std_dev - 2.0).abs() < 1e-12);
        assert!(WindowStats::compute(std::iter::empty::<f64>()).is_none());
    }

    #[test]
    fn test_detects_clean_pulse() {
        let mut values = vec![0.0; 19];
        values.push(10.0);
        values.push(0.0);

        let peak = PeakDetector::new().evaluate(&buffer_of(&values)).unwrap();
        assert_eq!(peak.magnitude, 10.0);
        assert!((peak.at - (19.0 * DT - 0.01)).abs() < 1e-9);
    }

    #[test]
    fn test_warmup_suppresses_detection() {
        // Nine samples with an obvious spike: not enough history yet
        let values = [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 10.0, 0.0];
        assert!(PeakDetector::new().evaluate(&buffer_of(&values)).is_none());

        let mut values = values.to_vec();
        values.splice(7..7, [0.0]);
        assert_eq!(values.len(), 10);
        assert!(PeakDetector::new().evaluate(&buffer_of(&values)).is_some());
    }

    #[test]
    fn test_candidate_must_be_strict_local_max() {
        let mut values = vec![0.0; 18];
        values.extend([10.0, 10.0, 0.0]);
        assert!(PeakDetector::new().evaluate(&buffer_of(&values)).is_none());

        // Still rising: newest sample is larger than the candidate
        let mut values = vec![0.0; 18];
        values.extend([5.0, 10.0]);
        assert!(PeakDetector::new().evaluate(&buffer_of(&values)).is_none());
    }

    #[test]
    fn test_rejects_noise_ripple() {
        let values: Vec<f64> = (0..31).map(|i| (i % 2) as f64).collect();
        assert!(PeakDetector::new().evaluate(&buffer_of(&values)).is_none());
    }

    #[test]
    fn test_rejects_maximum_below_adaptive_threshold() {
        // Several comparable bumps inflate the deviation above the candidate
        let mut values = Vec::new();
        for _ in 0..6 {
            values.extend([0.0, 4.0, 0.0]);
        }
        values.extend([0.0, 5.0, 0.0]);
        assert!(PeakDetector::new().evaluate(&buffer_of(&values)).is_none());
    }

    #[test]
    fn test_threshold_follows_baseline_offset() {
        let mut values = vec![500.0; 19];
        values.push(510.0);
        values.push(500.0);

        let peak = PeakDetector::new().evaluate(&buffer_of(&values)).unwrap();
        assert_eq!(peak.magnitude, 510.0);
    }
}
