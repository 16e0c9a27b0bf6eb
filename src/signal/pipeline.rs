//! One ingestion step: append, detect, estimate, publish
//!
//! `SignalPipeline` owns every piece of derived state for a session. The
//! monitor keeps it behind a single lock so a reader always sees the buffer,
//! the peak history and the heart rate as of the same completed sample.

use super::buffer::{Sample, SampleBuffer};
use super::detector::{Peak, PeakDetector};
use super::history::PeakHistory;
use super::rate;

#[derive(Debug, Clone)]
pub struct SignalPipeline {
    buffer: SampleBuffer,
    detector: PeakDetector,
    history: PeakHistory,
    heart_rate: Option<u32>,
}

/// Copy of the pipeline state taken under one lock acquisition
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSnapshot {
    pub samples: Vec<f64>,
    pub total_samples: u64,
    pub heart_rate: Option<u32>,
    pub peaks_recorded: u64,
    pub mean_peak_magnitude: Option<f64>,
}

impl SignalPipeline {
    pub fn new(capacity: usize) -> Self {
        Self::with_detector(capacity, PeakDetector::new())
    }

    pub fn with_detector(capacity: usize, detector: PeakDetector) -> Self {
        Self {
            buffer: SampleBuffer::new(capacity),
            detector,
            history: PeakHistory::new(),
            heart_rate: None,
        }
    }

    /// Process one sample and return the peak it confirmed, if any
    ///
    /// The heart rate is only recomputed when a new peak enters the history;
    /// without one the published value could not change.
    pub fn ingest(&mut self, sample: Sample) -> Option<Peak> {
        self.buffer.append(sample);

        let peak = self.detector.evaluate(&self.buffer)?;
        self.history.record(peak.at, peak.magnitude);
        self.heart_rate = rate::estimate(self.history.timestamps(), self.heart_rate);

        Some(peak)
    }

    /// Clear all derived state for a new session
    pub fn reset(&mut self) {
        self.buffer.reset();
        self.history.reset();
        self.heart_rate = None;
    }

    pub fn samples(&self) -> Vec<f64> {
        self.buffer.snapshot()
    }

    pub fn heart_rate(&self) -> Option<u32> {
        self.heart_rate
    }

    pub fn buffer(&self) -> &SampleBuffer {
        &self.buffer
    }

    pub fn snapshot(&self) -> PipelineSnapshot {
        PipelineSnapshot {
            samples: self.buffer.snapshot(),
            total_samples: self.buffer.total(),
            heart_rate: self.heart_rate,
            peaks_recorded: self.history.recorded(),
            mean_peak_magnitude: self.history.mean_magnitude(),
        }
    }
}

impl Default for SignalPipeline {
    fn default() -> Self {
        Self::new(SampleBuffer::DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Synthetic trace: flat baseline with a unit spike every `period` samples
    fn pulse_train(count: usize, period: usize, offset: usize) -> Vec<f64> {
        (0..count)
            .map(|i| if i % period == offset { 10.0 } else { 0.0 })
            .collect()
    }

    fn run(pipeline: &mut SignalPipeline, values: &[f64], dt: f64) -> Vec<Peak> {
        values
            .iter()
            .enumerate()
            .filter_map(|(i, &v)| pipeline.ingest(Sample::new(v, i as f64 * dt)))
            .collect()
    }

    #[test]
    fn test_estimates_rate_from_pulse_train() {
        // 20 Hz, a beat every 14 samples = 0.7 s = 85.7 BPM
        let mut pipeline = SignalPipeline::default();
        let peaks = run(&mut pipeline, &pulse_train(200, 14, 12), 0.05);

        assert!(peaks.len() >= 10);
        for pair in peaks.windows(2) {
            assert!((pair[1].at - pair[0].at - 0.7).abs() < 1e-9);
        }
        assert_eq!(pipeline.heart_rate(), Some(85));
    }

    #[test]
    fn test_unknown_until_first_valid_interval() {
        let mut pipeline = SignalPipeline::default();
        let values = pulse_train(200, 14, 12);

        // First peak at sample 12 is confirmed when sample 13 arrives
        run(&mut pipeline, &values[..14], 0.05);
        assert_eq!(pipeline.history.recorded(), 1);
        assert_eq!(pipeline.heart_rate(), None);

        for (i, &v) in values.iter().enumerate().skip(14).take(14) {
            pipeline.ingest(Sample::new(v, i as f64 * 0.05));
        }
        assert_eq!(pipeline.history.recorded(), 2);
        assert_eq!(pipeline.heart_rate(), Some(85));
    }

    #[test]
    fn test_estimate_is_sticky_across_flat_signal() {
        let mut pipeline = SignalPipeline::default();
        run(&mut pipeline, &pulse_train(100, 14, 12), 0.05);
        let before = pipeline.heart_rate();
        assert!(before.is_some());

        for i in 100..300 {
            pipeline.ingest(Sample::new(0.0, i as f64 * 0.05));
        }
        assert_eq!(pipeline.heart_rate(), before);
    }

    #[test]
    fn test_buffer_bounded_and_reset_clears_everything() {
        let mut pipeline = SignalPipeline::new(50);
        run(&mut pipeline, &pulse_train(120, 14, 12), 0.05);

        let snapshot = pipeline.snapshot();
        assert_eq!(snapshot.samples.len(), 50);
        assert_eq!(snapshot.total_samples, 120);
        assert!(snapshot.peaks_recorded > 0);
        assert_eq!(snapshot.mean_peak_magnitude, Some(10.0));

        pipeline.reset();
        let snapshot = pipeline.snapshot();
        assert!(snapshot.samples.is_empty());
        assert_eq!(snapshot.total_samples, 0);
        assert_eq!(snapshot.heart_rate, None);
        assert_eq!(snapshot.peaks_recorded, 0);
    }
}
