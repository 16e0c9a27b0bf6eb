//! Offline replay of recorded signals
//!
//! Feeds a file of one reading per line through the same pipeline a live
//! session uses, with timestamps synthesized from a fixed sample rate.

use crate::signal::{Sample, SignalPipeline, parse_sample};
use anyhow::{Context, Result, bail};
use serde::Serialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ReplaySummary {
    pub samples: u64,
    pub skipped_lines: u64,
    pub peaks_detected: u64,
    pub heart_rate: Option<u32>,
    pub mean_peak_magnitude: Option<f64>,
    pub duration_seconds: f64,
}

pub fn replay_file(path: &Path, sample_rate: f64, buffer_capacity: usize) -> Result<ReplaySummary> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    log::info!("Replaying {} at {} Hz", path.display(), sample_rate);
    replay(BufReader::new(file), sample_rate, buffer_capacity)
}

pub fn replay<R: BufRead>(
    reader: R,
    sample_rate: f64,
    buffer_capacity: usize,
) -> Result<ReplaySummary> {
    if !(sample_rate.is_finite() && sample_rate > 0.0) {
        bail!("Sample rate must be positive, got {}", sample_rate);
    }

    let dt = 1.0 / sample_rate;
    let mut pipeline = SignalPipeline::new(buffer_capacity);
    let mut skipped_lines = 0;

    for line in reader.lines() {
        let line = line.context("Failed to read recording")?;
        let Some(value) = parse_sample(&line) else {
            skipped_lines += 1;
            continue;
        };

        let at = pipeline.buffer().total() as f64 * dt;
        if let Some(peak) = pipeline.ingest(Sample::new(value, at)) {
            log::debug!("Peak {:.3} at {:.3}s", peak.magnitude, peak.at);
        }
    }

    let snapshot = pipeline.snapshot();
    Ok(ReplaySummary {
        samples: snapshot.total_samples,
        skipped_lines,
        peaks_detected: snapshot.peaks_recorded,
        heart_rate: snapshot.heart_rate,
        mean_peak_magnitude: snapshot.mean_peak_magnitude,
        duration_seconds: snapshot.total_samples as f64 * dt,
    })
}
