//! Streaming heart rate estimation
//!
//! Samples flow through a bounded window, an adaptive peak detector and a
//! range-filtered interval estimator:
//! - `buffer`: rolling window of the most recent readings
//! - `detector`: adaptive-threshold local maximum detection
//! - `history`: bounded queues of recent peak timestamps and magnitudes
//! - `rate`: beat interval filtering and BPM conversion
//! - `pipeline`: the combined per-sample ingestion step

mod buffer;
mod detector;
mod history;
mod pipeline;
pub mod rate;

pub use buffer::{Sample, SampleBuffer};
pub use pipeline::{PipelineSnapshot, SignalPipeline};

/// Parse one transport line into a reading
///
/// Returns `None` for blank or non-numeric lines, which the caller skips.
pub fn parse_sample(line: &str) -> Option<f64> {
    line.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}
