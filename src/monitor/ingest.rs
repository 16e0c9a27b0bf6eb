//! The ingestion worker
//!
//! Runs on its own thread for the lifetime of one session. Each line read
//! from the source is parsed, timestamped and pushed through the pipeline
//! inside a single critical section. The source is dropped (and the port
//! released) when the loop exits.

use super::{Phase, SharedState, lock};
use crate::signal::{Sample, parse_sample};
use crate::source::SampleSource;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Wait applied when the source has nothing to offer
const IDLE_WAIT: Duration = Duration::from_millis(10);

pub(super) struct IngestLoop {
    source: Box<dyn SampleSource>,
    state: SharedState,
    stop: Arc<AtomicBool>,
    epoch: Instant,
}

impl IngestLoop {
    pub(super) fn new(
        source: Box<dyn SampleSource>,
        state: SharedState,
        stop: Arc<AtomicBool>,
    ) -> Self {
        Self {
            source,
            state,
            stop,
            epoch: Instant::now(),
        }
    }

    pub(super) fn run(mut self) {
        while !self.stop.load(Ordering::Acquire) {
            match self.source.next_line() {
                Ok(Some(line)) => {
                    // A stop may have been requested while the read was blocked
                    if self.stop.load(Ordering::Acquire) {
                        log::trace!("Discarding line read after stop: {:?}", line);
                        break;
                    }
                    self.process(&line);
                }
                Ok(None) => std::thread::sleep(IDLE_WAIT),
                Err(e) => {
                    self.fail(e);
                    return;
                }
            }
        }

        log::debug!("Ingestion loop for {} exiting", self.source.name());
    }

    fn process(&mut self, line: &str) {
        let value = parse_sample(line);
        let at = self.epoch.elapsed().as_secs_f64();

        let mut state = lock(&self.state);
        if state.phase != Phase::Monitoring {
            return;
        }

        let Some(value) = value else {
            log::trace!("Skipping malformed line: {:?}", line);
            state.skipped_lines += 1;
            return;
        };

        if let Some(peak) = state.pipeline.ingest(Sample::new(value, at)) {
            log::debug!(
                "Peak {:.3} at {:.3}s, heart rate {:?}",
                peak.magnitude,
                peak.at,
                state.pipeline.heart_rate()
            );
        }
    }

    fn fail(&mut self, error: io::Error) {
        log::warn!(
            "Reading from {} failed, ending session: {}",
            self.source.name(),
            error
        );

        let mut state = lock(&self.state);
        state.last_error = Some(format!("{}: {}", self.source.name(), error));
        if state.phase == Phase::Monitoring {
            state.phase = Phase::Idle;
            state.ended_at = Some(Instant::now());
        }
    }
}
