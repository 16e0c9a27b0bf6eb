//! Monitoring sessions
//!
//! `Monitor` is the single owner of the signal pipeline. A session moves
//! through `Idle -> Monitoring -> Stopping -> Idle`; while monitoring, one
//! dedicated worker thread reads lines from the source and feeds them
//! through the pipeline. Readers take the same lock only to copy a snapshot.

mod ingest;

use crate::signal::{PipelineSnapshot, SignalPipeline};
use crate::source::{SampleSource, SerialSource};
use ingest::IngestLoop;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use thiserror::Error;
use uuid::Uuid;

/// Monitor error types
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Failed to open {port}: {reason}")]
    TransportUnavailable { port: String, reason: String },
    #[error("No active connection")]
    NotRunning,
    #[error("Failed to start ingestion worker: {0}")]
    WorkerSpawn(#[source] std::io::Error),
    #[error("Ingestion worker panicked")]
    WorkerPanicked,
}

/// Session lifecycle
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Idle,
    Monitoring,
    Stopping,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Idle => "Idle",
            Phase::Monitoring => "Monitoring",
            Phase::Stopping => "Stopping",
        }
    }
}

/// Transport selection for a new session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub port: String,
    pub baud_rate: u32,
    pub read_timeout: Duration,
}

/// Identifies a started session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHandle {
    pub id: Uuid,
    pub source: String,
    pub baud_rate: Option<u32>,
}

/// Point-in-time view of the monitor for status reporting
#[derive(Debug, Clone)]
pub struct MonitorStatus {
    pub phase: Phase,
    pub session: Option<SessionHandle>,
    /// Length of the current or last session, frozen once it ends
    pub session_duration: Option<Duration>,
    pub pipeline: PipelineSnapshot,
    pub skipped_lines: u64,
    pub last_error: Option<String>,
}

/// State shared between the worker and readers, guarded by one lock
struct MonitorState {
    pipeline: SignalPipeline,
    phase: Phase,
    session: Option<SessionHandle>,
    started_at: Option<Instant>,
    ended_at: Option<Instant>,
    skipped_lines: u64,
    last_error: Option<String>,
}

impl MonitorState {
    fn session_duration(&self) -> Option<Duration> {
        let started = self.started_at?;
        let ended = self.ended_at.unwrap_or_else(Instant::now);
        Some(ended.saturating_duration_since(started))
    }
}

type SharedState = Arc<Mutex<MonitorState>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // A panicking holder cannot leave a step half-applied for readers that
    // only copy data out, so keep serving the last state
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Worker {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl Worker {
    fn shutdown(self) -> Result<(), MonitorError> {
        self.stop.store(true, Ordering::Release);
        self.handle.join().map_err(|_| MonitorError::WorkerPanicked)
    }
}

pub struct Monitor {
    state: SharedState,
    // Serializes start/stop so two workers never run at once
    worker: Mutex<Option<Worker>>,
}

impl Monitor {
    pub fn new(buffer_capacity: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(MonitorState {
                pipeline: SignalPipeline::new(buffer_capacity),
                phase: Phase::Idle,
                session: None,
                started_at: None,
                ended_at: None,
                skipped_lines: 0,
                last_error: None,
            })),
            worker: Mutex::new(None),
        }
    }

    /// Open the configured serial port and start monitoring it
    ///
    /// A running session is stopped first. If the port cannot be opened no
    /// new session is created.
    pub fn start_session(&self, config: &SessionConfig) -> Result<SessionHandle, MonitorError> {
        let mut worker = lock(&self.worker);
        self.quiesce(&mut worker)?;

        let source = SerialSource::open(&config.port, config.baud_rate, config.read_timeout)
            .map_err(|e| MonitorError::TransportUnavailable {
                port: config.port.clone(),
                reason: e.to_string(),
            })?;

        self.launch(&mut worker, Box::new(source), Some(config.baud_rate))
    }

    /// Start monitoring an already opened source
    #[cfg(test)]
    pub fn start_with_source(
        &self,
        source: Box<dyn SampleSource>,
    ) -> Result<SessionHandle, MonitorError> {
        let mut worker = lock(&self.worker);
        self.quiesce(&mut worker)?;
        self.launch(&mut worker, source, None)
    }

    /// Stop the running session and release its source
    ///
    /// Returns `NotRunning` when no session is monitoring, including after
    /// the worker ended on its own because the transport failed.
    pub fn stop_session(&self) -> Result<(), MonitorError> {
        let mut worker = lock(&self.worker);

        {
            let mut state = lock(&self.state);
            if state.phase != Phase::Monitoring {
                return Err(MonitorError::NotRunning);
            }
            state.phase = Phase::Stopping;
        }

        let result = match worker.take() {
            Some(running) => running.shutdown(),
            None => Ok(()),
        };

        {
            let mut state = lock(&self.state);
            state.phase = Phase::Idle;
            state.ended_at = Some(Instant::now());
        }
        log::info!("Monitoring session stopped");
        result
    }

    /// Current rolling window, oldest first
    pub fn get_samples(&self) -> Vec<f64> {
        lock(&self.state).pipeline.samples()
    }

    /// Current heart rate, `None` until the first valid estimate
    pub fn get_heart_rate(&self) -> Option<u32> {
        lock(&self.state).pipeline.heart_rate()
    }

    pub fn status(&self) -> MonitorStatus {
        let state = lock(&self.state);
        MonitorStatus {
            phase: state.phase,
            session: state.session.clone(),
            session_duration: state.session_duration(),
            pipeline: state.pipeline.snapshot(),
            skipped_lines: state.skipped_lines,
            last_error: state.last_error.clone(),
        }
    }

    /// Stop any running worker and wait for it to release its source
    fn quiesce(&self, worker: &mut Option<Worker>) -> Result<(), MonitorError> {
        let Some(running) = worker.take() else {
            return Ok(());
        };

        let was_monitoring = {
            let mut state = lock(&self.state);
            let monitoring = state.phase == Phase::Monitoring;
            if monitoring {
                state.phase = Phase::Stopping;
            }
            monitoring
        };

        if was_monitoring {
            log::info!("Replacing active monitoring session");
        }

        let result = running.shutdown();
        let mut state = lock(&self.state);
        state.phase = Phase::Idle;
        state.session = None;
        state.started_at = None;
        state.ended_at = None;
        result
    }

    fn launch(
        &self,
        worker: &mut Option<Worker>,
        source: Box<dyn SampleSource>,
        baud_rate: Option<u32>,
    ) -> Result<SessionHandle, MonitorError> {
        let handle = SessionHandle {
            id: Uuid::new_v4(),
            source: source.name().to_string(),
            baud_rate,
        };

        {
            let mut state = lock(&self.state);
            state.pipeline.reset();
            state.phase = Phase::Monitoring;
            state.session = Some(handle.clone());
            state.started_at = Some(Instant::now());
            state.ended_at = None;
            state.skipped_lines = 0;
            state.last_error = None;
        }

        let stop = Arc::new(AtomicBool::new(false));
        let ingest = IngestLoop::new(source, Arc::clone(&self.state), Arc::clone(&stop));

        let spawned = std::thread::Builder::new()
            .name("ecg-ingest".to_string())
            .spawn(move || ingest.run());

        match spawned {
            Ok(join) => {
                *worker = Some(Worker { stop, handle: join });
                log::info!("Monitoring session {} started on {}", handle.id, handle.source);
                Ok(handle)
            }
            Err(e) => {
                let mut state = lock(&self.state);
                state.phase = Phase::Idle;
                state.session = None;
                state.started_at = None;
                Err(MonitorError::WorkerSpawn(e))
            }
        }
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        let worker = self
            .worker
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(running) = worker
            && let Err(e) = running.shutdown()
        {
            log::warn!("Ingestion worker did not shut down cleanly: {}", e);
        }
    }
}
