use crate::monitor::Phase;
use crate::source::DEFAULT_BAUD_RATE;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Messages sent from clients to the server
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Open a serial port and start a monitoring session
    Connect {
        id: Uuid,
        port: String,
        #[serde(default = "default_baud_rate")]
        baud_rate: u32,
    },
    /// Stop the current session
    Disconnect { id: Uuid },
    /// Request the rolling sample window
    Samples { id: Uuid },
    /// Request the current heart rate
    HeartRate { id: Uuid },
    /// Request the list of available serial ports
    Ports { id: Uuid },
    /// Request server status
    Status { id: Uuid },
    /// Subscribe to server events
    Subscribe { id: Uuid },
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

impl ClientMessage {
    pub fn new_connect(port: String, baud_rate: u32) -> Self {
        ClientMessage::Connect {
            id: Uuid::new_v4(),
            port,
            baud_rate,
        }
    }

    pub fn new_disconnect() -> Self {
        ClientMessage::Disconnect { id: Uuid::new_v4() }
    }

    pub fn new_samples() -> Self {
        ClientMessage::Samples { id: Uuid::new_v4() }
    }

    pub fn new_heart_rate() -> Self {
        ClientMessage::HeartRate { id: Uuid::new_v4() }
    }

    pub fn new_status() -> Self {
        ClientMessage::Status { id: Uuid::new_v4() }
    }

    pub fn new_subscribe() -> Self {
        ClientMessage::Subscribe { id: Uuid::new_v4() }
    }

    pub fn id(&self) -> Uuid {
        match self {
            ClientMessage::Connect { id, .. }
            | ClientMessage::Disconnect { id }
            | ClientMessage::Samples { id }
            | ClientMessage::HeartRate { id }
            | ClientMessage::Ports { id }
            | ClientMessage::Status { id }
            | ClientMessage::Subscribe { id } => *id,
        }
    }
}

/// Messages sent from server to client
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Session started
    Connected {
        id: Uuid,
        session: Uuid,
        source: String,
        baud_rate: u32,
    },
    /// Session stopped
    Disconnected { id: Uuid },
    /// Rolling sample window, oldest first
    Samples { id: Uuid, values: Vec<f64> },
    /// Current heart rate (`null` until known)
    HeartRate { id: Uuid, bpm: Option<u32> },
    /// Available serial ports and offered baud rates
    Ports {
        id: Uuid,
        ports: Vec<String>,
        baud_rates: Vec<u32>,
    },
    /// Error response
    Error { id: Uuid, error: String },
    /// Status information (in response to status request)
    Status {
        id: Uuid,
        service_running: bool,
        phase: Phase,
        source: Option<String>,
        baud_rate: Option<u32>,
        heart_rate: Option<u32>,
        buffered_samples: usize,
        total_samples: u64,
        skipped_lines: u64,
        peaks_detected: u64,
        mean_peak_magnitude: Option<f64>,
        session_seconds: Option<u64>,
        last_error: Option<String>,
        uptime_seconds: u64,
    },
    /// Subscription confirmation
    Subscribed { id: Uuid },
    /// Status event broadcast (sent periodically to subscribers)
    StatusEvent {
        phase: Phase,
        bpm: Option<u32>,
        samples: u64,
        ts: u64,
        #[serde(default = "default_version")]
        ver: u32,
    },
}

fn default_version() -> u32 {
    1
}

impl ServerMessage {
    /// Id of the request this message answers, `None` for broadcast events
    pub fn request_id(&self) -> Option<Uuid> {
        match self {
            ServerMessage::Connected { id, .. }
            | ServerMessage::Disconnected { id }
            | ServerMessage::Samples { id, .. }
            | ServerMessage::HeartRate { id, .. }
            | ServerMessage::Ports { id, .. }
            | ServerMessage::Error { id, .. }
            | ServerMessage::Status { id, .. }
            | ServerMessage::Subscribed { id } => Some(*id),
            ServerMessage::StatusEvent { .. } => None,
        }
    }

    pub fn new_error(id: Uuid, error: impl Into<String>) -> Self {
        ServerMessage::Error {
            id,
            error: error.into(),
        }
    }

    pub fn new_subscribed(id: Uuid) -> Self {
        ServerMessage::Subscribed { id }
    }

    pub fn new_status_event(phase: Phase, bpm: Option<u32>, samples: u64, ts: u64) -> Self {
        ServerMessage::StatusEvent {
            phase,
            bpm,
            samples,
            ts,
            ver: 1,
        }
    }
}
