//! Connection and message handling
//!
//! This module handles individual client connections and message processing.

use crate::monitor::{MonitorError, SessionConfig};
use crate::protocol::{ClientMessage, ServerMessage};
use crate::source::{BAUD_RATES, list_available_sources};
use crate::transport::{AsyncConnection, SocketError};
use std::sync::Arc;
use tokio::net::UnixStream;
use uuid::Uuid;

use super::ServerInner;

type ServerResult<T> = std::result::Result<T, SocketError>;

pub(super) async fn handle_connection(
    stream: UnixStream,
    inner: Arc<ServerInner>,
) -> ServerResult<()> {
    let mut conn = AsyncConnection::new(stream);

    // Track if this connection is a subscriber
    let mut subscriber_id: Option<Uuid> = None;
    let (event_tx, mut event_rx) = tokio::sync::mpsc::unbounded_channel();

    let result = loop {
        tokio::select! {
            result = conn.read_client_message() => {
                let request = match result {
                    Ok(Some(request)) => request,
                    // Connection closed
                    Ok(None) => break Ok(()),
                    Err(SocketError::Serialization(e)) => {
                        log::debug!("Rejecting malformed request: {}", e);
                        let response = ServerMessage::new_error(Uuid::nil(), format!("Invalid request: {}", e));
                        if let Err(e) = conn.write_server_message(&response).await {
                            break Err(e);
                        }
                        continue;
                    }
                    Err(e) => break Err(e),
                };

                log::debug!("Received request: {:?}", request);

                if let ClientMessage::Subscribe { id } = request {
                    if subscriber_id.is_none() {
                        inner.add_subscriber(id, event_tx.clone());
                        subscriber_id = Some(id);
                    }

                    if let Err(e) = conn.write_server_message(&ServerMessage::new_subscribed(id)).await {
                        break Err(e);
                    }

                    // Initial status so the subscriber does not wait a full heartbeat
                    inner.broadcast_status();
                    continue;
                }

                let response = process_message(request, Arc::clone(&inner)).await;
                if let Err(e) = conn.write_server_message(&response).await {
                    break Err(e);
                }
            }

            // Send events to subscriber
            Some(event_data) = event_rx.recv() => {
                if let Err(e) = conn.write_raw(&event_data).await {
                    break Err(e);
                }
            }
        }
    };

    // Clean up subscriber on disconnect
    if let Some(id) = subscriber_id {
        inner.remove_subscriber(id);
    }

    result
}

async fn process_message(request: ClientMessage, inner: Arc<ServerInner>) -> ServerMessage {
    match request {
        ClientMessage::Connect {
            id,
            port,
            baud_rate,
        } => {
            if !BAUD_RATES.contains(&baud_rate) {
                return ServerMessage::new_error(
                    id,
                    format!("Unsupported baud rate {}", baud_rate),
                );
            }

            let config = SessionConfig {
                port,
                baud_rate,
                read_timeout: inner.read_timeout,
            };

            // Opening the port and joining a replaced worker both block
            let monitor = Arc::clone(&inner.monitor);
            let started = tokio::task::spawn_blocking(move || monitor.start_session(&config)).await;

            let response = match started {
                Ok(Ok(session)) => ServerMessage::Connected {
                    id,
                    session: session.id,
                    source: session.source,
                    baud_rate,
                },
                Ok(Err(e)) => {
                    log::warn!("Connect failed: {}", e);
                    ServerMessage::new_error(id, e.to_string())
                }
                Err(e) => ServerMessage::new_error(id, format!("Connect task failed: {}", e)),
            };

            inner.broadcast_status();
            response
        }

        ClientMessage::Disconnect { id } => {
            let monitor = Arc::clone(&inner.monitor);
            let stopped = tokio::task::spawn_blocking(move || monitor.stop_session()).await;

            let response = match stopped {
                Ok(Ok(())) => ServerMessage::Disconnected { id },
                Ok(Err(e @ MonitorError::NotRunning)) => ServerMessage::new_error(id, e.to_string()),
                Ok(Err(e)) => {
                    log::warn!("Disconnect failed: {}", e);
                    ServerMessage::new_error(id, e.to_string())
                }
                Err(e) => ServerMessage::new_error(id, format!("Disconnect task failed: {}", e)),
            };

            inner.broadcast_status();
            response
        }

        ClientMessage::Samples { id } => ServerMessage::Samples {
            id,
            values: inner.monitor.get_samples(),
        },

        ClientMessage::HeartRate { id } => ServerMessage::HeartRate {
            id,
            bpm: inner.monitor.get_heart_rate(),
        },

        ClientMessage::Ports { id } => {
            match tokio::task::spawn_blocking(list_available_sources).await {
                Ok(Ok(ports)) => ServerMessage::Ports {
                    id,
                    ports,
                    baud_rates: BAUD_RATES.to_vec(),
                },
                Ok(Err(e)) => ServerMessage::new_error(id, format!("Failed to list ports: {}", e)),
                Err(e) => ServerMessage::new_error(id, format!("Port listing task failed: {}", e)),
            }
        }

        ClientMessage::Status { id } => {
            let status = inner.monitor.status();
            let (source, baud_rate) = match status.session {
                Some(session) => (Some(session.source), session.baud_rate),
                None => (None, None),
            };

            ServerMessage::Status {
                id,
                service_running: true,
                phase: status.phase,
                source,
                baud_rate,
                heart_rate: status.pipeline.heart_rate,
                buffered_samples: status.pipeline.samples.len(),
                total_samples: status.pipeline.total_samples,
                skipped_lines: status.skipped_lines,
                peaks_detected: status.pipeline.peaks_recorded,
                mean_peak_magnitude: status.pipeline.mean_peak_magnitude,
                session_seconds: status.session_duration.map(|d| d.as_secs()),
                last_error: status.last_error,
                uptime_seconds: inner.start_time.elapsed().as_secs(),
            }
        }

        ClientMessage::Subscribe { id } => {
            // This should never be reached as Subscribe is handled in handle_connection
            ServerMessage::new_error(id, "Subscribe should be handled at connection level")
        }
    }
}
