//! Async transport implementation using tokio
//!
//! Provides the socket client used by the CLI and the server-side connection
//! wrapper used by the service.

use crate::protocol::{ClientMessage, ServerMessage};
use crate::transport::{SocketError, codec};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use uuid::Uuid;

/// Requests are answered from in-memory state; anything slower is a hung service
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Async transport for socket communication (stateless client)
pub struct AsyncTransport {
    socket_path: String,
}

/// Line-delimited connection over a split Unix stream
pub struct AsyncConnection {
    pub reader: BufReader<tokio::net::unix::OwnedReadHalf>,
    pub writer: tokio::net::unix::OwnedWriteHalf,
}

impl AsyncTransport {
    pub fn new(socket_path: String) -> Self {
        Self { socket_path }
    }

    /// Connect to the socket and return a stateful connection
    pub async fn connect(&self) -> Result<AsyncConnection, SocketError> {
        let stream = UnixStream::connect(&self.socket_path)
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::ConnectionRefused => SocketError::Connection(
                    "Service is not running. Use 'ecgmon service' to start the service."
                        .to_string(),
                ),
                std::io::ErrorKind::NotFound => SocketError::Connection(format!(
                    "Service socket not found at {}. Use 'ecgmon service' to start the service.",
                    self.socket_path
                )),
                _ => SocketError::Connection(format!(
                    "Failed to connect to service at {}: {}",
                    self.socket_path, e
                )),
            })?;

        Ok(AsyncConnection::new(stream))
    }

    /// Send a client message and receive the response (one-shot request-response)
    pub async fn send_request(&self, message: &ClientMessage) -> Result<ServerMessage, SocketError> {
        let mut conn = self.connect().await?;
        conn.write_message(message).await?;

        tokio::time::timeout(REQUEST_TIMEOUT, conn.read_response(message.id()))
            .await
            .map_err(|_| {
                SocketError::Connection(format!(
                    "Request timed out after {} seconds",
                    REQUEST_TIMEOUT.as_secs()
                ))
            })?
    }
}

impl AsyncConnection {
    pub fn new(stream: UnixStream) -> Self {
        let (reader, writer) = stream.into_split();
        Self {
            reader: BufReader::new(reader),
            writer,
        }
    }

    /// Read a client message from the connection (server-side)
    pub async fn read_client_message(&mut self) -> Result<Option<ClientMessage>, SocketError> {
        let mut line = String::new();
        match self.reader.read_line(&mut line).await {
            Ok(0) => Ok(None), // EOF - connection closed
            Ok(_) => {
                let message = codec::decode_client_message(&line)?;
                Ok(Some(message))
            }
            Err(e) => Err(SocketError::Io(e)),
        }
    }

    /// Read a server message from the connection (client-side)
    pub async fn read_server_message(&mut self) -> Result<Option<ServerMessage>, SocketError> {
        let mut line = String::new();
        match self.reader.read_line(&mut line).await {
            Ok(0) => Ok(None), // EOF - connection closed
            Ok(_) => {
                let message = codec::decode_server_message(&line)?;
                Ok(Some(message))
            }
            Err(e) => Err(SocketError::Io(e)),
        }
    }

    /// Read until the response to `request_id` arrives, skipping broadcast
    /// events and answers to other requests
    ///
    /// A nil id marks an error for a request the server could not decode.
    pub async fn read_response(&mut self, request_id: Uuid) -> Result<ServerMessage, SocketError> {
        loop {
            let Some(message) = self.read_server_message().await? else {
                return Err(SocketError::Connection(
                    "No response from server".to_string(),
                ));
            };

            match message.request_id() {
                None => continue,
                Some(id) if id == request_id || id.is_nil() => return Ok(message),
                Some(id) => log::debug!("Skipping response to request {}", id),
            }
        }
    }

    /// Write a client message to the connection (client-side)
    pub async fn write_message(&mut self, message: &ClientMessage) -> Result<(), SocketError> {
        let encoded = codec::encode_client_message(message)?;
        self.writer.write_all(encoded.as_bytes()).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Write a server message to the connection (server-side)
    pub async fn write_server_message(&mut self, message: &ServerMessage) -> Result<(), SocketError> {
        let encoded = codec::encode_server_message(message)?;
        self.write_raw(encoded.as_bytes()).await
    }

    /// Write pre-encoded bytes (broadcast events)
    pub async fn write_raw(&mut self, bytes: &[u8]) -> Result<(), SocketError> {
        self.writer.write_all(bytes).await?;
        self.writer.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::Phase;

    #[tokio::test]
    async fn test_read_response_skips_events_and_other_requests() {
        let (client, server) = UnixStream::pair().unwrap();
        let mut client = AsyncConnection::new(client);
        let mut server = AsyncConnection::new(server);

        let request = ClientMessage::new_heart_rate();
        let event = ServerMessage::new_status_event(Phase::Monitoring, Some(70), 12, 3);
        let stale = ServerMessage::HeartRate {
            id: Uuid::new_v4(),
            bpm: Some(60),
        };
        let answer = ServerMessage::HeartRate {
            id: request.id(),
            bpm: Some(72),
        };
        for message in [&event, &stale, &answer] {
            server.write_server_message(message).await.unwrap();
        }

        let response = client.read_response(request.id()).await.unwrap();
        assert_eq!(response, answer);
    }

    #[tokio::test]
    async fn test_read_response_reports_closed_connection() {
        let (client, server) = UnixStream::pair().unwrap();
        let mut client = AsyncConnection::new(client);
        drop(server);

        assert!(matches!(
            client.read_response(Uuid::new_v4()).await,
            Err(SocketError::Connection(_))
        ));
    }
}
