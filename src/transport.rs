//! Transport layer for socket communication
//!
//! The service and its CLI client talk over a Unix domain socket using
//! newline-delimited JSON:
//! - `codec`: NDJSON encoding/decoding for messages
//! - `async_transport`: Tokio-based client transport and server-side connection

use thiserror::Error;

mod async_transport;
mod codec;

pub use async_transport::{AsyncConnection, AsyncTransport};
pub use codec::encode_server_message;

/// Socket error types
#[derive(Error, Debug)]
pub enum SocketError {
    #[error("Socket connection error: {0}")]
    Connection(String),
    #[error("Socket I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
