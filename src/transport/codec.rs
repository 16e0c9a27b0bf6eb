//! Line framing for the monitor protocol
//!
//! Every `ClientMessage` request and `ServerMessage` reply or status event
//! travels as one JSON object terminated by `\n`. JSON escapes newlines
//! inside strings, so a frame always fits on one line.

use crate::protocol::{ClientMessage, ServerMessage};
use crate::transport::SocketError;
use serde::Serialize;
use serde::de::DeserializeOwned;

fn encode_line<T: Serialize>(message: &T) -> Result<String, SocketError> {
    let mut line = serde_json::to_string(message)?;
    line.push('\n');
    Ok(line)
}

fn decode_line<T: DeserializeOwned>(line: &str) -> Result<T, SocketError> {
    Ok(serde_json::from_str(line.trim_end_matches(['\r', '\n']))?)
}

/// Frame a request from the CLI
pub fn encode_client_message(message: &ClientMessage) -> Result<String, SocketError> {
    encode_line(message)
}

/// Frame a reply or a status event from the service
pub fn encode_server_message(message: &ServerMessage) -> Result<String, SocketError> {
    encode_line(message)
}

pub fn decode_client_message(line: &str) -> Result<ClientMessage, SocketError> {
    decode_line(line)
}

pub fn decode_server_message(line: &str) -> Result<ServerMessage, SocketError> {
    decode_line(line)
}
