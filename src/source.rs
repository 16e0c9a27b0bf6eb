//! Sample sources
//!
//! A source yields newline-delimited readings. The serial implementation is
//! the production transport; the ingestion loop only sees the trait so that
//! sessions can be driven from anything that produces lines.

mod serial;

pub use serial::SerialSource;

use std::io;

/// Baud rates offered to clients when choosing a port
pub const BAUD_RATES: [u32; 5] = [9600, 19200, 38400, 57600, 115200];

/// Default baud rate for new sessions
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// A line-oriented producer of raw readings
pub trait SampleSource: Send {
    /// Human readable identifier (port path, file name)
    fn name(&self) -> &str;

    /// Next complete line, without its terminator
    ///
    /// `Ok(None)` means nothing complete arrived within the poll window.
    /// Any `Err` is fatal to the session.
    fn next_line(&mut self) -> io::Result<Option<String>>;
}

/// Identifiers of the serial ports currently present on the system
pub fn list_available_sources() -> Result<Vec<String>, serialport::Error> {
    Ok(SerialSource::list_ports()?
        .into_iter()
        .map(|port| port.name)
        .collect())
}
