//! Serial port transport
//!
//! Reads newline-terminated readings from a serial device (typically a
//! microcontroller streaming one ADC value per line). Reads use a short
//! timeout so the ingestion loop can notice stop requests promptly.

use super::SampleSource;
use serialport::{SerialPort, SerialPortType};
use std::io::{self, BufRead, BufReader};
use std::time::Duration;

pub struct SerialSource {
    name: String,
    reader: BufReader<Box<dyn SerialPort>>,
    /// Bytes of a line that has not been terminated yet
    pending: Vec<u8>,
}

/// Information about a serial port present on the system
#[derive(Debug, Clone)]
pub struct SerialSourceInfo {
    pub name: String,
    pub kind: String,
    pub description: Option<String>,
}

impl SerialSource {
    /// Open `port` at `baud_rate`
    pub fn open(port: &str, baud_rate: u32, read_timeout: Duration) -> serialport::Result<Self> {
        let serial = serialport::new(port, baud_rate)
            .timeout(read_timeout)
            .open()?;

        log::info!("Opened serial port {} at {} baud", port, baud_rate);

        Ok(Self {
            name: port.to_string(),
            reader: BufReader::new(serial),
            pending: Vec::with_capacity(64),
        })
    }

    /// List all serial ports with a short description of each
    pub fn list_ports() -> serialport::Result<Vec<SerialSourceInfo>> {
        let mut ports: Vec<SerialSourceInfo> = serialport::available_ports()?
            .into_iter()
            .map(|port| {
                let (kind, description) = match port.port_type {
                    SerialPortType::UsbPort(usb) => {
                        let label = [usb.manufacturer, usb.product]
                            .into_iter()
                            .flatten()
                            .collect::<Vec<_>>()
                            .join(" ");
                        let id = format!("{:04x}:{:04x}", usb.vid, usb.pid);
                        let description = if label.is_empty() {
                            id
                        } else {
                            format!("{} ({})", label, id)
                        };
                        ("USB", Some(description))
                    }
                    SerialPortType::PciPort => ("PCI", None),
                    SerialPortType::BluetoothPort => ("Bluetooth", None),
                    SerialPortType::Unknown => ("Unknown", None),
                };

                SerialSourceInfo {
                    name: port.port_name,
                    kind: kind.to_string(),
                    description,
                }
            })
            .collect();

        ports.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(ports)
    }
}

impl SampleSource for SerialSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn next_line(&mut self) -> io::Result<Option<String>> {
        match self.reader.read_until(b'\n', &mut self.pending) {
            Ok(0) => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("serial port {} closed", self.name),
            )),
            Ok(_) => Ok(take_line(&mut self.pending)),
            // A timeout leaves any partial line in `pending` for the next call
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                ) =>
            {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

/// Split a completed line off the pending bytes
fn take_line(pending: &mut Vec<u8>) -> Option<String> {
    if pending.last() != Some(&b'\n') {
        return None;
    }

    let line = String::from_utf8_lossy(pending)
        .trim_end_matches(['\r', '\n'])
        .to_string();
    pending.clear();
    Some(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_line_requires_terminator() {
        let mut pending = b"51".to_vec();
        assert_eq!(take_line(&mut pending), None);
        assert_eq!(pending, b"51");

        pending.extend_from_slice(b"2\r\n");
        assert_eq!(take_line(&mut pending), Some("512".to_string()));
        assert!(pending.is_empty());
    }

    #[test]
    fn test_take_line_tolerates_invalid_utf8() {
        let mut pending = vec![0xff, b'1', b'\n'];
        let line = take_line(&mut pending).unwrap();
        assert!(line.ends_with('1'));
        assert_eq!(crate::signal::parse_sample(&line), None);
    }

    #[test]
    fn test_open_missing_port_fails() {
        let result = SerialSource::open(
            "/dev/ecgmon-test-missing-port",
            9600,
            Duration::from_millis(10),
        );
        assert!(result.is_err());
    }
}
