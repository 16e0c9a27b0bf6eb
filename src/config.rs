use crate::signal::SampleBuffer;
use crate::source::DEFAULT_BAUD_RATE;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// Default Unix socket path for the ecgmon service
pub const DEFAULT_SOCKET_PATH: &str = "/run/user/$UID/ecgmon/ecgmon.sock";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Settings {
    /// Unix socket the service listens on
    /// `$UID` and `$RUNTIME_DIRECTORY` are expanded
    #[serde(default = "default_socket_path")]
    pub socket_path: String,

    /// Number of recent samples kept for display and detection
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,

    /// Baud rate used when a connect request does not name one
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// Serial read timeout in milliseconds
    /// Bounds how long a stop request waits on a silent port
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    /// Interval between status events sent to subscribers
    #[serde(default = "default_heartbeat_ms")]
    pub heartbeat_ms: u64,
}

fn default_socket_path() -> String {
    DEFAULT_SOCKET_PATH.to_string()
}

fn default_buffer_capacity() -> usize {
    SampleBuffer::DEFAULT_CAPACITY
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

fn default_read_timeout_ms() -> u64 {
    10
}

fn default_heartbeat_ms() -> u64 {
    1000
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            buffer_capacity: default_buffer_capacity(),
            baud_rate: default_baud_rate(),
            read_timeout_ms: default_read_timeout_ms(),
            heartbeat_ms: default_heartbeat_ms(),
        }
    }
}

impl Settings {
    /// Load config from ~/.config/ecgmon/config.toml
    /// Returns default settings if file doesn't exist or fails to parse
    pub fn load() -> Self {
        let Some(path) = config_path() else {
            log::warn!("Could not determine config directory, using defaults");
            return Self::default();
        };

        match fs::read_to_string(&path) {
            Ok(contents) => match Self::parse(&contents) {
                Ok(settings) => {
                    log::info!("Loaded settings from: {}", path.display());
                    settings
                }
                Err(e) => {
                    log::warn!("Failed to parse config: {}, using defaults", e);
                    Self::default()
                }
            },
            Err(_) => {
                log::debug!(
                    "No config file found at {}, using defaults",
                    path.display()
                );
                Self::default()
            }
        }
    }

    pub fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms.max(1))
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_ms.max(50))
    }
}

/// Get the path to the config file: ~/.config/ecgmon/config.toml
pub fn config_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "ecgmon").map(|dirs| dirs.config_dir().join("config.toml"))
}

fn get_uid() -> String {
    std::env::var("UID").unwrap_or_else(|_| {
        // Fallback: use nix to get actual UID
        nix::unistd::getuid().to_string()
    })
}

/// Expand `$UID` and `$RUNTIME_DIRECTORY` in a socket path
pub fn expand_socket_path(path: &str) -> String {
    let expanded = path.replace("$UID", &get_uid());

    // Support $RUNTIME_DIRECTORY for systemd RuntimeDirectory=
    if let Ok(runtime_dir) = std::env::var("RUNTIME_DIRECTORY") {
        expanded.replace("$RUNTIME_DIRECTORY", &runtime_dir)
    } else {
        expanded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        assert_eq!(Settings::parse("").unwrap(), Settings::default());
    }

    #[test]
    fn test_partial_file_overrides_fields() {
        let settings = Settings::parse("buffer_capacity = 250\nbaud_rate = 115200\n").unwrap();
        assert_eq!(settings.buffer_capacity, 250);
        assert_eq!(settings.baud_rate, 115200);
        assert_eq!(settings.socket_path, DEFAULT_SOCKET_PATH);
        assert_eq!(settings.read_timeout(), Duration::from_millis(10));
    }

    #[test]
    fn test_invalid_type_is_an_error() {
        assert!(Settings::parse("buffer_capacity = \"lots\"").is_err());
    }

    #[test]
    fn test_expand_socket_path_replaces_uid() {
        let expanded = expand_socket_path("/run/user/$UID/ecgmon.sock");
        assert!(!expanded.contains("$UID"));
        assert!(expanded.starts_with("/run/user/"));
    }
}
