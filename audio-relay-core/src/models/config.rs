use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::RecorderError;
use super::format::{AudioFormatDescriptor, DEFAULT_BUFFER_DURATION};
use crate::processing::buffer_ring::DEFAULT_BUFFER_COUNT;

/// Host and port of the remote stream sink.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemoteDestination {
    pub host: String,
    pub port: u16,
}

impl std::fmt::Display for RemoteDestination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Configuration for a recording session.
///
/// Frozen from `prepare_for_recording()` until `stop()`. Either destination,
/// both, or neither may be set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfiguration {
    /// File receiving the raw captured byte stream (created or truncated).
    pub local_destination: Option<PathBuf>,

    /// Remote host for the stream sink. Needs `remote_port` as well.
    pub remote_host: Option<String>,

    pub remote_port: Option<u16>,

    /// Preamble written once to the stream before any audio bytes.
    pub header: Option<Vec<u8>>,

    /// Stream format produced by the capture device.
    pub format: AudioFormatDescriptor,

    /// Capture ring size (default: 3).
    pub buffer_count: usize,

    /// Packets per capture buffer; None derives it from a 100 ms buffer.
    pub packets_per_buffer: Option<u32>,

    /// Buffers the stream sender queues before reporting `StreamBlocked`.
    pub stream_queue_depth: usize,

    pub connect_timeout_ms: u64,

    /// How long closing waits for queued stream bytes to drain.
    pub close_linger_ms: u64,

    /// Write `{file}.metadata.json` next to the local file on stop.
    pub write_metadata_sidecar: bool,
}

impl RecordingConfiguration {
    /// The stream destination, present only when host and port are both set.
    pub fn remote_destination(&self) -> Option<RemoteDestination> {
        match (&self.remote_host, self.remote_port) {
            (Some(host), Some(port)) => Some(RemoteDestination {
                host: host.clone(),
                port,
            }),
            _ => None,
        }
    }

    pub fn packets_per_buffer(&self) -> u32 {
        self.packets_per_buffer
            .unwrap_or_else(|| self.format.packets_for_duration(DEFAULT_BUFFER_DURATION))
    }

    pub fn buffer_byte_size(&self) -> usize {
        self.format.buffer_byte_size(self.packets_per_buffer())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn close_linger(&self) -> Duration {
        Duration::from_millis(self.close_linger_ms)
    }

    pub fn validate(&self) -> Result<(), String> {
        self.format.validate().map_err(|e| e.to_string())?;
        if self.buffer_count == 0 {
            return Err("buffer count must be at least 1".into());
        }
        if self.packets_per_buffer == Some(0) {
            return Err("packets per buffer must be at least 1".into());
        }
        if self.stream_queue_depth == 0 {
            return Err("stream queue depth must be at least 1".into());
        }
        match (&self.remote_host, self.remote_port) {
            (Some(host), _) if host.trim().is_empty() => {
                return Err("remote host must not be empty".into())
            }
            (Some(_), None) => return Err("remote host is set without a port".into()),
            (None, Some(_)) => return Err("remote port is set without a host".into()),
            _ => {}
        }
        if self.remote_port == Some(0) {
            return Err("remote port must be non-zero".into());
        }
        Ok(())
    }

    pub fn from_json_str(json: &str) -> Result<Self, RecorderError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| RecorderError::InvalidConfiguration(format!("failed to parse: {}", e)))?;
        config.validate().map_err(RecorderError::InvalidConfiguration)?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, RecorderError> {
        let json = fs::read_to_string(path).map_err(|e| {
            RecorderError::InvalidConfiguration(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&json)
    }
}

impl Default for RecordingConfiguration {
    fn default() -> Self {
        Self {
            local_destination: None,
            remote_host: None,
            remote_port: None,
            header: None,
            format: AudioFormatDescriptor::default(),
            buffer_count: DEFAULT_BUFFER_COUNT,
            packets_per_buffer: None,
            stream_queue_depth: 8,
            connect_timeout_ms: 5000,
            close_linger_ms: 250,
            write_metadata_sidecar: false,
        }
    }
}
