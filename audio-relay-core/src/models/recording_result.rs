use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::config::RemoteDestination;
use super::format::AudioFormatDescriptor;

/// Counters for debugging a recording session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecorderDiagnostics {
    pub buffers_captured: u64,
    pub bytes_captured: u64,
    pub file_bytes_written: u64,
    pub file_write_failures: u64,
    pub stream_bytes_queued: u64,
    /// Buffers not handed to the stream (blocked or connection not open).
    pub stream_buffers_dropped: u64,
    pub capture_overruns: u64,
}

/// What the local file sink produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileOutcome {
    pub path: PathBuf,
    pub bytes_written: u64,
    /// SHA-256 of everything written, hex encoded.
    pub checksum: String,
}

/// What the stream sink produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamOutcome {
    pub destination: RemoteDestination,
    pub header_sent: bool,
    pub bytes_written: u64,
}

/// Result of one record/stop cycle, delivered on stop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingSummary {
    pub id: String,
    pub started_at: String,
    pub duration_secs: f64,
    pub format: AudioFormatDescriptor,
    pub diagnostics: RecorderDiagnostics,
    pub file: Option<FileOutcome>,
    pub stream: Option<StreamOutcome>,
}

impl RecordingSummary {
    pub fn new(format: AudioFormatDescriptor) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            started_at: chrono::Utc::now().to_rfc3339(),
            duration_secs: 0.0,
            format,
            diagnostics: RecorderDiagnostics::default(),
            file: None,
            stream: None,
        }
    }

    /// Audio duration implied by the captured byte count.
    pub fn captured_duration_secs(&self) -> f64 {
        self.format
            .duration_of(self.diagnostics.bytes_captured)
            .as_secs_f64()
    }
}
