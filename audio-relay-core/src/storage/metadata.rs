use std::fs;
use std::path::{Path, PathBuf};

use crate::models::error::CaptureError;
use crate::models::recording_result::RecordingSummary;

/// Sidecar path for a recording: `{file name}.metadata.json` next to it.
///
/// The full name is kept, so `take.raw` and `take.pcm` get separate sidecars.
pub fn metadata_path(recording_path: &Path) -> PathBuf {
    let mut name = recording_path.as_os_str().to_os_string();
    name.push(".metadata.json");
    PathBuf::from(name)
}

/// Write the recording summary as a JSON sidecar file.
pub fn write_metadata(summary: &RecordingSummary, recording_path: &Path) -> Result<PathBuf, CaptureError> {
    let path = metadata_path(recording_path);
    let json = serde_json::to_string_pretty(summary).map_err(|e| {
        CaptureError::AudioFileWriteFailed(format!("failed to serialize metadata: {}", e))
    })?;
    fs::write(&path, json)
        .map_err(|e| CaptureError::AudioFileWriteFailed(format!("failed to write metadata: {}", e)))?;
    Ok(path)
}

pub fn read_metadata(recording_path: &Path) -> Result<RecordingSummary, CaptureError> {
    let path = metadata_path(recording_path);
    let json = fs::read_to_string(&path)
        .map_err(|e| CaptureError::MetadataReadFailed(format!("{}: {}", path.display(), e)))?;
    serde_json::from_str(&json)
        .map_err(|e| CaptureError::MetadataReadFailed(format!("{}: invalid JSON: {}", path.display(), e)))
}
