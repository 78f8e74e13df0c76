use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::models::error::CaptureError;
use crate::models::recording_result::FileOutcome;

/// Append-only local file receiving the raw captured byte stream.
///
/// The file is created or truncated on open. Each buffer is written
/// straight through, so a failing disk is reported on the buffer that hit
/// it. A SHA-256 of everything written is kept incrementally, so closing
/// never re-reads the file. Not thread-safe; the coordinator wraps it in a
/// `Mutex`.
pub struct FileSink {
    path: PathBuf,
    file: File,
    hasher: Sha256,
    bytes_written: u64,
}

impl FileSink {
    pub fn create(path: &Path) -> Result<Self, CaptureError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                CaptureError::AudioFileCreateFailed(format!("failed to create directory: {}", e))
            })?;
        }

        let file = File::create(path).map_err(|e| {
            CaptureError::AudioFileCreateFailed(format!("{}: {}", path.display(), e))
        })?;
        log::info!("Recording to {}", path.display());

        Ok(Self {
            path: path.to_path_buf(),
            file,
            hasher: Sha256::new(),
            bytes_written: 0,
        })
    }

    /// Append one captured buffer verbatim.
    pub fn append(&mut self, bytes: &[u8]) -> Result<(), CaptureError> {
        self.file
            .write_all(bytes)
            .map_err(|e| CaptureError::AudioFileWriteFailed(format!("write failed: {}", e)))?;
        self.hasher.update(bytes);
        self.bytes_written += bytes.len() as u64;
        Ok(())
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sync to disk and return the path, size, and checksum.
    pub fn close(self) -> Result<FileOutcome, CaptureError> {
        self.file
            .sync_all()
            .map_err(|e| CaptureError::AudioFileWriteFailed(format!("sync failed: {}", e)))?;

        let checksum = hex_encode(&self.hasher.finalize());
        log::info!(
            "Closed {} ({} bytes, sha256 {})",
            self.path.display(),
            self.bytes_written,
            checksum
        );
        Ok(FileOutcome {
            path: self.path,
            bytes_written: self.bytes_written,
            checksum,
        })
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
