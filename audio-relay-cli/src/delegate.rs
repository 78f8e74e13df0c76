use std::sync::Arc;

use parking_lot::Mutex;

use audio_relay_core::{ErrorOrigin, RecorderDelegate, RecorderError, RecorderState, RecordingSummary};

/// Recorder delegate for the terminal: logs every event and keeps the
/// errors for the final report.
#[derive(Default)]
pub struct ConsoleDelegate {
    errors: Mutex<Vec<RecorderError>>,
}

impl ConsoleDelegate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn error_count(&self) -> usize {
        self.errors.lock().len()
    }

    /// Errors that ended a sink or capture, as opposed to transient ones.
    pub fn fatal_errors(&self) -> Vec<RecorderError> {
        self.errors
            .lock()
            .iter()
            .filter(|e| match e {
                RecorderError::Capture(c) => c.is_fatal(),
                RecorderError::Stream(s) => s.is_fatal(),
                _ => true,
            })
            .cloned()
            .collect()
    }
}

impl RecorderDelegate for ConsoleDelegate {
    fn on_error(&self, error: &RecorderError) {
        let origin = match error.origin() {
            ErrorOrigin::Capture => "capture",
            ErrorOrigin::Stream => "stream",
            ErrorOrigin::Recorder => "recorder",
        };
        log::warn!("[{}] {}", origin, error);
        self.errors.lock().push(error.clone());
    }

    fn on_state_changed(&self, state: RecorderState) {
        log::info!("Recorder is now {:?}", state);
    }

    fn on_recording_finished(&self, summary: &RecordingSummary) {
        log::info!(
            "Recording {} finished: {:.1}s, {} buffers",
            summary.id,
            summary.duration_secs,
            summary.diagnostics.buffers_captured
        );
    }
}
