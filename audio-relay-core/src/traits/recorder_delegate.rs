use crate::models::error::RecorderError;
use crate::models::recording_result::RecordingSummary;
use crate::models::state::RecorderState;

/// Event delegate for the recording coordinator.
///
/// Without a delegate, errors are only logged.
/// Methods may be called from the capture delivery thread or the stream
/// event loop. Implementations should marshal to a UI thread if needed.
pub trait RecorderDelegate: Send + Sync {
    /// Called once per error event. `error.to_string()` is the user-facing message.
    fn on_error(&self, error: &RecorderError);

    fn on_state_changed(&self, _state: RecorderState) {}

    fn on_recording_finished(&self, _summary: &RecordingSummary) {}
}
