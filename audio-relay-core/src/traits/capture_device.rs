use std::sync::Arc;

use crate::models::error::CaptureError;
use crate::models::format::AudioFormatDescriptor;

/// Callback invoked with raw bytes encoded in the opened stream format.
///
/// Runs on the device's real-time thread: copy and return, never block.
pub type InputCallback = Arc<dyn Fn(&[u8]) + Send + Sync + 'static>;

/// Callback invoked when the device reports a runtime failure.
///
/// `CaptureError::DeviceLost` means the hardware queue was torn down.
pub type DeviceErrorCallback = Arc<dyn Fn(CaptureError) + Send + Sync + 'static>;

/// Hardware capture queue behind the capture engine.
///
/// Implemented by:
/// - `CpalInputDevice` (audio-relay-cpal)
pub trait CaptureDevice: Send {
    /// Open the hardware queue for `format`.
    ///
    /// Fails with `QueueOpenFailed` when the device or format is unavailable.
    fn open(&mut self, format: &AudioFormatDescriptor) -> Result<(), CaptureError>;

    /// Begin delivering input. Requires a successful `open`.
    fn start(
        &mut self,
        on_input: InputCallback,
        on_error: DeviceErrorCallback,
    ) -> Result<(), CaptureError>;

    /// Stop delivering input and release the hardware queue.
    ///
    /// No callback may fire after this returns.
    fn stop(&mut self) -> Result<(), CaptureError>;

    /// Human-readable name of the backing device.
    fn device_name(&self) -> String;
}
