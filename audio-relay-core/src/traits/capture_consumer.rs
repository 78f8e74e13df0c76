use crate::models::error::CaptureError;

/// A filled capture buffer, lent to the consumer for one callback.
#[derive(Debug, Clone, Copy)]
pub struct CapturedBuffer<'a> {
    /// Slot of this buffer in the ring.
    pub index: usize,
    pub bytes: &'a [u8],
    /// Index of the first packet in this buffer since capture started.
    pub packet_index: u64,
    pub packet_count: u64,
}

impl CapturedBuffer<'_> {
    pub fn byte_count(&self) -> usize {
        self.bytes.len()
    }
}

/// Receives buffers from the capture engine.
///
/// All methods are called from the engine's delivery thread, one at a time.
/// Only `on_buffer_captured` is required.
pub trait CaptureConsumer: Send + Sync {
    /// Called exactly once per filled buffer. Return promptly: the buffer goes
    /// back to the hardware queue when this returns.
    fn on_buffer_captured(&self, buffer: &CapturedBuffer<'_>);

    /// Steady-state capture failures (overruns, device loss). Default: ignore.
    fn on_capture_error(&self, _error: &CaptureError) {}

    fn on_capture_started(&self) {}

    fn on_capture_stopped(&self) {}
}
