use crate::models::error::StreamError;

/// Observer for stream sender events.
///
/// Every method runs on the sender's event-loop thread, never concurrently
/// with another. All have no-op defaults.
pub trait StreamDelegate: Send + Sync {
    fn on_connection_opened(&self) {}

    fn on_connection_closed(&self) {}

    fn on_header_sent(&self, _header: &[u8]) {}

    /// Bytes that reached the socket.
    fn on_bytes_written(&self, _bytes: &[u8]) {}

    fn on_error(&self, _error: &StreamError) {}
}
