use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::models::error::{CaptureError, RecorderError, StreamError};
use crate::models::recording_result::RecorderDiagnostics;
use crate::storage::file_sink::FileSink;
use crate::streaming::sender::StreamSender;
use crate::traits::capture_consumer::{CaptureConsumer, CapturedBuffer};
use crate::traits::recorder_delegate::RecorderDelegate;
use crate::traits::stream_delegate::StreamDelegate;

/// Hands every captured buffer to the file and the stream independently.
///
/// ```text
///                       ┌→ FileSink::append      (error → delegate, continue)
/// CaptureEngine ──→ FanOut
///                       └→ StreamSender::send    (blocked → drop, delegate, continue)
/// ```
///
/// Neither sink can stop capture or starve the other. Also the stream's
/// delegate, so stream failures reach the recorder delegate.
pub(crate) struct FanOut {
    file: Mutex<Option<FileSink>>,
    stream: Mutex<Option<Arc<StreamSender>>>,
    diagnostics: Mutex<RecorderDiagnostics>,
    delegate: RwLock<Option<Arc<dyn RecorderDelegate>>>,
    stream_observer: RwLock<Option<Arc<dyn StreamDelegate>>>,
    file_failing: AtomicBool,
    stream_blocked: AtomicBool,
}

impl FanOut {
    pub fn new() -> Self {
        Self {
            file: Mutex::new(None),
            stream: Mutex::new(None),
            diagnostics: Mutex::new(RecorderDiagnostics::default()),
            delegate: RwLock::new(None),
            stream_observer: RwLock::new(None),
            file_failing: AtomicBool::new(false),
            stream_blocked: AtomicBool::new(false),
        }
    }

    pub fn set_delegate(&self, delegate: Option<Arc<dyn RecorderDelegate>>) {
        *self.delegate.write() = delegate;
    }

    pub fn delegate(&self) -> Option<Arc<dyn RecorderDelegate>> {
        self.delegate.read().clone()
    }

    pub fn set_stream_observer(&self, observer: Option<Arc<dyn StreamDelegate>>) {
        *self.stream_observer.write() = observer;
    }

    /// Start a new session with fresh counters.
    pub fn begin(&self, file: Option<FileSink>, stream: Option<Arc<StreamSender>>) {
        *self.file.lock() = file;
        *self.stream.lock() = stream;
        *self.diagnostics.lock() = RecorderDiagnostics::default();
        self.file_failing.store(false, Ordering::SeqCst);
        self.stream_blocked.store(false, Ordering::SeqCst);
    }

    pub fn take_file(&self) -> Option<FileSink> {
        self.file.lock().take()
    }

    pub fn take_stream(&self) -> Option<Arc<StreamSender>> {
        self.stream.lock().take()
    }

    pub fn stream(&self) -> Option<Arc<StreamSender>> {
        self.stream.lock().clone()
    }

    pub fn diagnostics(&self) -> RecorderDiagnostics {
        self.diagnostics.lock().clone()
    }

    /// Deliver an error to the delegate, or log it when there is none.
    pub fn report(&self, error: RecorderError) {
        match self.delegate() {
            Some(delegate) => delegate.on_error(&error),
            None => log::warn!("Unhandled recorder error ({:?}): {}", error.kind(), error),
        }
    }

    fn write_file(&self, bytes: &[u8]) {
        let result = match self.file.lock().as_mut() {
            Some(sink) => sink.append(bytes),
            None => return,
        };

        let mut diagnostics = self.diagnostics.lock();
        match result {
            Ok(()) => {
                diagnostics.file_bytes_written += bytes.len() as u64;
                self.file_failing.store(false, Ordering::Relaxed);
            }
            Err(e) => {
                diagnostics.file_write_failures += 1;
                drop(diagnostics);
                if !self.file_failing.swap(true, Ordering::Relaxed) {
                    log::error!("File write failed: {}", e);
                    self.report(e.into());
                }
            }
        }
    }

    fn send_stream(&self, bytes: &[u8]) {
        let Some(sender) = self.stream() else {
            return;
        };

        // Payloads are queued while connecting and written after the header.
        let result = if sender.state().accepts_payloads() {
            sender.send(bytes)
        } else {
            Err(StreamError::NotOpen)
        };

        let mut diagnostics = self.diagnostics.lock();
        match result {
            Ok(()) => {
                diagnostics.stream_bytes_queued += bytes.len() as u64;
                self.stream_blocked.store(false, Ordering::Relaxed);
            }
            Err(StreamError::StreamBlocked) => {
                diagnostics.stream_buffers_dropped += 1;
                drop(diagnostics);
                if !self.stream_blocked.swap(true, Ordering::Relaxed) {
                    log::warn!("Stream blocked, dropping buffers until it drains");
                    self.report(StreamError::StreamBlocked.into());
                }
            }
            // Fatal stream errors were already reported by the event loop.
            Err(_) => diagnostics.stream_buffers_dropped += 1,
        }
    }
}

impl CaptureConsumer for FanOut {
    fn on_buffer_captured(&self, buffer: &CapturedBuffer<'_>) {
        {
            let mut diagnostics = self.diagnostics.lock();
            diagnostics.buffers_captured += 1;
            diagnostics.bytes_captured += buffer.byte_count() as u64;
        }
        self.write_file(buffer.bytes);
        self.send_stream(buffer.bytes);
    }

    fn on_capture_error(&self, error: &CaptureError) {
        if matches!(error, CaptureError::BufferEnqueueFailed(_)) {
            self.diagnostics.lock().capture_overruns += 1;
        }
        self.report(error.clone().into());
    }
}

impl StreamDelegate for FanOut {
    fn on_connection_opened(&self) {
        if let Some(observer) = self.stream_observer.read().clone() {
            observer.on_connection_opened();
        }
    }

    fn on_connection_closed(&self) {
        if let Some(observer) = self.stream_observer.read().clone() {
            observer.on_connection_closed();
        }
    }

    fn on_header_sent(&self, header: &[u8]) {
        if let Some(observer) = self.stream_observer.read().clone() {
            observer.on_header_sent(header);
        }
    }

    fn on_bytes_written(&self, bytes: &[u8]) {
        if let Some(observer) = self.stream_observer.read().clone() {
            observer.on_bytes_written(bytes);
        }
    }

    fn on_error(&self, error: &StreamError) {
        if let Some(observer) = self.stream_observer.read().clone() {
            observer.on_error(error);
        }
        self.report(error.clone().into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::RecorderEventLog;

    fn buffer(bytes: &[u8]) -> CapturedBuffer<'_> {
        CapturedBuffer {
            index: 0,
            bytes,
            packet_index: 0,
            packet_count: 1,
        }
    }

    #[test]
    fn counts_buffers_without_sinks() {
        let fan_out = FanOut::new();
        fan_out.on_buffer_captured(&buffer(&[0; 16]));
        fan_out.on_buffer_captured(&buffer(&[0; 16]));

        let diagnostics = fan_out.diagnostics();
        assert_eq!(diagnostics.buffers_captured, 2);
        assert_eq!(diagnostics.bytes_captured, 32);
        assert_eq!(diagnostics.file_bytes_written, 0);
    }

    #[test]
    fn file_sink_receives_each_buffer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.raw");
        let fan_out = FanOut::new();
        fan_out.begin(Some(FileSink::create(&path).unwrap()), None);

        fan_out.on_buffer_captured(&buffer(&[1, 2]));
        fan_out.on_buffer_captured(&buffer(&[3]));
        let outcome = fan_out.take_file().unwrap().close().unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), vec![1, 2, 3]);
        assert_eq!(outcome.bytes_written, 3);
        assert_eq!(fan_out.diagnostics().file_bytes_written, 3);
    }

    #[test]
    fn overruns_are_counted_and_reported() {
        let fan_out = FanOut::new();
        let events = Arc::new(RecorderEventLog::default());
        fan_out.set_delegate(Some(events.clone()));

        fan_out.on_capture_error(&CaptureError::BufferEnqueueFailed("full".into()));

        assert_eq!(fan_out.diagnostics().capture_overruns, 1);
        assert_eq!(events.error_kinds(), vec![crate::models::error::ErrorKind::BufferEnqueueFailed]);
    }

    #[test]
    fn begin_resets_counters() {
        let fan_out = FanOut::new();
        fan_out.on_buffer_captured(&buffer(&[0; 4]));
        fan_out.begin(None, None);
        assert_eq!(fan_out.diagnostics(), RecorderDiagnostics::default());
    }
}
