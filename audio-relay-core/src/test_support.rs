//! Scripted device and recording consumers shared by unit tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::models::error::{CaptureError, ErrorKind, RecorderError, StreamError};
use crate::models::format::AudioFormatDescriptor;
use crate::models::recording_result::RecordingSummary;
use crate::models::state::RecorderState;
use crate::traits::capture_consumer::{CaptureConsumer, CapturedBuffer};
use crate::traits::capture_device::{CaptureDevice, DeviceErrorCallback, InputCallback};
use crate::traits::recorder_delegate::RecorderDelegate;
use crate::traits::stream_delegate::StreamDelegate;

/// Poll `condition` until it holds, panicking after two seconds.
pub fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not met within 2s");
        std::thread::sleep(Duration::from_millis(2));
    }
}

#[derive(Default)]
struct ScriptedState {
    on_input: Option<InputCallback>,
    on_error: Option<DeviceErrorCallback>,
    open_error: Option<CaptureError>,
    start_error: Option<CaptureError>,
    format: Option<AudioFormatDescriptor>,
    started: bool,
    stop_calls: usize,
}

/// In-memory capture device. Clones share state, so a test keeps one handle
/// and pushes input after the engine takes ownership of the other.
#[derive(Clone, Default)]
pub struct ScriptedDevice {
    state: Arc<Mutex<ScriptedState>>,
}

impl ScriptedDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_open(error: CaptureError) -> Self {
        let device = Self::new();
        device.state.lock().open_error = Some(error);
        device
    }

    pub fn fail_next_start(&self, error: CaptureError) {
        self.state.lock().start_error = Some(error);
    }

    /// Deliver input on the calling thread, as a hardware callback would.
    pub fn push(&self, bytes: &[u8]) {
        let callback = self.state.lock().on_input.clone();
        if let Some(callback) = callback {
            callback(bytes);
        }
    }

    pub fn fail(&self, error: CaptureError) {
        let callback = self.state.lock().on_error.clone();
        if let Some(callback) = callback {
            callback(error);
        }
    }

    pub fn is_open(&self) -> bool {
        self.state.lock().format.is_some()
    }

    pub fn is_started(&self) -> bool {
        self.state.lock().started
    }

    pub fn stop_calls(&self) -> usize {
        self.state.lock().stop_calls
    }
}

impl CaptureDevice for ScriptedDevice {
    fn open(&mut self, format: &AudioFormatDescriptor) -> Result<(), CaptureError> {
        let mut state = self.state.lock();
        if let Some(error) = state.open_error.clone() {
            return Err(error);
        }
        state.format = Some(*format);
        Ok(())
    }

    fn start(&mut self, on_input: InputCallback, on_error: DeviceErrorCallback) -> Result<(), CaptureError> {
        let mut state = self.state.lock();
        if let Some(error) = state.start_error.take() {
            return Err(error);
        }
        state.on_input = Some(on_input);
        state.on_error = Some(on_error);
        state.started = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), CaptureError> {
        let mut state = self.state.lock();
        state.on_input = None;
        state.on_error = None;
        state.format = None;
        state.started = false;
        state.stop_calls += 1;
        Ok(())
    }

    fn device_name(&self) -> String {
        "scripted".into()
    }
}

#[derive(Debug, Clone)]
pub struct ReceivedBuffer {
    pub index: usize,
    pub bytes: Vec<u8>,
    pub packet_index: u64,
    pub packet_count: u64,
}

/// Consumer that records everything it is handed.
///
/// A `blocking()` consumer parks inside the first buffer callback until
/// `release()` is called.
#[derive(Default)]
pub struct CollectingConsumer {
    buffers: Mutex<Vec<ReceivedBuffer>>,
    errors: Mutex<Vec<CaptureError>>,
    started: AtomicUsize,
    stopped: AtomicUsize,
    block: AtomicBool,
    in_callback: AtomicBool,
    gate: Mutex<bool>,
    gate_open: Condvar,
}

impl CollectingConsumer {
    pub fn blocking() -> Self {
        let consumer = Self::default();
        consumer.block.store(true, Ordering::SeqCst);
        consumer
    }

    pub fn release(&self) {
        let mut open = self.gate.lock();
        *open = true;
        self.gate_open.notify_all();
    }

    pub fn in_callback(&self) -> bool {
        self.in_callback.load(Ordering::SeqCst)
    }

    pub fn buffers(&self) -> Vec<ReceivedBuffer> {
        self.buffers.lock().clone()
    }

    pub fn buffer_count(&self) -> usize {
        self.buffers.lock().len()
    }

    pub fn errors(&self) -> Vec<CaptureError> {
        self.errors.lock().clone()
    }

    pub fn started_count(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn stopped_count(&self) -> usize {
        self.stopped.load(Ordering::SeqCst)
    }
}

impl CaptureConsumer for CollectingConsumer {
    fn on_buffer_captured(&self, buffer: &CapturedBuffer<'_>) {
        if self.block.load(Ordering::SeqCst) {
            self.in_callback.store(true, Ordering::SeqCst);
            let mut open = self.gate.lock();
            while !*open {
                self.gate_open.wait(&mut open);
            }
        }
        self.buffers.lock().push(ReceivedBuffer {
            index: buffer.index,
            bytes: buffer.bytes.to_vec(),
            packet_index: buffer.packet_index,
            packet_count: buffer.packet_count,
        });
    }

    fn on_capture_error(&self, error: &CaptureError) {
        self.errors.lock().push(error.clone());
    }

    fn on_capture_started(&self) {
        self.started.fetch_add(1, Ordering::SeqCst);
    }

    fn on_capture_stopped(&self) {
        self.stopped.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Opened,
    HeaderSent(usize),
    BytesWritten(usize),
    Error(ErrorKind),
    Closed,
}

/// Stream delegate that logs every callback. A `holding_open()` log parks
/// the event loop inside `on_connection_opened` until `release()`.
#[derive(Default)]
pub struct StreamEventLog {
    events: Mutex<Vec<StreamEvent>>,
    hold: AtomicBool,
    holding: AtomicBool,
    gate: Mutex<bool>,
    gate_open: Condvar,
}

impl StreamEventLog {
    pub fn holding_open() -> Self {
        let log = Self::default();
        log.hold.store(true, Ordering::SeqCst);
        log
    }

    pub fn is_holding(&self) -> bool {
        self.holding.load(Ordering::SeqCst)
    }

    pub fn release(&self) {
        let mut open = self.gate.lock();
        *open = true;
        self.gate_open.notify_all();
    }

    pub fn events(&self) -> Vec<StreamEvent> {
        self.events.lock().clone()
    }
}

impl StreamDelegate for StreamEventLog {
    fn on_connection_opened(&self) {
        self.events.lock().push(StreamEvent::Opened);
        if self.hold.load(Ordering::SeqCst) {
            self.holding.store(true, Ordering::SeqCst);
            let mut open = self.gate.lock();
            while !*open {
                self.gate_open.wait(&mut open);
            }
        }
    }

    fn on_connection_closed(&self) {
        self.events.lock().push(StreamEvent::Closed);
    }

    fn on_header_sent(&self, header: &[u8]) {
        self.events.lock().push(StreamEvent::HeaderSent(header.len()));
    }

    fn on_bytes_written(&self, bytes: &[u8]) {
        self.events.lock().push(StreamEvent::BytesWritten(bytes.len()));
    }

    fn on_error(&self, error: &StreamError) {
        self.events.lock().push(StreamEvent::Error(error.kind()));
    }
}

/// Recorder delegate that keeps every event.
#[derive(Default)]
pub struct RecorderEventLog {
    errors: Mutex<Vec<RecorderError>>,
    states: Mutex<Vec<RecorderState>>,
    summaries: Mutex<Vec<RecordingSummary>>,
}

impl RecorderEventLog {
    pub fn errors(&self) -> Vec<RecorderError> {
        self.errors.lock().clone()
    }

    pub fn error_kinds(&self) -> Vec<ErrorKind> {
        self.errors.lock().iter().map(|e| e.kind()).collect()
    }

    pub fn states(&self) -> Vec<RecorderState> {
        self.states.lock().clone()
    }

    pub fn summaries(&self) -> Vec<RecordingSummary> {
        self.summaries.lock().clone()
    }
}

impl RecorderDelegate for RecorderEventLog {
    fn on_error(&self, error: &RecorderError) {
        self.errors.lock().push(error.clone());
    }

    fn on_state_changed(&self, state: RecorderState) {
        self.states.lock().push(state);
    }

    fn on_recording_finished(&self, summary: &RecordingSummary) {
        self.summaries.lock().push(summary.clone());
    }
}
