use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;

use crate::models::error::CaptureError;
use crate::models::format::AudioFormatDescriptor;
use crate::models::levels::LevelMeterState;
use crate::models::state::BufferState;
use crate::processing::buffer_ring::{BufferRing, DEFAULT_BUFFER_COUNT};
use crate::processing::level_meter::LevelMeter;
use crate::traits::capture_consumer::{CaptureConsumer, CapturedBuffer};
use crate::traits::capture_device::{CaptureDevice, DeviceErrorCallback, InputCallback};

/// Messages from the device thread to the delivery thread.
enum Delivery {
    Started,
    Ready(usize),
    Error(CaptureError),
    Shutdown,
}

/// State of one prepared capture session. Dropped on stop.
struct CaptureSession {
    format: AudioFormatDescriptor,
    ring: Arc<Mutex<BufferRing>>,
    meter: Option<Arc<Mutex<LevelMeter>>>,
    running: Arc<AtomicBool>,
    packet_index: Arc<AtomicU64>,
    delivery_tx: Option<mpsc::Sender<Delivery>>,
    delivery_handle: Option<thread::JoinHandle<()>>,
}

/// Drives a `CaptureDevice` through a fixed ring of capture buffers.
///
/// ```text
/// [device thread] → fill ring → Ready ─mpsc─→ [capture-delivery thread]
///                       ↑                             │ consumer callback
///                       └──────── recycle ────────────┘
/// ```
///
/// The device callback only copies bytes and posts indices; it never waits
/// on the consumer. When every buffer is out with the consumer, incoming
/// bytes are dropped and one `BufferEnqueueFailed` is reported per overrun.
pub struct CaptureEngine<D: CaptureDevice> {
    device: D,
    consumer: Arc<dyn CaptureConsumer>,
    buffer_count: usize,
    session: Option<CaptureSession>,
}

impl<D: CaptureDevice> CaptureEngine<D> {
    pub fn new(device: D, consumer: Arc<dyn CaptureConsumer>) -> Self {
        Self::with_buffer_count(device, consumer, DEFAULT_BUFFER_COUNT)
    }

    pub fn with_buffer_count(device: D, consumer: Arc<dyn CaptureConsumer>, buffer_count: usize) -> Self {
        Self {
            device,
            consumer,
            buffer_count,
            session: None,
        }
    }

    pub fn set_buffer_count(&mut self, buffer_count: usize) {
        self.buffer_count = buffer_count;
    }

    /// Allocate the buffer ring and open the device for `format`.
    ///
    /// Each buffer holds `packets_per_buffer` packets. All buffers start out
    /// submitted to the hardware queue.
    pub fn prepare(
        &mut self,
        format: &AudioFormatDescriptor,
        packets_per_buffer: u32,
    ) -> Result<(), CaptureError> {
        if self.is_running() {
            return Err(CaptureError::QueueOpenFailed("capture is already running".into()));
        }
        // Replace a session that was prepared but never started.
        self.stop();

        format.validate()?;
        let ring = BufferRing::new(self.buffer_count, format.buffer_byte_size(packets_per_buffer))?;
        self.device.open(format)?;

        log::info!(
            "Capture prepared on {}: {} buffers of {} bytes ({:?}, {} Hz, {} ch)",
            self.device.device_name(),
            ring.len(),
            ring.buffer_capacity(),
            format.codec,
            format.sample_rate,
            format.channels
        );

        self.session = Some(CaptureSession {
            format: *format,
            ring: Arc::new(Mutex::new(ring)),
            meter: None,
            running: Arc::new(AtomicBool::new(false)),
            packet_index: Arc::new(AtomicU64::new(0)),
            delivery_tx: None,
            delivery_handle: None,
        });
        Ok(())
    }

    /// Begin capture.
    ///
    /// `Err(MeteringEnableFailed)` is non-fatal: capture is running, only
    /// level data is unavailable. Every other error leaves capture stopped.
    pub fn start(&mut self) -> Result<(), CaptureError> {
        let session = self.session.as_mut().ok_or(CaptureError::NotPrepared)?;
        if session.running.load(Ordering::SeqCst) {
            return Ok(());
        }

        {
            let ring = session.ring.lock();
            if ring.submitted_count() < ring.len() {
                return Err(CaptureError::BufferEnqueueFailed(format!(
                    "only {} of {} buffers could be submitted",
                    ring.submitted_count(),
                    ring.len()
                )));
            }
        }

        let metering_error = match LevelMeter::for_format(session.format) {
            Some(meter) => {
                session.meter = Some(Arc::new(Mutex::new(meter)));
                None
            }
            None => {
                session.meter = None;
                Some(CaptureError::MeteringEnableFailed(format!(
                    "{:?} input cannot be metered",
                    session.format.codec
                )))
            }
        };

        let (tx, rx) = mpsc::channel();
        let handle = {
            let ring = Arc::clone(&session.ring);
            let consumer = Arc::clone(&self.consumer);
            let packet_index = Arc::clone(&session.packet_index);
            let format = session.format;
            thread::Builder::new()
                .name("capture-delivery".into())
                .spawn(move || delivery_loop(rx, ring, consumer, format, packet_index))
                .map_err(|e| {
                    CaptureError::QueueOpenFailed(format!("failed to spawn delivery thread: {}", e))
                })?
        };

        session.running.store(true, Ordering::SeqCst);
        let on_input = input_callback(session, tx.clone());
        let on_error = error_callback(session, tx.clone());

        if let Err(e) = self.device.start(on_input, on_error) {
            session.running.store(false, Ordering::SeqCst);
            let _ = tx.send(Delivery::Shutdown);
            let _ = handle.join();
            session.ring.lock().reset();
            log::error!("Capture device failed to start: {}", e);
            return Err(e);
        }

        let _ = tx.send(Delivery::Started);
        session.delivery_tx = Some(tx);
        session.delivery_handle = Some(handle);
        log::info!("Capture started");

        match metering_error {
            Some(e) => {
                log::warn!("{}", e);
                Err(e)
            }
            None => Ok(()),
        }
    }

    /// Halt capture and release every buffer. Idempotent.
    ///
    /// Buffers already filled, plus the partially filled one, are delivered
    /// to the consumer before this returns.
    pub fn stop(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };

        session.running.store(false, Ordering::SeqCst);
        if let Err(e) = self.device.stop() {
            log::warn!("Capture device did not stop cleanly: {}", e);
        }

        if let Some(tx) = session.delivery_tx.take() {
            let partial = session.ring.lock().flush_partial();
            if let Some(index) = partial {
                let _ = tx.send(Delivery::Ready(index));
            }
            let _ = tx.send(Delivery::Shutdown);
        }
        if let Some(handle) = session.delivery_handle.take() {
            if handle.join().is_err() {
                log::error!("Capture delivery thread panicked");
            }
        }

        session.ring.lock().reset();
        log::info!(
            "Capture stopped after {} packets",
            session.packet_index.load(Ordering::SeqCst)
        );
    }

    pub fn is_prepared(&self) -> bool {
        self.session.is_some()
    }

    /// Whether the hardware is delivering input. False after a fatal device error.
    pub fn is_running(&self) -> bool {
        self.session
            .as_ref()
            .map(|s| s.running.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    pub fn current_level(&self) -> Result<LevelMeterState, CaptureError> {
        let session = self
            .session
            .as_ref()
            .ok_or_else(|| CaptureError::LevelQueryFailed("capture is not prepared".into()))?;
        let meter = session
            .meter
            .as_ref()
            .ok_or_else(|| CaptureError::LevelQueryFailed("level metering is not enabled".into()))?;
        let state = meter.lock().snapshot();
        Ok(state)
    }

    pub fn format(&self) -> Option<AudioFormatDescriptor> {
        self.session.as_ref().map(|s| s.format)
    }

    pub fn buffer_states(&self) -> Vec<BufferState> {
        self.session
            .as_ref()
            .map(|s| s.ring.lock().states())
            .unwrap_or_default()
    }

    pub fn device(&self) -> &D {
        &self.device
    }
}

impl<D: CaptureDevice> Drop for CaptureEngine<D> {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Builds the real-time callback: meter, copy into the ring, post indices.
fn input_callback(session: &CaptureSession, tx: mpsc::Sender<Delivery>) -> InputCallback {
    let ring = Arc::clone(&session.ring);
    let meter = session.meter.clone();
    let running = Arc::clone(&session.running);
    let overrun = AtomicBool::new(false);

    Arc::new(move |bytes: &[u8]| {
        if !running.load(Ordering::Acquire) {
            return;
        }

        if let Some(meter) = meter.as_ref() {
            // Skip metering rather than wait on a level query.
            if let Some(mut meter) = meter.try_lock() {
                meter.process(bytes);
            }
        }

        let dropped = ring.lock().fill(bytes, |index| {
            let _ = tx.send(Delivery::Ready(index));
        });

        if dropped == 0 {
            overrun.store(false, Ordering::Release);
        } else if !overrun.swap(true, Ordering::AcqRel) {
            let _ = tx.send(Delivery::Error(CaptureError::BufferEnqueueFailed(format!(
                "no free capture buffer, dropped {} bytes",
                dropped
            ))));
        }
    })
}

fn error_callback(session: &CaptureSession, tx: mpsc::Sender<Delivery>) -> DeviceErrorCallback {
    let running = Arc::clone(&session.running);
    Arc::new(move |error: CaptureError| {
        if error.is_fatal() {
            running.store(false, Ordering::SeqCst);
        }
        let _ = tx.send(Delivery::Error(error));
    })
}

fn delivery_loop(
    rx: mpsc::Receiver<Delivery>,
    ring: Arc<Mutex<BufferRing>>,
    consumer: Arc<dyn CaptureConsumer>,
    format: AudioFormatDescriptor,
    packet_index: Arc<AtomicU64>,
) {
    let mut started = false;
    while let Ok(message) = rx.recv() {
        match message {
            Delivery::Started => {
                started = true;
                consumer.on_capture_started();
            }
            Delivery::Ready(index) => {
                let taken = ring.lock().take_ready(index);
                let Some((data, len)) = taken else {
                    continue;
                };
                let packet_count = format.packet_count(len);
                let first_packet = packet_index.fetch_add(packet_count, Ordering::SeqCst);
                consumer.on_buffer_captured(&CapturedBuffer {
                    index,
                    bytes: &data[..len],
                    packet_index: first_packet,
                    packet_count,
                });
                ring.lock().recycle(index, data);
            }
            Delivery::Error(error) => {
                if error.is_fatal() {
                    log::error!("Capture failed: {}", error);
                } else {
                    log::warn!("Capture degraded: {}", error);
                }
                consumer.on_capture_error(&error);
            }
            Delivery::Shutdown => break,
        }
    }
    if started {
        consumer.on_capture_stopped();
    }
}
