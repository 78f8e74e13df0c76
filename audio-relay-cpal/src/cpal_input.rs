//! cpal microphone input behind the `CaptureDevice` trait.
//!
//! cpal streams are not `Send` on every host, so the stream lives on a
//! dedicated `cpal-input` thread for its whole life. Device samples are
//! converted to the opened stream format before reaching the engine.

use std::sync::mpsc;
use std::thread;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample, StreamConfig};

use audio_relay_core::models::error::CaptureError;
use audio_relay_core::models::format::AudioFormatDescriptor;
use audio_relay_core::processing::pcm::PcmConverter;
use audio_relay_core::traits::capture_device::{CaptureDevice, DeviceErrorCallback, InputCallback};

/// Microphone capture through the default cpal host.
pub struct CpalInputDevice {
    /// `None` selects the host's default input.
    requested_name: Option<String>,
    label: String,
    format: Option<AudioFormatDescriptor>,
    stop_tx: Option<mpsc::Sender<()>>,
    capture_handle: Option<thread::JoinHandle<()>>,
}

impl CpalInputDevice {
    pub fn default_device() -> Self {
        Self {
            requested_name: None,
            label: "Default Input".into(),
            format: None,
            stop_tx: None,
            capture_handle: None,
        }
    }

    /// Capture from the input device with exactly this name.
    pub fn with_device_name(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            label: name.clone(),
            requested_name: Some(name),
            format: None,
            stop_tx: None,
            capture_handle: None,
        }
    }

    fn is_running(&self) -> bool {
        self.capture_handle.is_some()
    }
}

impl CaptureDevice for CpalInputDevice {
    fn open(&mut self, format: &AudioFormatDescriptor) -> Result<(), CaptureError> {
        if self.is_running() {
            return Err(CaptureError::QueueOpenFailed("input is already running".into()));
        }
        if !format.codec.is_pcm() {
            return Err(CaptureError::QueueOpenFailed(format!(
                "cpal input produces PCM only, not {:?}",
                format.codec
            )));
        }

        let device = resolve_device(self.requested_name.as_deref())?;
        if let Ok(name) = device.name() {
            self.label = name;
        }
        self.format = Some(*format);
        Ok(())
    }

    fn start(&mut self, on_input: InputCallback, on_error: DeviceErrorCallback) -> Result<(), CaptureError> {
        let format = self
            .format
            .ok_or_else(|| CaptureError::QueueOpenFailed("input is not open".into()))?;
        if self.is_running() {
            return Ok(());
        }

        let requested_name = self.requested_name.clone();
        let (ready_tx, ready_rx) = mpsc::channel();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let handle = thread::Builder::new()
            .name("cpal-input".into())
            .spawn(move || {
                let stream = match build_stream(requested_name.as_deref(), format, on_input, on_error) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));
                // Park until stop; dropping the stream releases the device.
                let _ = stop_rx.recv();
                drop(stream);
                log::debug!("cpal input stream released");
            })
            .map_err(|e| CaptureError::QueueOpenFailed(format!("failed to spawn input thread: {}", e)))?;

        let started = ready_rx
            .recv()
            .unwrap_or_else(|_| Err(CaptureError::QueueOpenFailed("input thread exited".into())));
        if let Err(e) = started {
            let _ = handle.join();
            return Err(e);
        }

        log::info!("cpal input started on {}", self.label);
        self.stop_tx = Some(stop_tx);
        self.capture_handle = Some(handle);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), CaptureError> {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(handle) = self.capture_handle.take() {
            if handle.join().is_err() {
                log::error!("cpal input thread panicked");
            }
        }
        self.format = None;
        Ok(())
    }

    fn device_name(&self) -> String {
        self.label.clone()
    }
}

impl Drop for CpalInputDevice {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

pub(crate) fn resolve_device(name: Option<&str>) -> Result<cpal::Device, CaptureError> {
    let host = cpal::default_host();
    match name {
        Some(name) => host
            .input_devices()
            .map_err(|e| CaptureError::QueueOpenFailed(format!("failed to enumerate input devices: {}", e)))?
            .find(|d| d.name().map(|n| n == name).unwrap_or(false))
            .ok_or_else(|| CaptureError::QueueOpenFailed(format!("input device not found: {}", name))),
        None => host
            .default_input_device()
            .ok_or_else(|| CaptureError::QueueOpenFailed("no default input device".into())),
    }
}

fn build_stream(
    name: Option<&str>,
    format: AudioFormatDescriptor,
    on_input: InputCallback,
    on_error: DeviceErrorCallback,
) -> Result<cpal::Stream, CaptureError> {
    let device = resolve_device(name)?;
    let supported = device
        .default_input_config()
        .map_err(|e| CaptureError::QueueOpenFailed(format!("no input config: {}", e)))?;
    let config: StreamConfig = supported.config();
    log::info!(
        "cpal input config: {} Hz, {} ch, {:?} → {} Hz, {} ch, {:?}",
        config.sample_rate.0,
        config.channels,
        supported.sample_format(),
        format.sample_rate,
        format.channels,
        format.codec
    );

    let stream = match supported.sample_format() {
        SampleFormat::F32 => build_stream_typed::<f32>(&device, &config, format, on_input, on_error),
        SampleFormat::I16 => build_stream_typed::<i16>(&device, &config, format, on_input, on_error),
        SampleFormat::U16 => build_stream_typed::<u16>(&device, &config, format, on_input, on_error),
        other => Err(CaptureError::QueueOpenFailed(format!(
            "unsupported device sample format: {:?}",
            other
        ))),
    }?;

    stream
        .play()
        .map_err(|e| CaptureError::QueueOpenFailed(format!("failed to start input stream: {}", e)))?;
    Ok(stream)
}

fn build_stream_typed<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    format: AudioFormatDescriptor,
    on_input: InputCallback,
    on_error: DeviceErrorCallback,
) -> Result<cpal::Stream, CaptureError>
where
    T: SizedSample + Send + 'static,
    f32: FromSample<T>,
{
    let mut converter = PcmConverter::new(format);
    let source_rate = config.sample_rate.0 as f64;
    let source_channels = config.channels;

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let samples: Vec<f32> = data.iter().map(|&s| s.to_sample::<f32>()).collect();
                let bytes = converter.convert(&samples, source_rate, source_channels);
                if !bytes.is_empty() {
                    on_input(&bytes);
                }
            },
            move |err| on_error(map_stream_error(err)),
            None,
        )
        .map_err(|e| CaptureError::QueueOpenFailed(format!("failed to build input stream: {}", e)))
}

fn map_stream_error(err: cpal::StreamError) -> CaptureError {
    match err {
        cpal::StreamError::DeviceNotAvailable => {
            CaptureError::DeviceLost("input device is no longer available".into())
        }
        other => CaptureError::BufferEnqueueFailed(format!("input stream error: {}", other)),
    }
}
