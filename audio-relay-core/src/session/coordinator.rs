use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use crate::capture::engine::CaptureEngine;
use crate::models::config::{RecordingConfiguration, RemoteDestination};
use crate::models::error::{CaptureError, RecorderError, StreamError};
use crate::models::format::AudioFormatDescriptor;
use crate::models::levels::LevelMeterState;
use crate::models::recording_result::{RecorderDiagnostics, RecordingSummary, StreamOutcome};
use crate::models::state::{RecorderState, StreamState};
use crate::storage::file_sink::FileSink;
use crate::storage::metadata;
use crate::streaming::sender::{StreamOptions, StreamSender};
use crate::traits::capture_device::CaptureDevice;
use crate::traits::recorder_delegate::RecorderDelegate;
use crate::traits::stream_delegate::StreamDelegate;

use super::fan_out::FanOut;

/// Outcome of `prepare_for_recording`, one entry per configured part.
///
/// A failed sink does not stop the others from being prepared.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparationReport {
    pub capture: Result<(), CaptureError>,
    /// `None` when no local destination is configured.
    pub file: Option<Result<PathBuf, CaptureError>>,
    /// `None` when no remote destination is configured.
    pub stream: Option<Result<RemoteDestination, StreamError>>,
}

impl PreparationReport {
    /// Whether `record()` can start capture.
    pub fn is_ready(&self) -> bool {
        self.capture.is_ok()
    }

    pub fn errors(&self) -> Vec<RecorderError> {
        let mut errors = Vec::new();
        if let Err(e) = &self.capture {
            errors.push(e.clone().into());
        }
        if let Some(Err(e)) = &self.file {
            errors.push(e.clone().into());
        }
        if let Some(Err(e)) = &self.stream {
            errors.push(e.clone().into());
        }
        errors
    }
}

/// Records the microphone to a local file, a remote stream, or both.
///
/// ```text
/// set_* ──→ prepare_for_recording ──→ record ──→ stop
///  (Idle)        (Prepared, locked)  (Recording)  (Idle, unlocked)
/// ```
///
/// Configuration is frozen from `prepare_for_recording` until `stop`.
/// Sink failures go to the delegate and never halt capture.
pub struct RecordingCoordinator<D: CaptureDevice> {
    config: RecordingConfiguration,
    state: RecorderState,
    engine: CaptureEngine<D>,
    fan_out: Arc<FanOut>,
    report: Option<PreparationReport>,
    summary: Option<RecordingSummary>,
    started_at: Option<Instant>,
    last_summary: Option<RecordingSummary>,
}

impl<D: CaptureDevice> RecordingCoordinator<D> {
    pub fn new(device: D) -> Self {
        let config = RecordingConfiguration::default();
        let fan_out = Arc::new(FanOut::new());
        let engine = CaptureEngine::with_buffer_count(device, fan_out.clone(), config.buffer_count);
        Self {
            config,
            state: RecorderState::Idle,
            engine,
            fan_out,
            report: None,
            summary: None,
            started_at: None,
            last_summary: None,
        }
    }

    pub fn with_configuration(device: D, config: RecordingConfiguration) -> Result<Self, RecorderError> {
        let mut coordinator = Self::new(device);
        coordinator.set_configuration(config)?;
        Ok(coordinator)
    }

    /// Without a delegate, errors are logged.
    pub fn set_delegate(&self, delegate: Arc<dyn RecorderDelegate>) {
        self.fan_out.set_delegate(Some(delegate));
    }

    /// Observe stream events (opened, header sent, bytes written, closed).
    pub fn set_stream_delegate(&self, delegate: Arc<dyn StreamDelegate>) {
        self.fan_out.set_stream_observer(Some(delegate));
    }

    // --- Configuration (Idle only) ---

    pub fn set_local_destination(&mut self, path: Option<PathBuf>) -> Result<(), RecorderError> {
        self.ensure_unlocked()?;
        self.config.local_destination = path;
        Ok(())
    }

    pub fn set_remote_host(&mut self, host: Option<String>) -> Result<(), RecorderError> {
        self.ensure_unlocked()?;
        self.config.remote_host = host;
        Ok(())
    }

    pub fn set_remote_port(&mut self, port: Option<u16>) -> Result<(), RecorderError> {
        self.ensure_unlocked()?;
        self.config.remote_port = port;
        Ok(())
    }

    pub fn set_header(&mut self, header: Option<Vec<u8>>) -> Result<(), RecorderError> {
        self.ensure_unlocked()?;
        self.config.header = header;
        Ok(())
    }

    pub fn set_format(&mut self, format: AudioFormatDescriptor) -> Result<(), RecorderError> {
        self.ensure_unlocked()?;
        self.config.format = format;
        Ok(())
    }

    /// Replace the whole configuration after validating it.
    pub fn set_configuration(&mut self, config: RecordingConfiguration) -> Result<(), RecorderError> {
        self.ensure_unlocked()?;
        config.validate().map_err(RecorderError::InvalidConfiguration)?;
        self.config = config;
        Ok(())
    }

    pub fn configuration(&self) -> &RecordingConfiguration {
        &self.config
    }

    // --- Lifecycle ---

    /// Freeze the configuration and prepare capture, file and stream.
    ///
    /// Each part is prepared even if another fails; failures go to the
    /// delegate and into the report. Calling again before `stop` returns
    /// the existing report.
    pub fn prepare_for_recording(&mut self) -> Result<PreparationReport, RecorderError> {
        if let Some(report) = &self.report {
            return Ok(report.clone());
        }
        self.config.validate().map_err(RecorderError::InvalidConfiguration)?;
        self.set_state(RecorderState::Prepared);

        let file = self.config.local_destination.clone().map(|path| FileSink::create(&path));
        let stream = self.config.remote_destination().map(|destination| {
            let sender = StreamSender::new(
                destination,
                self.config.header.clone(),
                StreamOptions::from(&self.config),
            )
            .with_delegate(self.fan_out.clone());
            sender.prepare_for_sending().map(|()| Arc::new(sender))
        });

        let file_report = file.as_ref().map(|result| match result {
            Ok(sink) => Ok(sink.path().to_path_buf()),
            Err(e) => Err(e.clone()),
        });
        let stream_report = stream.as_ref().map(|result| match result {
            Ok(sender) => Ok(sender.destination().clone()),
            Err(e) => Err(e.clone()),
        });
        self.fan_out
            .begin(file.and_then(Result::ok), stream.and_then(Result::ok));

        self.engine.set_buffer_count(self.config.buffer_count);
        let capture = self
            .engine
            .prepare(&self.config.format, self.config.packets_per_buffer());
        let report = PreparationReport {
            capture,
            file: file_report,
            stream: stream_report,
        };

        for error in report.errors() {
            self.fan_out.report(error);
        }
        log::info!(
            "Prepared recording (file: {}, stream: {}, capture ready: {})",
            report.file.is_some(),
            report.stream.is_some(),
            report.is_ready()
        );

        self.summary = Some(RecordingSummary::new(self.config.format));
        self.report = Some(report.clone());
        Ok(report)
    }

    /// Start capturing. Prepares first when still idle.
    ///
    /// Metering failures are reported but do not prevent recording.
    pub fn record(&mut self) -> Result<(), RecorderError> {
        match self.state {
            RecorderState::Recording => return Ok(()),
            RecorderState::Idle => {
                self.prepare_for_recording()?;
            }
            RecorderState::Prepared => {}
        }

        match self.engine.start() {
            Ok(()) => {}
            Err(e @ CaptureError::MeteringEnableFailed(_)) => self.fan_out.report(e.into()),
            Err(e) => {
                let error = RecorderError::from(e);
                self.fan_out.report(error.clone());
                return Err(error);
            }
        }

        self.started_at = Some(Instant::now());
        self.set_state(RecorderState::Recording);
        Ok(())
    }

    /// Stop capture, then close the file, then close the stream.
    ///
    /// Idempotent and safe before `record` or after a failed preparation.
    /// Returns the summary when a session was torn down.
    pub fn stop(&mut self) -> Option<RecordingSummary> {
        if self.state == RecorderState::Idle {
            return None;
        }

        self.engine.stop();

        let mut summary = self
            .summary
            .take()
            .unwrap_or_else(|| RecordingSummary::new(self.config.format));

        if let Some(sink) = self.fan_out.take_file() {
            match sink.close() {
                Ok(outcome) => summary.file = Some(outcome),
                Err(e) => self.fan_out.report(e.into()),
            }
        }

        if let Some(sender) = self.fan_out.take_stream() {
            sender.close_connection();
            summary.stream = Some(StreamOutcome {
                destination: sender.destination().clone(),
                header_sent: sender.header_sent(),
                bytes_written: sender.bytes_written(),
            });
        }

        summary.diagnostics = self.fan_out.diagnostics();
        summary.duration_secs = self
            .started_at
            .take()
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0);

        if self.config.write_metadata_sidecar {
            if let Some(file) = &summary.file {
                if let Err(e) = metadata::write_metadata(&summary, &file.path) {
                    self.fan_out.report(e.into());
                }
            }
        }

        self.report = None;
        self.set_state(RecorderState::Idle);
        log::info!(
            "Recording stopped: {} buffers, {} bytes captured",
            summary.diagnostics.buffers_captured,
            summary.diagnostics.bytes_captured
        );
        if let Some(delegate) = self.fan_out.delegate() {
            delegate.on_recording_finished(&summary);
        }
        self.last_summary = Some(summary.clone());
        Some(summary)
    }

    // --- Queries ---

    pub fn audio_level(&self) -> Result<LevelMeterState, RecorderError> {
        Ok(self.engine.current_level()?)
    }

    /// True while the capture device is delivering input.
    pub fn is_recording(&self) -> bool {
        self.engine.is_running()
    }

    pub fn state(&self) -> RecorderState {
        self.state
    }

    /// `None` when no stream is part of the current session.
    pub fn stream_state(&self) -> Option<StreamState> {
        self.fan_out.stream().map(|s| s.state())
    }

    pub fn diagnostics(&self) -> RecorderDiagnostics {
        self.fan_out.diagnostics()
    }

    pub fn last_summary(&self) -> Option<&RecordingSummary> {
        self.last_summary.as_ref()
    }

    pub fn device(&self) -> &D {
        self.engine.device()
    }

    fn ensure_unlocked(&self) -> Result<(), RecorderError> {
        if self.state.is_locked() {
            return Err(RecorderError::ConfigurationLocked);
        }
        Ok(())
    }

    fn set_state(&mut self, state: RecorderState) {
        if self.state == state {
            return;
        }
        log::debug!("Recorder state: {:?} -> {:?}", self.state, state);
        self.state = state;
        if let Some(delegate) = self.fan_out.delegate() {
            delegate.on_state_changed(state);
        }
    }
}

impl<D: CaptureDevice> Drop for RecordingCoordinator<D> {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;
    use std::net::TcpListener;
    use std::thread;

    use super::*;
    use crate::models::error::ErrorKind;
    use crate::test_support::{wait_until, RecorderEventLog, ScriptedDevice, StreamEventLog};

    /// 8 kHz mono 16-bit with 160 packets: 320-byte buffers.
    fn config() -> RecordingConfiguration {
        RecordingConfiguration {
            packets_per_buffer: Some(160),
            close_linger_ms: 1000,
            ..RecordingConfiguration::default()
        }
    }

    fn coordinator(config: RecordingConfiguration) -> (RecordingCoordinator<ScriptedDevice>, ScriptedDevice, Arc<RecorderEventLog>) {
        let device = ScriptedDevice::new();
        let coordinator = RecordingCoordinator::with_configuration(device.clone(), config).unwrap();
        let events = Arc::new(RecorderEventLog::default());
        coordinator.set_delegate(events.clone());
        (coordinator, device, events)
    }

    fn listen() -> (TcpListener, u16) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, port)
    }

    fn read_all(listener: TcpListener) -> thread::JoinHandle<Vec<u8>> {
        thread::spawn(move || {
            let (mut socket, _) = listener.accept().unwrap();
            let mut received = Vec::new();
            socket.read_to_end(&mut received).unwrap();
            received
        })
    }

    fn audio(seed: u8) -> Vec<u8> {
        (0..320).map(|i| (i as u8).wrapping_add(seed)).collect()
    }

    #[test]
    fn records_to_local_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("take.raw");
        let (mut coordinator, device, events) = coordinator(RecordingConfiguration {
            local_destination: Some(path.clone()),
            write_metadata_sidecar: true,
            ..config()
        });
        let stream_events = Arc::new(StreamEventLog::default());
        coordinator.set_stream_delegate(stream_events.clone());

        let report = coordinator.prepare_for_recording().unwrap();
        assert!(report.is_ready());
        assert_eq!(report.file, Some(Ok(path.clone())));
        assert_eq!(report.stream, None);

        coordinator.record().unwrap();
        assert!(coordinator.is_recording());
        device.push(&audio(0));
        device.push(&audio(1));
        wait_until(|| coordinator.diagnostics().buffers_captured == 2);

        let summary = coordinator.stop().unwrap();

        let mut expected = audio(0);
        expected.extend(audio(1));
        assert_eq!(std::fs::read(&path).unwrap(), expected);
        approx::assert_abs_diff_eq!(summary.captured_duration_secs(), 0.04, epsilon = 1e-9);
        assert_eq!(summary.diagnostics.bytes_captured, 640);
        let file = summary.file.unwrap();
        assert_eq!(file.bytes_written, 640);
        assert!(crate::storage::metadata::metadata_path(&path).exists());

        assert!(events.errors().is_empty());
        assert_eq!(
            events.states(),
            vec![RecorderState::Prepared, RecorderState::Recording, RecorderState::Idle]
        );
        assert_eq!(events.summaries().len(), 1);
        assert!(!coordinator.is_recording());
        assert!(summary.stream.is_none());
        assert!(stream_events.events().is_empty());
    }

    #[test]
    fn streams_header_then_audio() {
        let (listener, port) = listen();
        let server = read_all(listener);
        let (mut coordinator, device, events) = coordinator(RecordingConfiguration {
            remote_host: Some("127.0.0.1".into()),
            remote_port: Some(port),
            header: Some(b"HDR1".to_vec()),
            ..config()
        });

        coordinator.prepare_for_recording().unwrap();
        wait_until(|| coordinator.stream_state() == Some(StreamState::Open));
        coordinator.record().unwrap();
        let first = audio(7);
        device.push(&first);
        wait_until(|| coordinator.diagnostics().stream_bytes_queued == 320);

        let summary = coordinator.stop().unwrap();

        let mut expected = b"HDR1".to_vec();
        expected.extend_from_slice(&first);
        assert_eq!(server.join().unwrap(), expected);
        let stream = summary.stream.unwrap();
        assert!(stream.header_sent);
        assert_eq!(stream.bytes_written, 320);
        assert!(events.errors().is_empty());
    }

    #[test]
    fn file_failure_does_not_stop_the_stream() {
        let dir = tempfile::tempdir().unwrap();
        let (listener, port) = listen();
        let server = read_all(listener);
        let (mut coordinator, device, events) = coordinator(RecordingConfiguration {
            // A directory cannot be created as a file.
            local_destination: Some(dir.path().to_path_buf()),
            remote_host: Some("127.0.0.1".into()),
            remote_port: Some(port),
            ..config()
        });

        let report = coordinator.prepare_for_recording().unwrap();
        assert!(matches!(report.file, Some(Err(CaptureError::AudioFileCreateFailed(_)))));
        assert!(matches!(report.stream, Some(Ok(_))));
        assert_eq!(events.error_kinds(), vec![ErrorKind::AudioFileCreateFailed]);

        coordinator.record().unwrap();
        device.push(&audio(3));
        wait_until(|| coordinator.diagnostics().stream_bytes_queued == 320);
        let summary = coordinator.stop().unwrap();

        assert_eq!(server.join().unwrap(), audio(3));
        assert!(summary.file.is_none());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn file_write_failure_does_not_stop_the_stream() {
        let (listener, port) = listen();
        let server = read_all(listener);
        let full = PathBuf::from("/dev/full");
        let (mut coordinator, device, events) = coordinator(RecordingConfiguration {
            // Opens fine; every write fails with ENOSPC.
            local_destination: Some(full.clone()),
            remote_host: Some("127.0.0.1".into()),
            remote_port: Some(port),
            ..config()
        });

        let report = coordinator.prepare_for_recording().unwrap();
        assert_eq!(report.file, Some(Ok(full)));
        coordinator.record().unwrap();
        for seed in 0..3u8 {
            device.push(&audio(seed));
            let queued = (seed as u64 + 1) * 320;
            wait_until(|| coordinator.diagnostics().stream_bytes_queued == queued);
        }

        assert!(coordinator.is_recording());
        let diagnostics = coordinator.diagnostics();
        assert_eq!(diagnostics.file_write_failures, 3);
        assert_eq!(diagnostics.file_bytes_written, 0);
        // One report for the whole failing stretch.
        assert_eq!(events.error_kinds(), vec![ErrorKind::AudioFileWriteFailed]);

        let summary = coordinator.stop().unwrap();
        let mut expected = audio(0);
        expected.extend(audio(1));
        expected.extend(audio(2));
        assert_eq!(server.join().unwrap(), expected);
        assert_eq!(summary.stream.unwrap().bytes_written, 960);
    }

    #[test]
    fn stream_failure_does_not_stop_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("take.raw");
        let (listener, port) = listen();
        // The peer hangs up right away, so writes soon fail.
        let peer = thread::spawn(move || drop(listener.accept().unwrap()));
        let (mut coordinator, device, events) = coordinator(RecordingConfiguration {
            local_destination: Some(path.clone()),
            remote_host: Some("127.0.0.1".into()),
            remote_port: Some(port),
            ..config()
        });

        coordinator.record().unwrap();
        peer.join().unwrap();
        let mut pushed = 0u64;
        while coordinator.stream_state() != Some(StreamState::Closed) {
            assert!(pushed < 200, "stream writes never failed");
            device.push(&audio(pushed as u8));
            pushed += 1;
            wait_until(|| coordinator.diagnostics().buffers_captured == pushed);
            thread::sleep(std::time::Duration::from_millis(5));
        }

        assert!(coordinator.is_recording());
        device.push(&audio(0));
        pushed += 1;
        wait_until(|| coordinator.diagnostics().file_bytes_written == pushed * 320);

        let summary = coordinator.stop().unwrap();
        assert_eq!(std::fs::read(&path).unwrap().len() as u64, pushed * 320);
        assert_eq!(summary.file.unwrap().bytes_written, pushed * 320);
        assert_eq!(events.error_kinds(), vec![ErrorKind::BytesSendFailed]);
    }

    #[test]
    fn unreachable_host_does_not_stop_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("take.raw");
        let (mut coordinator, device, events) = coordinator(RecordingConfiguration {
            local_destination: Some(path.clone()),
            // Interior NUL fails resolution without touching the network.
            remote_host: Some("bad\0host".into()),
            remote_port: Some(9),
            ..config()
        });

        let report = coordinator.prepare_for_recording().unwrap();
        assert!(matches!(report.stream, Some(Err(StreamError::HostUnreachable(_)))));
        assert_eq!(coordinator.stream_state(), None);

        coordinator.record().unwrap();
        device.push(&audio(0));
        wait_until(|| coordinator.diagnostics().file_bytes_written == 320);
        coordinator.stop();

        assert_eq!(std::fs::read(&path).unwrap(), audio(0));
        assert_eq!(events.error_kinds(), vec![ErrorKind::HostUnreachable]);
    }

    #[test]
    fn blocked_stream_drops_buffers_but_file_keeps_them() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("take.raw");
        let (listener, port) = listen();
        let server = read_all(listener);
        let (mut coordinator, device, events) = coordinator(RecordingConfiguration {
            local_destination: Some(path.clone()),
            remote_host: Some("127.0.0.1".into()),
            remote_port: Some(port),
            stream_queue_depth: 1,
            ..config()
        });
        let stream_events = Arc::new(StreamEventLog::holding_open());
        coordinator.set_stream_delegate(stream_events.clone());

        coordinator.prepare_for_recording().unwrap();
        // The stream event loop parks in the opened callback: nothing drains.
        wait_until(|| stream_events.is_holding());
        coordinator.record().unwrap();
        for seed in 0..3 {
            device.push(&audio(seed));
            wait_until(|| coordinator.diagnostics().buffers_captured == seed as u64 + 1);
        }

        assert!(coordinator.is_recording());
        assert_eq!(events.error_kinds(), vec![ErrorKind::StreamBlocked]);
        let diagnostics = coordinator.diagnostics();
        assert_eq!(diagnostics.stream_buffers_dropped, 2);
        assert_eq!(diagnostics.file_bytes_written, 960);

        stream_events.release();
        let summary = coordinator.stop().unwrap();

        assert_eq!(server.join().unwrap(), audio(0));
        assert_eq!(std::fs::read(&path).unwrap().len(), 960);
        assert_eq!(summary.stream.unwrap().bytes_written, 320);
    }

    #[test]
    fn configuration_is_locked_until_stop() {
        let (mut coordinator, _device, _events) = coordinator(config());
        coordinator.set_remote_port(Some(7000)).unwrap();
        coordinator.set_remote_host(Some("localhost".into())).unwrap();
        coordinator.set_remote_host(None).unwrap();
        coordinator.set_remote_port(None).unwrap();

        coordinator.prepare_for_recording().unwrap();
        assert_eq!(coordinator.set_remote_port(Some(7001)), Err(RecorderError::ConfigurationLocked));
        assert_eq!(coordinator.set_header(Some(vec![1])), Err(RecorderError::ConfigurationLocked));
        assert_eq!(
            coordinator.set_local_destination(Some("x.raw".into())),
            Err(RecorderError::ConfigurationLocked)
        );
        assert_eq!(coordinator.configuration().header, None);

        coordinator.record().unwrap();
        assert_eq!(coordinator.set_format(AudioFormatDescriptor::ilbc()), Err(RecorderError::ConfigurationLocked));

        coordinator.stop();
        coordinator.set_header(Some(b"HDR1".to_vec())).unwrap();
        assert_eq!(coordinator.configuration().header.as_deref(), Some(&b"HDR1"[..]));
    }

    #[test]
    fn stop_is_idempotent() {
        let (mut coordinator, device, events) = coordinator(config());

        assert!(coordinator.stop().is_none());

        coordinator.prepare_for_recording().unwrap();
        assert!(coordinator.stop().is_some());
        assert!(coordinator.stop().is_none());

        coordinator.record().unwrap();
        assert!(coordinator.stop().is_some());
        assert!(coordinator.stop().is_none());

        assert_eq!(coordinator.state(), RecorderState::Idle);
        assert!(!device.is_started());
        assert!(events.errors().is_empty());
    }

    #[test]
    fn stop_after_failed_capture_preparation() {
        let device = ScriptedDevice::failing_open(CaptureError::QueueOpenFailed("no input".into()));
        let mut coordinator = RecordingCoordinator::with_configuration(device, config()).unwrap();
        let events = Arc::new(RecorderEventLog::default());
        coordinator.set_delegate(events.clone());

        let report = coordinator.prepare_for_recording().unwrap();
        assert!(!report.is_ready());
        assert_eq!(coordinator.record(), Err(RecorderError::Capture(CaptureError::NotPrepared)));
        assert!(coordinator.stop().is_some());

        assert_eq!(
            events.error_kinds(),
            vec![ErrorKind::QueueOpenFailed, ErrorKind::NotPrepared]
        );
    }

    #[test]
    fn record_prepares_when_idle() {
        let (mut coordinator, device, _events) = coordinator(config());

        coordinator.record().unwrap();

        assert_eq!(coordinator.state(), RecorderState::Recording);
        assert!(device.is_started());
        coordinator.stop();
    }

    #[test]
    fn compressed_format_records_without_levels() {
        let (mut coordinator, device, events) = coordinator(RecordingConfiguration {
            format: AudioFormatDescriptor::ilbc(),
            packets_per_buffer: Some(1),
            ..RecordingConfiguration::default()
        });

        coordinator.record().unwrap();
        assert!(coordinator.is_recording());
        assert_eq!(events.error_kinds(), vec![ErrorKind::MeteringEnableFailed]);
        assert!(matches!(
            coordinator.audio_level(),
            Err(RecorderError::Capture(CaptureError::LevelQueryFailed(_)))
        ));

        device.push(&[0u8; 50]);
        let summary = coordinator.stop().unwrap();
        assert_eq!(summary.diagnostics.buffers_captured, 1);
    }

    #[test]
    fn audio_level_tracks_input() {
        let (mut coordinator, device, _events) = coordinator(config());
        assert!(coordinator.audio_level().is_err());

        coordinator.record().unwrap();
        let loud = crate::processing::pcm::encode(&[0.25; 160], &AudioFormatDescriptor::default());
        device.push(&loud);

        let level = coordinator.audio_level().unwrap();
        approx::assert_abs_diff_eq!(level.average_power(), 0.25, epsilon = 1e-3);
        coordinator.stop();
    }

    #[test]
    fn invalid_configuration_is_rejected() {
        let device = ScriptedDevice::new();
        let result = RecordingCoordinator::with_configuration(
            device,
            RecordingConfiguration {
                remote_host: Some("localhost".into()),
                ..RecordingConfiguration::default()
            },
        );
        assert!(matches!(result, Err(RecorderError::InvalidConfiguration(_))));
    }

    #[test]
    fn preparing_twice_returns_the_same_report() {
        let (mut coordinator, _device, events) = coordinator(config());
        let first = coordinator.prepare_for_recording().unwrap();
        let second = coordinator.prepare_for_recording().unwrap();
        assert_eq!(first, second);
        assert_eq!(events.states(), vec![RecorderState::Prepared]);
        coordinator.stop();
    }
}
