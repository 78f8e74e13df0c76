use std::io::BufRead;
use std::path::PathBuf;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{Args, ValueEnum};

use audio_relay_core::{AudioFormatDescriptor, RecordingConfiguration, RecordingCoordinator};
use audio_relay_cpal::{list_input_devices, CpalInputDevice};

use crate::delegate::ConsoleDelegate;

/// Sample encodings the cpal backend can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SampleEncoding {
    Pcm16,
    Float32,
}

#[derive(Debug, Args)]
pub struct RecordArgs {
    /// Write the raw captured stream to this file
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// Stream to this host (requires --port)
    #[arg(long)]
    host: Option<String>,

    /// Remote TCP port
    #[arg(short, long)]
    port: Option<u16>,

    /// Text sent once before the first audio byte
    #[arg(long)]
    header: Option<String>,

    /// JSON configuration file; flags override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Stop after this many seconds instead of waiting for Enter
    #[arg(short, long)]
    seconds: Option<f64>,

    /// Input device name (see `audio-relay devices`)
    #[arg(short, long)]
    device: Option<String>,

    #[arg(long, value_enum)]
    encoding: Option<SampleEncoding>,

    #[arg(long)]
    rate: Option<f64>,

    #[arg(long)]
    channels: Option<u16>,

    /// Write a .metadata.json summary next to the output file
    #[arg(long)]
    metadata: bool,
}

impl RecordArgs {
    fn configuration(&self) -> Result<RecordingConfiguration> {
        let mut config = match &self.config {
            Some(path) => RecordingConfiguration::from_json_file(path)?,
            None => RecordingConfiguration::default(),
        };

        if let Some(out) = &self.out {
            config.local_destination = Some(out.clone());
        }
        if let Some(host) = &self.host {
            config.remote_host = Some(host.clone());
        }
        if let Some(port) = self.port {
            config.remote_port = Some(port);
        }
        if let Some(header) = &self.header {
            config.header = Some(header.as_bytes().to_vec());
        }
        if self.metadata {
            config.write_metadata_sidecar = true;
        }

        if self.encoding.is_some() || self.rate.is_some() || self.channels.is_some() {
            let rate = self.rate.unwrap_or(config.format.sample_rate);
            let channels = self.channels.unwrap_or(config.format.channels);
            config.format = match self.encoding.unwrap_or(SampleEncoding::Pcm16) {
                SampleEncoding::Pcm16 => AudioFormatDescriptor::linear_pcm(rate, channels, 16),
                SampleEncoding::Float32 => AudioFormatDescriptor::float_pcm(rate, channels),
            };
        }

        if config.local_destination.is_none() && config.remote_destination().is_none() {
            bail!("nothing to record to: pass --out and/or --host with --port");
        }
        Ok(config)
    }
}

pub fn record(args: RecordArgs) -> Result<()> {
    let config = args.configuration()?;
    let limit = recording_limit(args.seconds)?;
    let device = match &args.device {
        Some(name) => CpalInputDevice::with_device_name(name.clone()),
        None => CpalInputDevice::default_device(),
    };

    let delegate = ConsoleDelegate::new();
    let mut recorder = RecordingCoordinator::with_configuration(device, config)
        .context("invalid recording configuration")?;
    recorder.set_delegate(delegate.clone());

    let report = recorder.prepare_for_recording()?;
    if !report.is_ready() {
        recorder.stop();
        bail!("capture could not be prepared");
    }
    recorder.record()?;

    let stop = stop_signal(limit);
    let started = Instant::now();
    let mut last_level = Instant::now();
    while stop.recv_timeout(Duration::from_millis(250)).is_err() {
        if !recorder.is_recording() {
            log::error!("Capture ended unexpectedly");
            break;
        }
        if last_level.elapsed() >= Duration::from_secs(1) {
            last_level = Instant::now();
            match recorder.audio_level() {
                Ok(level) => log::info!(
                    "{:>5.1}s  level {:>6.1} dB  peak {:>6.1} dB",
                    started.elapsed().as_secs_f64(),
                    level.average_power_db(),
                    level.peak_power_db()
                ),
                Err(e) => log::debug!("No level: {}", e),
            }
        }
    }

    let summary = recorder.stop().context("recorder was not running")?;
    println!("{}", serde_json::to_string_pretty(&summary)?);

    let fatal = delegate.fatal_errors();
    if !fatal.is_empty() {
        bail!(
            "{} error(s) during recording, first: {}",
            delegate.error_count(),
            fatal[0]
        );
    }
    Ok(())
}

pub fn devices(json: bool) -> Result<()> {
    let devices = list_input_devices()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&devices)?);
        return Ok(());
    }
    if devices.is_empty() {
        println!("No input devices found");
    }
    for device in devices {
        let marker = if device.is_default { "*" } else { " " };
        match (device.sample_rate, device.channels) {
            (Some(rate), Some(channels)) => {
                println!("{} {} ({} Hz, {} ch)", marker, device.name, rate, channels)
            }
            _ => println!("{} {}", marker, device.name),
        }
    }
    Ok(())
}

fn recording_limit(seconds: Option<f64>) -> Result<Option<Duration>> {
    let Some(seconds) = seconds else {
        return Ok(None);
    };
    match Duration::try_from_secs_f64(seconds) {
        Ok(duration) => Ok(Some(duration)),
        Err(e) => bail!("invalid --seconds {}: {}", seconds, e),
    }
}

/// Fires after `limit`, or when a line arrives on stdin.
fn stop_signal(limit: Option<Duration>) -> mpsc::Receiver<()> {
    let (tx, rx) = mpsc::channel();
    match limit {
        Some(duration) => {
            thread::spawn(move || {
                thread::sleep(duration);
                let _ = tx.send(());
            });
        }
        None => {
            log::info!("Recording; press Enter to stop");
            thread::spawn(move || {
                let mut line = String::new();
                let _ = std::io::stdin().lock().read_line(&mut line);
                let _ = tx.send(());
            });
        }
    }
    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        args: RecordArgs,
    }

    fn parse(argv: &[&str]) -> RecordArgs {
        Harness::parse_from(std::iter::once("record").chain(argv.iter().copied())).args
    }

    #[test]
    fn flags_build_configuration() {
        let config = parse(&["--out", "take.raw", "--host", "10.0.0.2", "--port", "7000", "--header", "HDR1"])
            .configuration()
            .unwrap();

        assert_eq!(config.local_destination, Some(PathBuf::from("take.raw")));
        assert_eq!(config.remote_destination().unwrap().to_string(), "10.0.0.2:7000");
        assert_eq!(config.header.as_deref(), Some(&b"HDR1"[..]));
        assert_eq!(config.format, AudioFormatDescriptor::default());
    }

    #[test]
    fn format_flags_override_default() {
        let config = parse(&["--out", "a.raw", "--encoding", "float32", "--rate", "16000", "--channels", "2"])
            .configuration()
            .unwrap();
        assert_eq!(config.format, AudioFormatDescriptor::float_pcm(16000.0, 2));
    }

    #[test]
    fn requires_a_destination() {
        assert!(parse(&[]).configuration().is_err());
        assert!(parse(&["--host", "localhost"]).configuration().is_err());
    }

    #[test]
    fn recording_limit_rejects_unrepresentable_durations() {
        assert_eq!(recording_limit(None).unwrap(), None);
        assert_eq!(recording_limit(Some(1.5)).unwrap(), Some(Duration::from_millis(1500)));
        assert!(recording_limit(Some(f64::INFINITY)).is_err());
        assert!(recording_limit(Some(f64::NAN)).is_err());
        assert!(recording_limit(Some(-1.0)).is_err());
        assert!(recording_limit(Some(1e30)).is_err());
    }

    #[test]
    fn flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.json");
        std::fs::write(&path, r#"{"remote_host": "a.example", "remote_port": 9000}"#).unwrap();

        let config = parse(&["--config", path.to_str().unwrap(), "--port", "9100"])
            .configuration()
            .unwrap();
        assert_eq!(config.remote_host.as_deref(), Some("a.example"));
        assert_eq!(config.remote_port, Some(9100));
    }
}
