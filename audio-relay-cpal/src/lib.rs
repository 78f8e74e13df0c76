//! # audio-relay-cpal
//!
//! Cross-platform microphone backend for audio-relay, built on cpal.
//!
//! Provides:
//! - `CpalInputDevice`: `CaptureDevice` over the default (or a named) input
//! - `list_input_devices`: input enumeration for device pickers
//!
//! Device samples are resampled, channel-matched and encoded to the
//! requested PCM stream format. Compressed formats are refused at open.
//!
//! ## Usage
//! ```ignore
//! use audio_relay_cpal::CpalInputDevice;
//! use audio_relay_core::RecordingCoordinator;
//!
//! let mut recorder = RecordingCoordinator::new(CpalInputDevice::default_device());
//! recorder.set_local_destination(Some("take.raw".into()))?;
//! recorder.record()?;
//! ```

pub mod cpal_input;
pub mod devices;

pub use cpal_input::CpalInputDevice;
pub use devices::{list_input_devices, InputDeviceInfo};
