//! Input device enumeration through the default cpal host.

use cpal::traits::{DeviceTrait, HostTrait};
use serde::Serialize;

use audio_relay_core::models::error::CaptureError;

/// One capture endpoint as reported by the host.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InputDeviceInfo {
    pub name: String,
    pub is_default: bool,
    /// Native rate and channel count, when the device reports a default config.
    pub sample_rate: Option<u32>,
    pub channels: Option<u16>,
}

/// List active input devices. The default device is flagged.
pub fn list_input_devices() -> Result<Vec<InputDeviceInfo>, CaptureError> {
    let host = cpal::default_host();
    let default_name = host.default_input_device().and_then(|d| d.name().ok());

    let devices = host
        .input_devices()
        .map_err(|e| CaptureError::QueueOpenFailed(format!("failed to enumerate input devices: {}", e)))?;

    let mut infos = Vec::new();
    for device in devices {
        let Ok(name) = device.name() else {
            continue;
        };
        let config = device.default_input_config().ok();
        infos.push(InputDeviceInfo {
            is_default: default_name.as_deref() == Some(name.as_str()),
            sample_rate: config.as_ref().map(|c| c.sample_rate().0),
            channels: config.as_ref().map(|c| c.channels()),
            name,
        });
    }
    log::debug!("Found {} input devices", infos.len());
    Ok(infos)
}
