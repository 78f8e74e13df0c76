use serde::Serialize;

/// Instantaneous level of one input channel (linear, 0.0–1.0).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ChannelLevel {
    /// RMS of the most recent metered chunk.
    pub average_power: f32,
    /// Peak absolute sample of the most recent metered chunk.
    pub peak_power: f32,
}

/// Level meter reading across all channels.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct LevelMeterState {
    pub channels: Vec<ChannelLevel>,
}

impl LevelMeterState {
    pub fn silent(channels: u16) -> Self {
        Self {
            channels: vec![ChannelLevel::default(); channels as usize],
        }
    }

    /// Mean of the per-channel average power.
    pub fn average_power(&self) -> f32 {
        if self.channels.is_empty() {
            return 0.0;
        }
        self.channels.iter().map(|c| c.average_power).sum::<f32>() / self.channels.len() as f32
    }

    /// Loudest peak across channels.
    pub fn peak_power(&self) -> f32 {
        self.channels
            .iter()
            .map(|c| c.peak_power)
            .fold(0.0f32, f32::max)
    }

    pub fn average_power_db(&self) -> f32 {
        to_decibels(self.average_power())
    }

    pub fn peak_power_db(&self) -> f32 {
        to_decibels(self.peak_power())
    }
}

/// Linear amplitude to dBFS, floored at -160 dB like hardware meters.
pub fn to_decibels(linear: f32) -> f32 {
    const FLOOR_DB: f32 = -160.0;
    if linear <= 0.0 {
        return FLOOR_DB;
    }
    (20.0 * linear.log10()).max(FLOOR_DB)
}
