use crate::models::format::AudioFormatDescriptor;
use crate::models::levels::LevelMeterState;
use crate::processing::pcm;

/// Per-channel RMS and peak meter over raw PCM input.
///
/// Each call to `process` replaces the reading with the levels of that chunk.
/// Runs on the device callback, so it reads samples in place and never
/// allocates after construction.
#[derive(Debug, Clone)]
pub struct LevelMeter {
    format: AudioFormatDescriptor,
    sample_width: usize,
    sums: Vec<f64>,
    state: LevelMeterState,
}

impl LevelMeter {
    /// Returns `None` when the format cannot be metered (compressed codecs).
    pub fn for_format(format: AudioFormatDescriptor) -> Option<Self> {
        if !format.supports_metering() || format.channels == 0 {
            return None;
        }
        let sample_width = pcm::sample_width(&format)?;
        Some(Self {
            format,
            sample_width,
            sums: vec![0.0; format.channels as usize],
            state: LevelMeterState::silent(format.channels),
        })
    }

    pub fn process(&mut self, bytes: &[u8]) {
        let channels = self.format.channels as usize;
        let frame_bytes = self.sample_width * channels;
        let frames = bytes.len() / frame_bytes;
        if frames == 0 {
            return;
        }

        self.sums.iter_mut().for_each(|sum| *sum = 0.0);
        for level in &mut self.state.channels {
            level.peak_power = 0.0;
        }
        let samples = bytes[..frames * frame_bytes].chunks_exact(self.sample_width);
        for (i, raw) in samples.enumerate() {
            let ch = i % channels;
            let sample = pcm::decode_sample(raw, &self.format);
            self.sums[ch] += (sample as f64) * (sample as f64);
            let level = &mut self.state.channels[ch];
            level.peak_power = level.peak_power.max(sample.abs());
        }
        for (level, sum) in self.state.channels.iter_mut().zip(&self.sums) {
            level.average_power = (sum / frames as f64).sqrt() as f32;
        }
    }

    pub fn snapshot(&self) -> LevelMeterState {
        self.state.clone()
    }

}
