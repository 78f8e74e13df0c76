//! Pure-math PCM helpers shared by the level meter and capture backends.
//!
//! All operations work on interleaved `f32` buffers or little-endian byte
//! streams with no platform dependencies.

use crate::models::format::{AudioFormatDescriptor, CodecTag};

/// Resampler and encoder producing one target stream format.
///
/// Keeps resampling state between calls, so a device stream delivered in
/// arbitrary chunks converts as one continuous signal.
#[derive(Debug, Clone)]
pub struct PcmConverter {
    pub format: AudioFormatDescriptor,
    resampler: Resampler,
}

impl PcmConverter {
    pub fn new(format: AudioFormatDescriptor) -> Self {
        Self {
            format,
            resampler: Resampler::new(format.channels as usize),
        }
    }

    /// Convert interleaved device samples to encoded bytes in `self.format`.
    ///
    /// Channels are matched (downmix to mono, or duplicate mono), then
    /// resampled, then encoded. Compressed targets produce no bytes.
    pub fn convert(&mut self, samples: &[f32], source_rate: f64, source_channels: u16) -> Vec<u8> {
        let target_channels = self.format.channels;
        let matched = if source_channels == target_channels {
            samples.to_vec()
        } else if target_channels == 1 {
            downmix_to_mono(samples, source_channels as usize)
        } else {
            let mono = downmix_to_mono(samples, source_channels as usize);
            duplicate_channels(&mono, target_channels as usize)
        };

        let resampled = self.resampler.process(&matched, source_rate, self.format.sample_rate);
        encode(&resampled, &self.format)
    }
}

/// Streaming linear-interpolation resampler for interleaved audio.
///
/// The last source frame and the fractional read position carry over to
/// the next chunk.
#[derive(Debug, Clone)]
pub struct Resampler {
    channels: usize,
    /// Read position in frames, relative to `previous` (or the chunk start).
    position: f64,
    previous: Vec<f32>,
    rates: Option<(f64, f64)>,
}

impl Resampler {
    pub fn new(channels: usize) -> Self {
        Self {
            channels,
            position: 0.0,
            previous: Vec::new(),
            rates: None,
        }
    }

    pub fn reset(&mut self) {
        self.position = 0.0;
        self.previous.clear();
        self.rates = None;
    }

    /// Resample one chunk. Matching rates pass through unchanged.
    pub fn process(&mut self, samples: &[f32], source_rate: f64, target_rate: f64) -> Vec<f32> {
        let channels = self.channels;
        if channels == 0 || source_rate <= 0.0 || target_rate <= 0.0 {
            return Vec::new();
        }
        if (source_rate - target_rate).abs() < 0.01 {
            return samples.to_vec();
        }
        if self.rates != Some((source_rate, target_rate)) {
            self.reset();
            self.rates = Some((source_rate, target_rate));
        }

        let incoming = samples.len() / channels;
        if incoming == 0 {
            return Vec::new();
        }
        let carried = self.previous.len() / channels;
        let total = carried + incoming;
        let frame = |i: usize, ch: usize| -> f32 {
            if i < carried {
                self.previous[i * channels + ch]
            } else {
                samples[(i - carried) * channels + ch]
            }
        };

        let step = source_rate / target_rate;
        let estimate = ((total as f64 - self.position) / step).ceil().max(0.0) as usize;
        let mut output = Vec::with_capacity(estimate * channels);
        let mut position = self.position;
        while position + 1.0 < total as f64 {
            let index = position as usize;
            let fraction = (position - index as f64) as f32;
            for ch in 0..channels {
                let a = frame(index, ch);
                let b = frame(index + 1, ch);
                output.push(a + (b - a) * fraction);
            }
            position += step;
        }

        // The last frame becomes frame 0 of the next chunk.
        self.position = position - (total - 1) as f64;
        let last = (incoming - 1) * channels;
        self.previous.clear();
        self.previous.extend_from_slice(&samples[last..last + channels]);
        output
    }
}

/// Downmix interleaved multi-channel audio to mono by averaging channels per frame.
pub fn downmix_to_mono(samples: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    let scale = 1.0 / channels as f32;
    samples
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() * scale)
        .collect()
}

/// Copy each mono sample into `channels` interleaved channels.
pub fn duplicate_channels(mono: &[f32], channels: usize) -> Vec<f32> {
    let mut out = Vec::with_capacity(mono.len() * channels);
    for &sample in mono {
        out.extend(std::iter::repeat(sample).take(channels));
    }
    out
}

/// Encode `[-1.0, 1.0]` samples as little-endian PCM for `format`.
///
/// Clamps out-of-range values. Non-PCM formats yield an empty buffer.
pub fn encode(samples: &[f32], format: &AudioFormatDescriptor) -> Vec<u8> {
    match (format.codec, format.bits_per_channel) {
        (CodecTag::FloatPcm, _) => {
            let mut data = Vec::with_capacity(samples.len() * 4);
            for &sample in samples {
                data.extend_from_slice(&sample.clamp(-1.0, 1.0).to_le_bytes());
            }
            data
        }
        (CodecTag::LinearPcm, 8) => samples
            .iter()
            .map(|s| ((s.clamp(-1.0, 1.0) * i8::MAX as f32) as i8) as u8)
            .collect(),
        (CodecTag::LinearPcm, 16) => convert_to_int16_pcm(samples),
        (CodecTag::LinearPcm, 24) => {
            let mut data = Vec::with_capacity(samples.len() * 3);
            for &sample in samples {
                let value = (sample.clamp(-1.0, 1.0) * 8_388_607.0) as i32;
                data.extend_from_slice(&value.to_le_bytes()[..3]);
            }
            data
        }
        (CodecTag::LinearPcm, 32) => {
            let mut data = Vec::with_capacity(samples.len() * 4);
            for &sample in samples {
                let value = (sample.clamp(-1.0, 1.0) as f64 * i32::MAX as f64) as i32;
                data.extend_from_slice(&value.to_le_bytes());
            }
            data
        }
        _ => Vec::new(),
    }
}

/// Convert f32 samples `[-1.0, 1.0]` to 16-bit PCM (little-endian bytes).
pub fn convert_to_int16_pcm(samples: &[f32]) -> Vec<u8> {
    let mut data = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        let clamped = sample.clamp(-1.0, 1.0);
        let int16_value = (clamped * i16::MAX as f32) as i16;
        data.extend_from_slice(&int16_value.to_le_bytes());
    }
    data
}

/// Bytes per encoded sample, or `None` for formats that cannot be decoded.
pub fn sample_width(format: &AudioFormatDescriptor) -> Option<usize> {
    match (format.codec, format.bits_per_channel) {
        (CodecTag::FloatPcm, _) => Some(4),
        (CodecTag::LinearPcm, bits @ (8 | 16 | 24 | 32)) => Some(bits as usize / 8),
        _ => None,
    }
}

/// Decode one little-endian sample of `sample_width(format)` bytes.
///
/// Returns 0.0 for undecodable formats or a short slice.
pub fn decode_sample(b: &[u8], format: &AudioFormatDescriptor) -> f32 {
    match (format.codec, format.bits_per_channel, b.len()) {
        (CodecTag::FloatPcm, _, 4) => f32::from_le_bytes([b[0], b[1], b[2], b[3]]),
        (CodecTag::LinearPcm, 8, 1) => b[0] as i8 as f32 / 128.0,
        (CodecTag::LinearPcm, 16, 2) => i16::from_le_bytes([b[0], b[1]]) as f32 / 32768.0,
        (CodecTag::LinearPcm, 24, 3) => {
            // Sign-extend by placing the sample in the top three bytes.
            let value = i32::from_le_bytes([0, b[0], b[1], b[2]]) >> 8;
            value as f32 / 8_388_608.0
        }
        (CodecTag::LinearPcm, 32, 4) => {
            (i32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64 / 2_147_483_648.0) as f32
        }
        _ => 0.0,
    }
}

/// Decode little-endian PCM bytes to normalized `f32` samples.
///
/// Trailing bytes that do not form a whole sample are ignored.
pub fn decode(bytes: &[u8], format: &AudioFormatDescriptor) -> Vec<f32> {
    match sample_width(format) {
        Some(width) => bytes
            .chunks_exact(width)
            .map(|b| decode_sample(b, format))
            .collect(),
        None => Vec::new(),
    }
}

/// Compute RMS level of samples (0.0–1.0 range for normalized audio).
pub fn rms_level(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
    (sum_sq / samples.len() as f32).sqrt()
}

/// Compute peak absolute level of samples.
pub fn peak_level(samples: &[f32]) -> f32 {
    samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max)
}
