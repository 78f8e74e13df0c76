use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::CaptureError;

/// Buffer duration used when the configuration does not pin a packet count.
pub const DEFAULT_BUFFER_DURATION: Duration = Duration::from_millis(100);

/// Encoding of the captured byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodecTag {
    /// Signed little-endian integer PCM.
    LinearPcm,
    /// 32-bit little-endian float PCM.
    FloatPcm,
    /// iLBC, 8 kHz voice codec.
    Ilbc,
    #[serde(rename = "ulaw")]
    ULaw,
    #[serde(rename = "alaw")]
    ALaw,
}

impl CodecTag {
    pub fn is_pcm(self) -> bool {
        matches!(self, Self::LinearPcm | Self::FloatPcm)
    }
}

/// Immutable description of the captured stream format.
///
/// Fixed once a capture session is prepared. Packets are the unit the
/// capture queue counts in: one frame for PCM, a codec frame block otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AudioFormatDescriptor {
    pub sample_rate: f64,
    pub channels: u16,
    /// Bits per channel sample; 0 for compressed codecs.
    pub bits_per_channel: u16,
    pub frames_per_packet: u32,
    pub bytes_per_packet: u32,
    pub codec: CodecTag,
}

impl AudioFormatDescriptor {
    pub fn linear_pcm(sample_rate: f64, channels: u16, bits_per_channel: u16) -> Self {
        Self {
            sample_rate,
            channels,
            bits_per_channel,
            frames_per_packet: 1,
            bytes_per_packet: channels as u32 * bits_per_channel as u32 / 8,
            codec: CodecTag::LinearPcm,
        }
    }

    pub fn float_pcm(sample_rate: f64, channels: u16) -> Self {
        Self {
            codec: CodecTag::FloatPcm,
            ..Self::linear_pcm(sample_rate, channels, 32)
        }
    }

    /// iLBC in 30 ms mode: 240 frames packed into 50 bytes.
    pub fn ilbc() -> Self {
        Self {
            sample_rate: 8000.0,
            channels: 1,
            bits_per_channel: 0,
            frames_per_packet: 240,
            bytes_per_packet: 50,
            codec: CodecTag::Ilbc,
        }
    }

    pub fn ulaw(sample_rate: f64) -> Self {
        Self::companded(sample_rate, CodecTag::ULaw)
    }

    pub fn alaw(sample_rate: f64) -> Self {
        Self::companded(sample_rate, CodecTag::ALaw)
    }

    fn companded(sample_rate: f64, codec: CodecTag) -> Self {
        Self {
            sample_rate,
            channels: 1,
            bits_per_channel: 8,
            frames_per_packet: 1,
            bytes_per_packet: 1,
            codec,
        }
    }

    /// Bytes per interleaved frame, or `None` for packetized codecs.
    pub fn bytes_per_frame(&self) -> Option<u32> {
        (self.frames_per_packet == 1).then_some(self.bytes_per_packet)
    }

    /// Size in bytes of a capture buffer holding `packets` packets.
    pub fn buffer_byte_size(&self, packets: u32) -> usize {
        self.bytes_per_packet as usize * packets as usize
    }

    /// Number of whole packets covering `duration`, never less than one.
    pub fn packets_for_duration(&self, duration: Duration) -> u32 {
        let frames = self.sample_rate * duration.as_secs_f64();
        let packets = (frames / self.frames_per_packet.max(1) as f64).round() as u32;
        packets.max(1)
    }

    /// Whole packets contained in `bytes`.
    pub fn packet_count(&self, bytes: usize) -> u64 {
        if self.bytes_per_packet == 0 {
            return 0;
        }
        (bytes / self.bytes_per_packet as usize) as u64
    }

    /// Playback duration of `bytes` of captured audio.
    pub fn duration_of(&self, bytes: u64) -> Duration {
        if self.bytes_per_packet == 0 || self.sample_rate <= 0.0 {
            return Duration::ZERO;
        }
        let frames = (bytes / self.bytes_per_packet as u64) * self.frames_per_packet as u64;
        Duration::from_secs_f64(frames as f64 / self.sample_rate)
    }

    /// Level metering reads raw samples, so it needs an uncompressed stream.
    pub fn supports_metering(&self) -> bool {
        self.codec.is_pcm()
    }

    pub fn validate(&self) -> Result<(), CaptureError> {
        if self.sample_rate.is_nan() || self.sample_rate <= 0.0 {
            return Err(CaptureError::InvalidFormat("sample rate must be positive".into()));
        }
        if self.channels == 0 {
            return Err(CaptureError::InvalidFormat("channel count must be at least 1".into()));
        }
        if self.bytes_per_packet == 0 || self.frames_per_packet == 0 {
            return Err(CaptureError::InvalidFormat(
                "packets must carry at least one frame and one byte".into(),
            ));
        }
        match self.codec {
            CodecTag::LinearPcm => {
                if ![8, 16, 24, 32].contains(&self.bits_per_channel) {
                    return Err(CaptureError::InvalidFormat(format!(
                        "unsupported bit depth: {}",
                        self.bits_per_channel
                    )));
                }
            }
            CodecTag::FloatPcm => {
                if self.bits_per_channel != 32 {
                    return Err(CaptureError::InvalidFormat(
                        "float PCM must be 32 bits per channel".into(),
                    ));
                }
            }
            _ => {}
        }
        if self.codec.is_pcm() {
            let expected = self.channels as u32 * self.bits_per_channel as u32 / 8;
            if self.frames_per_packet != 1 || self.bytes_per_packet != expected {
                return Err(CaptureError::InvalidFormat(format!(
                    "PCM packet must be one frame of {} bytes",
                    expected
                )));
            }
        }
        Ok(())
    }
}

impl Default for AudioFormatDescriptor {
    fn default() -> Self {
        Self::linear_pcm(8000.0, 1, 16)
    }
}
