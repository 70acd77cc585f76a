//! Audio sample formats, channel masks and per-sample conversion helpers.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::dsp::MixSample;

/// Maximum number of channels a track or bus may carry.
pub const MAX_CHANNELS: usize = 8;

/// Input sample formats a track may declare.
///
/// Only the linear PCM and float kinds can be mixed; the compressed kinds
/// exist so callers can describe a stream and have it rejected up front.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioFormat {
    Pcm8,
    Pcm16,
    Pcm24Packed,
    Pcm32,
    PcmFloat,
    Mp3,
    Aac,
    Vorbis,
    Opus,
}

impl AudioFormat {
    /// Whether samples in this format can be decoded directly by the mixer.
    pub fn is_linear_pcm(self) -> bool {
        self.bytes_per_sample().is_some()
    }

    /// Size of one sample in bytes, `None` for compressed formats.
    pub fn bytes_per_sample(self) -> Option<usize> {
        match self {
            Self::Pcm8 => Some(1),
            Self::Pcm16 => Some(2),
            Self::Pcm24Packed => Some(3),
            Self::Pcm32 | Self::PcmFloat => Some(4),
            Self::Mp3 | Self::Aac | Self::Vorbis | Self::Opus => None,
        }
    }

    /// Size of one interleaved frame in bytes.
    pub fn frame_size(self, channels: usize) -> usize {
        self.bytes_per_sample().unwrap_or(0) * channels
    }
}

/// Output representation of a main bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    Pcm16,
    Float,
}

/// Speaker-position bitmask describing a channel layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelMask(pub u32);

impl ChannelMask {
    pub const FRONT_LEFT: u32 = 0x1;
    pub const FRONT_RIGHT: u32 = 0x2;
    pub const FRONT_CENTER: u32 = 0x4;
    pub const LOW_FREQUENCY: u32 = 0x8;
    pub const BACK_LEFT: u32 = 0x10;
    pub const BACK_RIGHT: u32 = 0x20;
    pub const SIDE_LEFT: u32 = 0x200;
    pub const SIDE_RIGHT: u32 = 0x400;

    pub const MONO: ChannelMask = ChannelMask(Self::FRONT_LEFT);
    pub const STEREO: ChannelMask = ChannelMask(Self::FRONT_LEFT | Self::FRONT_RIGHT);
    pub const QUAD: ChannelMask = ChannelMask(
        Self::FRONT_LEFT | Self::FRONT_RIGHT | Self::BACK_LEFT | Self::BACK_RIGHT,
    );
    pub const SURROUND_5_1: ChannelMask = ChannelMask(
        Self::FRONT_LEFT
            | Self::FRONT_RIGHT
            | Self::FRONT_CENTER
            | Self::LOW_FREQUENCY
            | Self::BACK_LEFT
            | Self::BACK_RIGHT,
    );
    pub const SURROUND_7_1: ChannelMask =
        ChannelMask(Self::SURROUND_5_1.0 | Self::SIDE_LEFT | Self::SIDE_RIGHT);

    /// Number of channels described by the mask.
    pub fn channel_count(self) -> usize {
        self.0.count_ones() as usize
    }

    /// Whether the mask names between one and [`MAX_CHANNELS`] channels.
    pub fn is_valid(self) -> bool {
        (1..=MAX_CHANNELS).contains(&self.channel_count())
    }

    /// Canonical mask for a plain channel count.
    pub fn from_channel_count(channels: usize) -> Option<Self> {
        match channels {
            1 => Some(Self::MONO),
            2 => Some(Self::STEREO),
            4 => Some(Self::QUAD),
            6 => Some(Self::SURROUND_5_1),
            8 => Some(Self::SURROUND_7_1),
            3 | 5 | 7 => Some(Self((1u32 << channels) - 1)),
            _ => None,
        }
    }
}

impl Display for ChannelMask {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Convert an unsigned 8-bit sample to `f32`.
pub fn convert_unsigned_8bit_to_f32(sample: u8) -> f32 {
    (sample as i16 - 128) as f32 / 128.0
}

/// Convert a signed 16-bit sample to `f32`.
pub fn convert_signed_16bit_to_f32(sample: i16) -> f32 {
    sample as f32 / 2f32.powi(15)
}

/// Convert a signed 24-bit sample stored in an `i32` to `f32`.
pub fn convert_signed_24bit_to_f32(sample: i32) -> f32 {
    // The 24-bit value occupies the low bits; shift to sign-extend.
    let shifted_sample = sample << 8 >> 8;
    shifted_sample as f32 / 2f32.powi(23)
}

/// Convert a signed 32-bit sample to `f32`.
pub fn convert_signed_32bit_to_f32(sample: i32) -> f32 {
    sample as f32 / 2f32.powi(31)
}

/// Decode the sample starting at `bytes[0]` into a unit-range `f32`.
///
/// `bytes` must hold at least `format.bytes_per_sample()` bytes. Multi-byte
/// samples are native-endian, except packed 24-bit which is little-endian.
pub fn decode_sample(format: AudioFormat, bytes: &[u8]) -> f32 {
    match format {
        AudioFormat::Pcm8 => convert_unsigned_8bit_to_f32(bytes[0]),
        AudioFormat::Pcm16 => convert_signed_16bit_to_f32(i16::from_ne_bytes([bytes[0], bytes[1]])),
        AudioFormat::Pcm24Packed => {
            let raw = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], 0]);
            convert_signed_24bit_to_f32(raw)
        }
        AudioFormat::Pcm32 => convert_signed_32bit_to_f32(i32::from_ne_bytes([
            bytes[0], bytes[1], bytes[2], bytes[3],
        ])),
        AudioFormat::PcmFloat => f32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        AudioFormat::Mp3 | AudioFormat::Aac | AudioFormat::Vorbis | AudioFormat::Opus => 0.0,
    }
}

/// Append one unit-range sample to `out`, encoded as `format`.
pub fn encode_sample(format: AudioFormat, value: f32, out: &mut Vec<u8>) {
    let value = if value.is_nan() { 0.0 } else { value };
    match format {
        AudioFormat::Pcm8 => {
            let scaled = (value * 128.0).round().clamp(-128.0, 127.0) as i16 + 128;
            out.push(scaled as u8);
        }
        AudioFormat::Pcm16 => {
            let scaled = (value * 32768.0).round().clamp(-32768.0, 32767.0) as i16;
            out.extend_from_slice(&scaled.to_ne_bytes());
        }
        AudioFormat::Pcm24Packed => {
            let scaled = (value * 8_388_608.0).round().clamp(-8_388_608.0, 8_388_607.0) as i32;
            out.extend_from_slice(&scaled.to_le_bytes()[..3]);
        }
        AudioFormat::Pcm32 => {
            let scaled = (value as f64 * 2_147_483_648.0)
                .round()
                .clamp(-2_147_483_648.0, 2_147_483_647.0) as i32;
            out.extend_from_slice(&scaled.to_ne_bytes());
        }
        AudioFormat::PcmFloat => out.extend_from_slice(&value.to_ne_bytes()),
        AudioFormat::Mp3 | AudioFormat::Aac | AudioFormat::Vorbis | AudioFormat::Opus => {}
    }
}

/// Decode `frames` interleaved frames of `raw`, starting at `start_frame`,
/// into the accumulation domain of `S`.
///
/// Returns the number of frames actually decoded, which is smaller than
/// `frames` when `raw` or `out` is too short.
pub fn decode_frames<S: MixSample>(
    format: AudioFormat,
    raw: &[u8],
    channels: usize,
    start_frame: usize,
    frames: usize,
    out: &mut [S],
) -> usize {
    let bytes = match format.bytes_per_sample() {
        Some(bytes) => bytes,
        None => return 0,
    };
    let frame_size = bytes * channels;
    if frame_size == 0 {
        return 0;
    }
    let available = (raw.len() / frame_size).saturating_sub(start_frame);
    let frames = frames.min(available).min(out.len() / channels);
    let start = start_frame * frame_size;

    for (index, dst) in out[..frames * channels].iter_mut().enumerate() {
        let at = start + index * bytes;
        *dst = match format {
            AudioFormat::Pcm16 => S::from_pcm16(i16::from_ne_bytes([raw[at], raw[at + 1]])),
            _ => S::from_unit(decode_sample(format, &raw[at..at + bytes])),
        };
    }
    frames
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_count_follows_mask_bits() {
        assert_eq!(ChannelMask::MONO.channel_count(), 1);
        assert_eq!(ChannelMask::STEREO.channel_count(), 2);
        assert_eq!(ChannelMask::SURROUND_5_1.channel_count(), 6);
        assert_eq!(ChannelMask::SURROUND_7_1.channel_count(), 8);
        assert!(!ChannelMask(0).is_valid());
        assert!(!ChannelMask(0x1ff).is_valid());
    }

    #[test]
    fn compressed_formats_are_not_linear() {
        assert!(AudioFormat::Pcm16.is_linear_pcm());
        assert!(AudioFormat::PcmFloat.is_linear_pcm());
        assert!(!AudioFormat::Mp3.is_linear_pcm());
        assert!(!AudioFormat::Opus.is_linear_pcm());
        assert_eq!(AudioFormat::Pcm24Packed.frame_size(2), 6);
    }

    #[test]
    fn encode_then_decode_preserves_values_per_format() {
        let formats = [
            AudioFormat::Pcm8,
            AudioFormat::Pcm16,
            AudioFormat::Pcm24Packed,
            AudioFormat::Pcm32,
            AudioFormat::PcmFloat,
        ];
        for format in formats {
            let mut bytes = Vec::new();
            encode_sample(format, -0.5, &mut bytes);
            encode_sample(format, 0.25, &mut bytes);
            let size = format.bytes_per_sample().unwrap();
            assert_eq!(bytes.len(), size * 2);
            let first = decode_sample(format, &bytes[..size]);
            let second = decode_sample(format, &bytes[size..]);
            assert!((first + 0.5).abs() < 1.0 / 64.0, "{:?}", format);
            assert!((second - 0.25).abs() < 1.0 / 64.0, "{:?}", format);
        }
    }

    #[test]
    fn encode_clamps_out_of_range_values() {
        let mut bytes = Vec::new();
        encode_sample(AudioFormat::Pcm16, 4.0, &mut bytes);
        encode_sample(AudioFormat::Pcm16, -4.0, &mut bytes);
        assert_eq!(i16::from_ne_bytes([bytes[0], bytes[1]]), i16::MAX);
        assert_eq!(i16::from_ne_bytes([bytes[2], bytes[3]]), i16::MIN);
    }

    #[test]
    fn decode_frames_widens_pcm16_exactly() {
        let mut raw = Vec::new();
        for sample in [1i16, -2, 3, -4] {
            raw.extend_from_slice(&sample.to_ne_bytes());
        }
        let mut out = [0i32; 4];
        let decoded = decode_frames(AudioFormat::Pcm16, &raw, 2, 0, 8, &mut out);
        assert_eq!(decoded, 2);
        assert_eq!(out, [1 << 12, -2 << 12, 3 << 12, -4 << 12]);

        let mut tail = [0.0f32; 2];
        let decoded = decode_frames(AudioFormat::Pcm16, &raw, 2, 1, 1, &mut tail);
        assert_eq!(decoded, 1);
        assert_eq!(tail, [3.0 / 32768.0, -4.0 / 32768.0]);
    }
}
