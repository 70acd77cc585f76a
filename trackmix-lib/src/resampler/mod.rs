//! Streaming sample-rate conversion for a single track.
//!
//! The resampler pulls input straight from the track's provider, keeps a
//! four-frame history window per channel and a 32.32 fixed-point phase
//! accumulator. Phase and history persist across calls so output is
//! continuous from block to block.

use serde::{Deserialize, Serialize};

use crate::dsp::MixSample;
use crate::error::MixerError;
use crate::format::{decode_sample, AudioFormat, MAX_CHANNELS};
use crate::provider::{self, calculate_output_pts, Buffer, BufferProvider};

mod kernel;

/// Largest supported ratio of source rate to output rate.
pub const DOWN_RATIO_MAX: u32 = 256;
/// Largest supported ratio of output rate to source rate.
pub const UP_RATIO_MAX: u32 = 65536;

const PHASE_BITS: u32 = 32;
const PHASE_ONE: u64 = 1 << PHASE_BITS;

/// Interpolation kernel used by a resampler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResamplerQuality {
    /// Two-point linear interpolation.
    Linear,
    /// Four-point Catmull-Rom interpolation.
    Cubic,
}

impl Default for ResamplerQuality {
    fn default() -> Self {
        Self::Cubic
    }
}

/// Input frames needed to produce `dst_frames` output frames.
///
/// Includes one frame for rounding and one for interpolation look-ahead
/// whenever the rates differ.
pub fn source_frames_needed(src_rate: u32, dst_frames: usize, dst_rate: u32) -> usize {
    if src_rate == dst_rate || dst_rate == 0 {
        return dst_frames;
    }
    (dst_frames as u64 * src_rate as u64 / dst_rate as u64) as usize + 1 + 1
}

/// Input frames needed when a time stretcher running at `speed` sits in
/// front of the resampler.
pub fn source_frames_needed_with_timestretch(
    src_rate: u32,
    dst_frames: usize,
    dst_rate: u32,
    speed: f32,
) -> usize {
    let required = source_frames_needed(src_rate, dst_frames, dst_rate);
    (required as f64 * speed as f64) as usize + 1 + 1
}

/// Output frames that `src_frames` input frames can safely produce.
pub fn destination_frames_possible(src_frames: usize, src_rate: u32, dst_rate: u32) -> usize {
    if src_rate == dst_rate || src_rate == 0 {
        return src_frames;
    }
    let dst_frames = src_frames as u64 * dst_rate as u64 / src_rate as u64;
    dst_frames.saturating_sub(2) as usize
}

/// Whether converting `src_rate` to `dst_rate` stays within the ratio limits.
pub fn is_supported_rate(src_rate: u32, dst_rate: u32) -> bool {
    if src_rate == 0 || dst_rate == 0 {
        return false;
    }
    let src = src_rate as u64;
    let dst = dst_rate as u64;
    src <= dst * DOWN_RATIO_MAX as u64 && src * UP_RATIO_MAX as u64 >= dst
}

/// Streaming resampler bound to one track.
#[derive(Debug)]
pub struct Resampler {
    quality: ResamplerQuality,
    format: AudioFormat,
    channels: usize,
    in_rate: u32,
    out_rate: u32,
    phase_increment: u64,
    phase_fraction: u64,
    window: [[f32; 4]; MAX_CHANNELS],
    primed: bool,
    buffer: Buffer,
    input_index: usize,
    pts: Option<i64>,
}

impl Resampler {
    /// Create a resampler converting `in_rate` to `out_rate`.
    ///
    /// # Arguments
    /// - `quality`: Interpolation kernel.
    /// - `format`: Sample format delivered by the provider.
    /// - `channels`: Interleaved channel count, 1 to [`MAX_CHANNELS`].
    /// - `in_rate`: Source sample rate.
    /// - `out_rate`: Engine sample rate.
    pub fn new(
        quality: ResamplerQuality,
        format: AudioFormat,
        channels: usize,
        in_rate: u32,
        out_rate: u32,
    ) -> Result<Self, MixerError> {
        if !format.is_linear_pcm() {
            return Err(MixerError::InvalidFormat(format));
        }
        if !is_supported_rate(in_rate, out_rate) {
            return Err(MixerError::InvalidSampleRate(in_rate));
        }
        Ok(Self {
            quality,
            format,
            channels: channels.clamp(1, MAX_CHANNELS),
            in_rate,
            out_rate,
            phase_increment: phase_increment(in_rate, out_rate),
            phase_fraction: 0,
            window: [[0.0; 4]; MAX_CHANNELS],
            primed: false,
            buffer: Buffer::default(),
            input_index: 0,
            pts: None,
        })
    }

    /// Change the source rate, keeping phase and history.
    pub fn set_sample_rate(&mut self, in_rate: u32) -> Result<(), MixerError> {
        if !is_supported_rate(in_rate, self.out_rate) {
            return Err(MixerError::InvalidSampleRate(in_rate));
        }
        self.in_rate = in_rate;
        self.phase_increment = phase_increment(in_rate, self.out_rate);
        Ok(())
    }

    /// Presentation time of the first frame produced by the next call.
    pub fn set_pts(&mut self, pts: Option<i64>) {
        self.pts = pts;
    }

    /// Return any held input buffer to `provider`, then clear phase and
    /// interpolation history.
    pub fn reset(&mut self, provider: &mut dyn BufferProvider) {
        self.release_held(provider);
        self.clear_history();
    }

    /// Clear phase and history of a resampler holding no input.
    pub(crate) fn clear_history(&mut self) {
        if self.buffer.has_data() {
            log::warn!("resampler cleared while holding {} input frames", self.buffer.frame_count);
        }
        self.buffer.reset_request(0);
        self.input_index = 0;
        self.phase_fraction = 0;
        self.window = [[0.0; 4]; MAX_CHANNELS];
        self.primed = false;
    }

    /// Return any held input buffer to `provider`.
    pub fn release_held(&mut self, provider: &mut dyn BufferProvider) {
        provider::release(provider, &mut self.buffer);
        self.input_index = 0;
    }

    /// Input frames consumed from the held buffer but not yet released.
    pub fn unreleased_frames(&self) -> usize {
        if self.buffer.has_data() {
            self.input_index
        } else {
            0
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.in_rate
    }

    pub fn quality(&self) -> ResamplerQuality {
        self.quality
    }

    /// Sub-frame position in 0.32 fixed point; may hold whole frames still
    /// to be consumed after a short call.
    pub fn phase_fraction(&self) -> u64 {
        self.phase_fraction
    }

    /// Produce up to `frames` interleaved frames into `out`.
    ///
    /// Input is pulled from `provider` as needed; exhausted buffers are
    /// released before the next is requested. A provider with no data ends
    /// the call early.
    ///
    /// # Returns
    /// Number of frames written.
    pub fn resample<S: MixSample>(
        &mut self,
        out: &mut [S],
        frames: usize,
        provider: &mut dyn BufferProvider,
    ) -> usize {
        let channels = self.channels;
        let frames = frames.min(out.len() / channels);
        let frame_size = self.format.frame_size(channels);
        let mut produced = 0;

        while produced < frames {
            while !self.primed || self.phase_fraction >= PHASE_ONE {
                if !self.buffer.has_data() || self.input_index >= self.buffer.frame_count {
                    provider::release(provider, &mut self.buffer);
                    self.input_index = 0;
                    let wanted = self.input_frames_for(frames - produced);
                    let pts = calculate_output_pts(self.pts, produced, self.out_rate);
                    if !provider::fetch(provider, &mut self.buffer, wanted, frame_size, pts) {
                        return produced;
                    }
                }
                self.consume_input_frame(frame_size);
            }

            let fraction = (self.phase_fraction as f64 / PHASE_ONE as f64) as f32;
            let dst = &mut out[produced * channels..(produced + 1) * channels];
            for (channel, sample) in dst.iter_mut().enumerate() {
                let value = kernel::interpolate(self.quality, &self.window[channel], fraction);
                *sample = S::from_unit(value);
            }
            produced += 1;
            self.phase_fraction += self.phase_increment;
        }
        produced
    }

    fn input_frames_for(&self, out_frames: usize) -> usize {
        let needed = (out_frames as u64 * self.in_rate as u64).div_ceil(self.out_rate as u64);
        needed.max(1) as usize
    }

    fn consume_input_frame(&mut self, frame_size: usize) {
        let bytes = self.format.bytes_per_sample().unwrap_or(0);
        let start = self.input_index * frame_size;
        if let Some(raw) = self.buffer.raw.as_ref() {
            for channel in 0..self.channels {
                let at = start + channel * bytes;
                let value = decode_sample(self.format, &raw[at..at + bytes]);
                let history = &mut self.window[channel];
                if self.primed {
                    history.rotate_left(1);
                    history[3] = value;
                } else {
                    *history = [value; 4];
                }
            }
        }
        self.input_index += 1;
        if self.primed {
            self.phase_fraction -= PHASE_ONE;
        } else {
            self.primed = true;
        }
    }
}

fn phase_increment(in_rate: u32, out_rate: u32) -> u64 {
    ((in_rate as u64) << PHASE_BITS) / out_rate.max(1) as u64
}
