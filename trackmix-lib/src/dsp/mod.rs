//! Sample arithmetic shared by the mixing loop.
//!
//! The engine accumulates in one of two internal representations, chosen
//! by the sample type it is instantiated with:
//!
//! - `i32`: Q4.27 fixed point. 16-bit input widens by 12 bits and gains are
//!   U4.12, so unity gain leaves a widened sample untouched.
//! - `f32`: unit-range float with float gains.

use std::fmt::Debug;

use rand::rngs::StdRng;
use rand::Rng;

pub mod convert;
pub mod level;
pub mod ramp;
pub mod volume;

use ramp::VolumeRamp;

const Q4_27_ONE: f32 = (1u32 << 27) as f32;
const PCM16_SHIFT: u32 = 12;

/// Accumulation sample of the mixing engine.
pub trait MixSample: Copy + Default + PartialEq + Debug + Send + Sync + 'static {
    /// Per-frame gain in this representation.
    type Gain: Copy + Debug;

    const SILENCE: Self;

    /// Widen a unit-range value.
    fn from_unit(value: f32) -> Self;

    /// Widen a 16-bit PCM sample.
    fn from_pcm16(sample: i16) -> Self;

    /// Narrow to a unit-range float.
    fn to_unit(self) -> f32;

    /// Gain of `ramp` at `frame` frames into the current run.
    fn gain(ramp: &VolumeRamp, frame: usize) -> Self::Gain;

    fn scale(self, gain: Self::Gain) -> Self;

    fn accumulate(self, other: Self) -> Self;

    /// Average of one interleaved frame.
    fn mean(frame: &[Self]) -> Self;

    /// Quantize to 16-bit PCM, dithering where the representation is wider.
    fn to_pcm16(self, rng: &mut StdRng) -> i16;
}

impl MixSample for i32 {
    type Gain = i32;

    const SILENCE: Self = 0;

    fn from_unit(value: f32) -> Self {
        // Float to int casts saturate.
        (value * Q4_27_ONE) as i32
    }

    fn from_pcm16(sample: i16) -> Self {
        (sample as i32) << PCM16_SHIFT
    }

    fn to_unit(self) -> f32 {
        self as f32 / Q4_27_ONE
    }

    fn gain(ramp: &VolumeRamp, frame: usize) -> i32 {
        ramp.gain_at_fixed(frame)
    }

    fn scale(self, gain: i32) -> Self {
        ((self as i64 * gain as i64) >> 12) as i32
    }

    fn accumulate(self, other: Self) -> Self {
        self.saturating_add(other)
    }

    fn mean(frame: &[Self]) -> Self {
        if frame.is_empty() {
            return 0;
        }
        let sum: i64 = frame.iter().map(|&s| s as i64).sum();
        (sum / frame.len() as i64) as i32
    }

    fn to_pcm16(self, rng: &mut StdRng) -> i16 {
        let dither = rng.gen_range(0..(1 << PCM16_SHIFT));
        let narrowed = self.saturating_add(dither) >> PCM16_SHIFT;
        narrowed.clamp(i16::MIN as i32, i16::MAX as i32) as i16
    }
}

impl MixSample for f32 {
    type Gain = f32;

    const SILENCE: Self = 0.0;

    fn from_unit(value: f32) -> Self {
        value
    }

    fn from_pcm16(sample: i16) -> Self {
        sample as f32 / 32768.0
    }

    fn to_unit(self) -> f32 {
        self
    }

    fn gain(ramp: &VolumeRamp, frame: usize) -> f32 {
        ramp.gain_at(frame)
    }

    fn scale(self, gain: f32) -> Self {
        self * gain
    }

    fn accumulate(self, other: Self) -> Self {
        self + other
    }

    fn mean(frame: &[Self]) -> Self {
        if frame.is_empty() {
            return 0.0;
        }
        frame.iter().sum::<f32>() / frame.len() as f32
    }

    fn to_pcm16(self, _rng: &mut StdRng) -> i16 {
        if self.is_nan() {
            return 0;
        }
        (self * 32768.0).round().clamp(-32768.0, 32767.0) as i16
    }
}
