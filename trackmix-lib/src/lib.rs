//! # Trackmix Audio Library
//!
//! This library provides a real-time multi-track mixing engine. Tracks pull
//! PCM buffers from their providers, get resampled to the engine rate when
//! needed, and are mixed with per-channel volume ramps and an aux send into
//! output buses.
//! It includes modules for sample formats, volume ramps, resampling and more.

pub mod config;
#[cfg(feature = "bench")]
pub mod diagnostics;
pub mod dsp;
pub mod error;
pub mod format;
pub mod mixer;
pub mod playback_rate;
pub mod provider;
pub mod resampler;

#[cfg(test)]
mod test_support;

pub use config::MixerConfig;
pub use error::MixerError;
pub use format::{AudioFormat, ChannelMask, OutputFormat};
pub use mixer::{AudioMixer, FixedPointMixer, FloatMixer, Parameter, ProcessHook, TrackName};
pub use provider::{Buffer, BufferProvider};
