//! Error type for engine configuration.

use std::fmt::{Display, Formatter};

use crate::format::{AudioFormat, ChannelMask};
use crate::mixer::track::TrackName;

/// Error returned by configuration calls on the mixing engine.
///
/// Runtime conditions such as provider starvation or degenerate volume
/// values are never reported through this type; they are absorbed by the
/// processing loop.
#[derive(Debug)]
pub enum MixerError {
    /// The requested input format is not linear PCM or float.
    InvalidFormat(AudioFormat),
    /// Every slot in the track pool is allocated.
    NoFreeTracks,
    /// The channel adaptation strategy rejected a track/mixer mask pair.
    ChannelMask {
        track: ChannelMask,
        mixer: ChannelMask,
    },
    /// The format adaptation strategy rejected an input format.
    UnsupportedFormat(AudioFormat),
    /// The name does not refer to an allocated track.
    InvalidTrack(TrackName),
    /// The bus id does not refer to a bus owned by this engine.
    InvalidBus(usize),
    /// The sample rate is zero or outside the resampler's ratio limits.
    InvalidSampleRate(u32),
    InvalidConfig(String),
    Config(serde_json::Error),
}

impl Display for MixerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidFormat(format) => write!(f, "invalid track format: {:?}", format),
            Self::NoFreeTracks => write!(f, "no free track slot"),
            Self::ChannelMask { track, mixer } => write!(
                f,
                "cannot adapt track channel mask {} to mixer channel mask {}",
                track, mixer
            ),
            Self::UnsupportedFormat(format) => write!(f, "unsupported track format: {:?}", format),
            Self::InvalidTrack(name) => write!(f, "invalid track name: {}", name),
            Self::InvalidBus(id) => write!(f, "invalid bus id: {}", id),
            Self::InvalidSampleRate(rate) => write!(f, "invalid sample rate: {}", rate),
            Self::InvalidConfig(reason) => write!(f, "invalid mixer config: {}", reason),
            Self::Config(err) => write!(f, "config parse error: {}", err),
        }
    }
}

impl std::error::Error for MixerError {}

impl From<serde_json::Error> for MixerError {
    fn from(value: serde_json::Error) -> Self {
        Self::Config(value)
    }
}
