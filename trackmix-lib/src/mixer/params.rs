//! Typed parameters accepted by [`super::AudioMixer::set_parameter`].

use crate::format::{AudioFormat, ChannelMask};
use crate::playback_rate::PlaybackRate;

use super::bus::{AuxBusId, BusId};

/// A parameter target together with its new value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Parameter {
    Track(TrackParam),
    Resample(ResampleParam),
    /// Applied immediately.
    Volume(VolumeParam),
    /// Ramped over one block.
    RampVolume(VolumeParam),
    Timestretch(TimestretchParam),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrackParam {
    ChannelMask(ChannelMask),
    MainBuffer(BusId),
    AuxBuffer(Option<AuxBusId>),
    Format(AudioFormat),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ResampleParam {
    /// Source sample rate; a rate equal to the engine's drops the resampler.
    SampleRate(u32),
    /// Clear resampler phase and history.
    Reset,
    /// Drop the resampler and treat the track as running at the engine rate.
    Remove,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VolumeParam {
    Volume0(f32),
    Volume1(f32),
    AuxLevel(f32),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TimestretchParam {
    PlaybackRate(PlaybackRate),
}
