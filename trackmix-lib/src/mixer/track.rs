//! Per-slot track state.

use std::fmt::{Display, Formatter};

use crate::dsp::ramp::VolumeRamp;
use crate::dsp::volume::{mix_frames, AuxSend, ChannelRoute, MixBus};
use crate::dsp::MixSample;
use crate::format::{decode_frames, AudioFormat, ChannelMask};
use crate::playback_rate::PlaybackRate;
use crate::provider::{self, calculate_output_pts, Buffer, BufferProvider};
use crate::resampler::Resampler;

use super::bus::{AuxBusId, BusId};

/// Handle of a track slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrackName(pub(crate) usize);

impl TrackName {
    /// Slot index inside the engine's pool.
    pub fn index(self) -> usize {
        self.0
    }

    pub(crate) fn bit(self) -> u32 {
        1 << self.0
    }
}

impl Display for TrackName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "track{}", self.0)
    }
}

/// Processing a track requires, derived from its configuration on each
/// validation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Needs(u32);

impl Needs {
    /// Channel count class: channel count minus one.
    pub const CHANNEL_COUNT_MASK: u32 = 0x7;
    pub const MUTE: u32 = 0x100;
    pub const RESAMPLE: u32 = 0x1000;
    pub const AUX: u32 = 0x10000;

    pub fn bits(self) -> u32 {
        self.0
    }

    /// Whether every bit of `flags` is set.
    pub fn contains(self, flags: u32) -> bool {
        self.0 & flags == flags
    }

    pub fn channel_count(self) -> usize {
        (self.0 & Self::CHANNEL_COUNT_MASK) as usize + 1
    }

    fn for_channels(channels: usize) -> Self {
        Self((channels.saturating_sub(1) as u32) & Self::CHANNEL_COUNT_MASK)
    }

    fn insert(&mut self, flags: u32) {
        self.0 |= flags;
    }
}

/// Per-track routine chosen at validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TrackHook {
    /// Drain the provider without mixing.
    Nop,
    Resample,
    NoResample,
}

/// Mixing state of one allocated slot.
pub struct Track {
    name: TrackName,
    pub(crate) enabled: bool,
    pub(crate) needs: Needs,
    pub(crate) hook: TrackHook,
    channel_mask: ChannelMask,
    pub(crate) mixer_channel_mask: ChannelMask,
    pub(crate) route: ChannelRoute,
    pub(crate) format: AudioFormat,
    session_id: i32,
    pub(crate) volume: [VolumeRamp; 2],
    pub(crate) aux_level: VolumeRamp,
    pub(crate) resampler: Option<Resampler>,
    pub(crate) sample_rate: u32,
    pub(crate) main_bus: Option<BusId>,
    pub(crate) aux_bus: Option<AuxBusId>,
    pub(crate) provider: Option<Box<dyn BufferProvider>>,
    pub(crate) buffer: Buffer,
    pub(crate) consumed: usize,
    pub(crate) playback_rate: PlaybackRate,
}

impl std::fmt::Debug for Track {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Track")
            .field("name", &self.name)
            .field("enabled", &self.enabled)
            .field("needs", &self.needs)
            .field("channel_mask", &self.channel_mask)
            .field("format", &self.format)
            .field("volume", &self.volume)
            .field("aux_level", &self.aux_level)
            .field("resampler", &self.resampler.is_some())
            .field("sample_rate", &self.sample_rate)
            .field("main_bus", &self.main_bus)
            .field("aux_bus", &self.aux_bus)
            .field("provider", &self.provider.is_some())
            .finish()
    }
}

impl Track {
    pub(crate) fn vacant(index: usize, sample_rate: u32) -> Self {
        Self {
            name: TrackName(index),
            enabled: false,
            needs: Needs::default(),
            hook: TrackHook::Nop,
            channel_mask: ChannelMask::STEREO,
            mixer_channel_mask: ChannelMask::STEREO,
            route: ChannelRoute::Direct,
            format: AudioFormat::Pcm16,
            session_id: 0,
            volume: [VolumeRamp::unity(), VolumeRamp::unity()],
            aux_level: VolumeRamp::silent(),
            resampler: None,
            sample_rate,
            main_bus: None,
            aux_bus: None,
            provider: None,
            buffer: Buffer::default(),
            consumed: 0,
            playback_rate: PlaybackRate::default(),
        }
    }

    /// Reinitialize a freshly acquired slot.
    pub(crate) fn reset(
        &mut self,
        channel_mask: ChannelMask,
        format: AudioFormat,
        session_id: i32,
        route: ChannelRoute,
        sample_rate: u32,
    ) {
        *self = Self::vacant(self.name.0, sample_rate);
        self.channel_mask = channel_mask;
        self.needs = Needs::for_channels(channel_mask.channel_count());
        self.format = format;
        self.session_id = session_id;
        self.route = route;
    }

    pub fn name(&self) -> TrackName {
        self.name
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Needs mask computed by the most recent validation pass.
    pub fn needs(&self) -> Needs {
        self.needs
    }

    pub fn channel_mask(&self) -> ChannelMask {
        self.channel_mask
    }

    pub fn channel_count(&self) -> usize {
        self.channel_mask.channel_count()
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    pub fn session_id(&self) -> i32 {
        self.session_id
    }

    /// Ramp of channel volume `channel` (0 or 1).
    pub fn volume(&self, channel: usize) -> &VolumeRamp {
        &self.volume[channel.min(1)]
    }

    pub fn aux_level(&self) -> &VolumeRamp {
        &self.aux_level
    }

    pub fn has_resampler(&self) -> bool {
        self.resampler.is_some()
    }

    pub fn resampler(&self) -> Option<&Resampler> {
        self.resampler.as_ref()
    }

    /// Source sample rate of the track.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn main_bus(&self) -> Option<BusId> {
        self.main_bus
    }

    pub fn aux_bus(&self) -> Option<AuxBusId> {
        self.aux_bus
    }

    pub fn playback_rate(&self) -> PlaybackRate {
        self.playback_rate
    }

    pub(crate) fn set_channel_mask(&mut self, mask: ChannelMask) {
        self.channel_mask = mask;
    }

    pub(crate) fn frame_size(&self) -> usize {
        self.format.frame_size(self.channel_count())
    }

    pub(crate) fn is_ramping(&self) -> bool {
        self.volume[0].is_ramping() || self.volume[1].is_ramping()
    }

    pub(crate) fn aux_active(&self) -> bool {
        self.aux_bus.is_some() && !self.aux_level.is_silent()
    }

    /// No resampler and both volumes settled at zero. A muted track also
    /// sends nothing to its aux bus.
    pub(crate) fn is_mute_eligible(&self) -> bool {
        self.resampler.is_none()
            && !self.is_ramping()
            && self.volume[0].is_silent()
            && self.volume[1].is_silent()
    }

    pub(crate) fn compute_needs(&self) -> Needs {
        let mut needs = Needs::for_channels(self.channel_count());
        if self.resampler.is_some() {
            needs.insert(Needs::RESAMPLE);
        }
        if self.aux_active() {
            needs.insert(Needs::AUX);
        }
        if self.is_mute_eligible() {
            needs.insert(Needs::MUTE);
        }
        needs
    }

    pub(crate) fn mark_muted(&mut self) {
        self.needs.insert(Needs::MUTE);
        self.hook = TrackHook::Nop;
    }

    /// Whether the single-track 16-bit stereo path can mix this track.
    pub(crate) fn is_fast_path_eligible(&self) -> bool {
        !self.needs.contains(Needs::MUTE)
            && self.resampler.is_none()
            && !self.is_ramping()
            && !self.aux_active()
            && self.format == AudioFormat::Pcm16
            && self.channel_count() == 2
            && self.route == ChannelRoute::Direct
    }

    /// Return held buffers to the provider.
    pub(crate) fn release_held(&mut self) {
        if let Some(source) = self.provider.as_deref_mut() {
            if let Some(resampler) = self.resampler.as_mut() {
                resampler.release_held(source);
            }
            provider::release(source, &mut self.buffer);
        }
        self.buffer.reset_request(0);
        self.consumed = 0;
    }

    /// Return held input and clear the resampler's phase and history.
    pub(crate) fn reset_resampler(&mut self) {
        if let Some(resampler) = self.resampler.as_mut() {
            match self.provider.as_deref_mut() {
                Some(source) => resampler.reset(source),
                None => resampler.clear_history(),
            }
        }
    }

    pub(crate) fn advance_ramps(&mut self, frames: usize) {
        self.volume[0].advance(frames);
        self.volume[1].advance(frames);
        self.aux_level.advance(frames);
    }

    /// Fetch the next buffer for the direct (non-resampled) path.
    pub(crate) fn fetch(&mut self, frames: usize, pts: Option<i64>) -> bool {
        let frame_size = self.frame_size();
        self.consumed = 0;
        match self.provider.as_deref_mut() {
            Some(source) => provider::fetch(source, &mut self.buffer, frames, frame_size, pts),
            None => {
                self.buffer.reset_request(0);
                false
            }
        }
    }

    pub(crate) fn release_buffer(&mut self) {
        if let Some(source) = self.provider.as_deref_mut() {
            provider::release(source, &mut self.buffer);
        }
        self.buffer.reset_request(0);
        self.consumed = 0;
    }

    /// Frames of the held direct-path buffer not yet consumed.
    pub(crate) fn frames_ready(&self) -> usize {
        if self.buffer.has_data() {
            self.buffer.frame_count.saturating_sub(self.consumed)
        } else {
            0
        }
    }

    /// Pull and discard `frames` frames, one buffer at a time.
    pub(crate) fn drain(&mut self, frames: usize, pts: Option<i64>, sample_rate: u32) {
        let mut done = 0;
        while done < frames {
            if !self.fetch(frames - done, calculate_output_pts(pts, done, sample_rate)) {
                break;
            }
            done += self.buffer.frame_count;
            self.release_buffer();
        }
    }

    /// Resample `frames` frames into `temp`, zeroing any shortfall.
    pub(crate) fn resample_into<S: MixSample>(&mut self, temp: &mut [S], frames: usize, pts: Option<i64>) -> usize {
        let channels = self.channel_count();
        let span = (frames * channels).min(temp.len());
        temp[..span].fill(S::SILENCE);
        match (self.resampler.as_mut(), self.provider.as_deref_mut()) {
            (Some(resampler), Some(source)) => {
                resampler.set_pts(pts);
                resampler.resample(&mut temp[..span], frames, source)
            }
            _ => 0,
        }
    }

    /// Mix `frames` frames of the held direct-path buffer into `bus`.
    pub(crate) fn mix_held<S: MixSample>(
        &mut self,
        frames: usize,
        scratch: &mut [S],
        bus: MixBus<'_, S>,
        aux: Option<&mut [S]>,
    ) {
        let channels = self.channel_count();
        let decoded = match self.buffer.raw.as_deref() {
            Some(raw) => decode_frames(self.format, raw, channels, self.consumed, frames, scratch),
            None => 0,
        };
        self.mix_decoded(&scratch[..decoded * channels], decoded, bus, aux);
    }

    /// Apply volume and aux send to already decoded input.
    pub(crate) fn mix_decoded<S: MixSample>(
        &mut self,
        input: &[S],
        frames: usize,
        bus: MixBus<'_, S>,
        aux: Option<&mut [S]>,
    ) {
        let aux = if self.needs.contains(Needs::AUX) {
            aux.map(|samples| AuxSend {
                samples,
                level: &self.aux_level,
            })
        } else {
            None
        };
        mix_frames(
            input,
            self.channel_count(),
            frames,
            self.route,
            &self.volume,
            bus,
            aux,
        );
        self.advance_ramps(frames);
    }
}
