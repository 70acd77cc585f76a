//! Multi-track mixing engine.
//!
//! An [`AudioMixer`] owns a fixed pool of track slots, the output and aux
//! buses those tracks mix into, and the scratch memory used while mixing.
//! Configuration calls only record changes and mark the engine invalid;
//! the next [`AudioMixer::process`] call recomputes each track's needs and
//! picks the processing routine for the blocks that follow.

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::config::MixerConfig;
use crate::dsp::MixSample;
use crate::error::MixerError;
use crate::format::{AudioFormat, ChannelMask, OutputFormat, MAX_CHANNELS};
use crate::provider::BufferProvider;
use crate::resampler::{is_supported_rate, Resampler, ResamplerQuality};

pub mod adapt;
pub mod bus;
pub mod params;
mod process;
pub mod track;

pub use adapt::{ChannelRoute, DefaultAdaptation, TrackAdaptation};
pub use bus::{AuxBusId, BusId, BusSamples, OutputBus};
pub use params::{
    Parameter, ResampleParam, TimestretchParam, TrackParam, VolumeParam,
};
pub use track::{Needs, Track, TrackName};

use bus::AuxBus;

/// Engine accumulating in Q4.27 fixed point.
pub type FixedPointMixer = AudioMixer<i32>;
/// Engine accumulating in float.
pub type FloatMixer = AudioMixer<f32>;

/// Frames mixed per chunk by the generic non-resampling routine.
pub const BLOCKSIZE: usize = 16;

/// Top-level processing routine selected at validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessHook {
    /// No audible tracks; providers are drained and buses silenced.
    Nop,
    GenericNoResampling,
    GenericResampling,
    /// One 16-bit stereo track written straight into a 16-bit stereo bus.
    OneTrackNoResampling,
}

#[derive(Debug)]
struct BusGroup {
    bus: BusId,
    tracks: Vec<usize>,
}

struct Scratch<S> {
    accum: Vec<S>,
    input: Vec<S>,
    resample: Option<Vec<S>>,
}

/// Mixing engine generic over its accumulation sample.
pub struct AudioMixer<S: MixSample> {
    config: MixerConfig,
    tracks: Vec<Track>,
    allocated: u32,
    enabled: u32,
    needs_changed: u32,
    hook: Option<ProcessHook>,
    groups: Vec<BusGroup>,
    buses: Vec<OutputBus>,
    aux_buses: Vec<AuxBus<S>>,
    scratch: Scratch<S>,
    adaptation: Box<dyn TrackAdaptation>,
    rng: StdRng,
}

impl<S: MixSample> std::fmt::Debug for AudioMixer<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioMixer")
            .field("config", &self.config)
            .field("allocated", &format_args!("{:#x}", self.allocated))
            .field("enabled", &format_args!("{:#x}", self.enabled))
            .field("hook", &self.hook)
            .field("buses", &self.buses.len())
            .field("aux_buses", &self.aux_buses.len())
            .finish()
    }
}

pub(crate) fn bit_indices(mut mask: u32) -> impl Iterator<Item = usize> {
    std::iter::from_fn(move || {
        if mask == 0 {
            return None;
        }
        let index = mask.trailing_zeros() as usize;
        mask &= mask - 1;
        Some(index)
    })
}

impl<S: MixSample> AudioMixer<S> {
    /// Create an engine with an empty track pool and no buses.
    pub fn new(config: MixerConfig) -> Result<Self, MixerError> {
        config.validate()?;
        let worst_case = config.frame_count * MAX_CHANNELS;
        let tracks = (0..config.max_tracks as usize)
            .map(|index| Track::vacant(index, config.sample_rate))
            .collect();

        log::info!(
            "mixer created: {} frames per block at {} Hz, {} track slots",
            config.frame_count,
            config.sample_rate,
            config.max_tracks
        );

        Ok(Self {
            rng: StdRng::seed_from_u64(config.dither_seed),
            tracks,
            allocated: 0,
            enabled: 0,
            needs_changed: 0,
            hook: Some(ProcessHook::Nop),
            groups: Vec::new(),
            buses: Vec::new(),
            aux_buses: Vec::new(),
            scratch: Scratch {
                accum: vec![S::SILENCE; worst_case],
                input: vec![S::SILENCE; worst_case],
                resample: None,
            },
            adaptation: Box::new(DefaultAdaptation),
            config,
        })
    }

    /// Replace the channel/format adaptation strategy.
    ///
    /// Applies to tracks acquired or reconfigured afterwards.
    pub fn with_adaptation(mut self, adaptation: Box<dyn TrackAdaptation>) -> Self {
        self.adaptation = adaptation;
        self
    }

    pub fn config(&self) -> &MixerConfig {
        &self.config
    }

    pub fn frame_count(&self) -> usize {
        self.config.frame_count
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }

    /// Routine used by the next block, `None` while a change is pending.
    pub fn process_hook(&self) -> Option<ProcessHook> {
        self.hook
    }

    /// Add a main bus sized for one block.
    pub fn add_output_bus(
        &mut self,
        channel_mask: ChannelMask,
        format: OutputFormat,
    ) -> Result<BusId, MixerError> {
        if !channel_mask.is_valid() {
            return Err(MixerError::InvalidConfig(format!(
                "bus channel mask {} is not supported",
                channel_mask
            )));
        }
        let id = BusId(self.buses.len());
        self.buses
            .push(OutputBus::new(channel_mask, format, self.config.frame_count));
        log::debug!("output bus {} added: {} {:?}", id.0, channel_mask, format);
        Ok(id)
    }

    /// Add a mono aux bus in the internal representation.
    pub fn add_aux_bus(&mut self) -> AuxBusId {
        let id = AuxBusId(self.aux_buses.len());
        self.aux_buses.push(AuxBus::new(self.config.frame_count));
        log::debug!("aux bus {} added", id.0);
        id
    }

    pub fn output_bus(&self, id: BusId) -> Option<&OutputBus> {
        self.buses.get(id.0)
    }

    /// Aux bus contents of the last block.
    pub fn aux_bus(&self, id: AuxBusId) -> Option<&[S]> {
        self.aux_buses.get(id.0).map(|bus| bus.samples.as_slice())
    }

    pub fn free_track_count(&self) -> usize {
        self.tracks.len() - self.allocated.count_ones() as usize
    }

    pub fn track_names(&self) -> Vec<TrackName> {
        bit_indices(self.allocated).map(TrackName).collect()
    }

    pub fn track(&self, name: TrackName) -> Option<&Track> {
        self.track_ref(name).ok()
    }

    fn track_ref(&self, name: TrackName) -> Result<&Track, MixerError> {
        if name.0 < self.tracks.len() && self.allocated & name.bit() != 0 {
            Ok(&self.tracks[name.0])
        } else {
            Err(MixerError::InvalidTrack(name))
        }
    }

    fn track_mut(&mut self, name: TrackName) -> Result<&mut Track, MixerError> {
        if name.0 < self.tracks.len() && self.allocated & name.bit() != 0 {
            Ok(&mut self.tracks[name.0])
        } else {
            Err(MixerError::InvalidTrack(name))
        }
    }

    fn invalidate(&mut self, mask: u32) {
        if mask != 0 {
            self.needs_changed |= mask;
            self.hook = None;
        }
    }

    /// Allocate a track slot.
    ///
    /// # Arguments
    /// - `channel_mask`: Layout of the track's input.
    /// - `format`: Sample format delivered by the track's provider.
    /// - `session_id`: Caller-defined session tag.
    ///
    /// # Returns
    /// The new track's name, disabled, at unity volume with no aux send.
    pub fn acquire_track(
        &mut self,
        channel_mask: ChannelMask,
        format: AudioFormat,
        session_id: i32,
    ) -> Result<TrackName, MixerError> {
        if !format.is_linear_pcm() {
            log::warn!("track rejected: format {:?} is not linear PCM", format);
            return Err(MixerError::InvalidFormat(format));
        }
        let index = match (0..self.tracks.len()).find(|&i| self.allocated & (1 << i) == 0) {
            Some(index) => index,
            None => {
                log::warn!("track rejected: all {} slots in use", self.tracks.len());
                return Err(MixerError::NoFreeTracks);
            }
        };
        let name = TrackName(index);

        let route = self
            .adaptation
            .prepare_channel_adaptation(name, channel_mask, ChannelMask::STEREO)
            .map_err(|err| {
                log::warn!("track rejected: {}", err);
                err
            })?;
        self.adaptation
            .prepare_format_adaptation(name, format)
            .map_err(|err| {
                log::warn!("track rejected: {}", err);
                err
            })?;

        let sample_rate = self.config.sample_rate;
        self.tracks[index].reset(channel_mask, format, session_id, route, sample_rate);
        self.allocated |= name.bit();
        log::debug!(
            "{} acquired: mask {} format {:?} session {}",
            name,
            channel_mask,
            format,
            session_id
        );
        Ok(name)
    }

    /// Return a slot to the pool, releasing its buffers and resampler.
    pub fn release_track(&mut self, name: TrackName) -> Result<(), MixerError> {
        let track = self.track_mut(name)?;
        let was_enabled = track.enabled;
        track.enabled = false;
        track.release_held();
        track.resampler = None;
        track.provider = None;
        self.allocated &= !name.bit();
        if was_enabled {
            self.invalidate(name.bit());
        }
        log::debug!("{} released", name);
        Ok(())
    }

    pub fn enable(&mut self, name: TrackName) -> Result<(), MixerError> {
        self.set_enabled(name, true)
    }

    pub fn disable(&mut self, name: TrackName) -> Result<(), MixerError> {
        self.set_enabled(name, false)
    }

    fn set_enabled(&mut self, name: TrackName, enabled: bool) -> Result<(), MixerError> {
        let track = self.track_mut(name)?;
        if track.enabled != enabled {
            track.enabled = enabled;
            self.invalidate(name.bit());
            log::debug!("{} {}", name, if enabled { "enabled" } else { "disabled" });
        }
        Ok(())
    }

    /// Bind, swap or clear the provider a track pulls from.
    ///
    /// Buffers held from the previous provider are released to it and any
    /// resampler history is cleared.
    pub fn set_buffer_provider(
        &mut self,
        name: TrackName,
        provider: Option<Box<dyn BufferProvider>>,
    ) -> Result<(), MixerError> {
        let track = self.track_mut(name)?;
        track.release_held();
        track.reset_resampler();
        track.provider = provider;
        self.invalidate(name.bit());
        Ok(())
    }

    /// Input frames a track's resampler has consumed but not released.
    pub fn unreleased_frames(&self, name: TrackName) -> Result<usize, MixerError> {
        let track = self.track_ref(name)?;
        Ok(track
            .resampler
            .as_ref()
            .map_or(0, |resampler| resampler.unreleased_frames()))
    }

    /// Apply one parameter change. Unchanged values are a no-op.
    pub fn set_parameter(&mut self, name: TrackName, parameter: Parameter) -> Result<(), MixerError> {
        let changed = match parameter {
            Parameter::Track(param) => self.set_track_param(name, param)?,
            Parameter::Resample(param) => self.set_resample_param(name, param)?,
            Parameter::Volume(param) => self.set_volume_param(name, param, 0)?,
            Parameter::RampVolume(param) => {
                let ramp = self.config.frame_count;
                self.set_volume_param(name, param, ramp)?
            }
            Parameter::Timestretch(TimestretchParam::PlaybackRate(rate)) => {
                let track = self.track_mut(name)?;
                if track.playback_rate.approx_eq(&rate) {
                    false
                } else {
                    if !rate.is_valid() {
                        log::warn!(
                            "{}: playback rate speed {} pitch {} out of range",
                            name,
                            rate.speed,
                            rate.pitch
                        );
                    }
                    track.playback_rate = rate;
                    true
                }
            }
        };
        if changed {
            log::debug!("{}: {:?}", name, parameter);
            self.invalidate(name.bit());
        }
        Ok(())
    }

    fn mixer_mask(&self, track: &Track) -> ChannelMask {
        track
            .main_bus
            .and_then(|bus| self.buses.get(bus.0))
            .map_or(ChannelMask::STEREO, |bus| bus.channel_mask())
    }

    fn set_track_param(&mut self, name: TrackName, param: TrackParam) -> Result<bool, MixerError> {
        let quality = self.config.resampler_quality;
        let engine_rate = self.config.sample_rate;
        match param {
            TrackParam::ChannelMask(mask) => {
                let track = self.track_ref(name)?;
                if track.channel_mask() == mask {
                    return Ok(false);
                }
                let mixer_mask = self.mixer_mask(track);
                let route = self
                    .adaptation
                    .prepare_channel_adaptation(name, mask, mixer_mask)?;
                let track = self.track_mut(name)?;
                track.set_channel_mask(mask);
                track.route = route;
                rebuild_resampler(track, quality, engine_rate)?;
                Ok(true)
            }
            TrackParam::MainBuffer(bus) => {
                let bus_mask = self
                    .buses
                    .get(bus.0)
                    .map(|bus| bus.channel_mask())
                    .ok_or(MixerError::InvalidBus(bus.0))?;
                let track = self.track_ref(name)?;
                if track.main_bus == Some(bus) {
                    return Ok(false);
                }
                let track_mask = track.channel_mask();
                let route = self
                    .adaptation
                    .prepare_channel_adaptation(name, track_mask, bus_mask)?;
                let track = self.track_mut(name)?;
                track.main_bus = Some(bus);
                track.mixer_channel_mask = bus_mask;
                track.route = route;
                Ok(true)
            }
            TrackParam::AuxBuffer(aux) => {
                if let Some(id) = aux {
                    if id.0 >= self.aux_buses.len() {
                        return Err(MixerError::InvalidBus(id.0));
                    }
                }
                let track = self.track_mut(name)?;
                if track.aux_bus == aux {
                    return Ok(false);
                }
                track.aux_bus = aux;
                Ok(true)
            }
            TrackParam::Format(format) => {
                if self.track_ref(name)?.format == format {
                    return Ok(false);
                }
                if !format.is_linear_pcm() {
                    return Err(MixerError::InvalidFormat(format));
                }
                self.adaptation.prepare_format_adaptation(name, format)?;
                let track = self.track_mut(name)?;
                track.release_held();
                track.format = format;
                rebuild_resampler(track, quality, engine_rate)?;
                Ok(true)
            }
        }
    }

    fn set_resample_param(&mut self, name: TrackName, param: ResampleParam) -> Result<bool, MixerError> {
        let quality = self.config.resampler_quality;
        let engine_rate = self.config.sample_rate;
        let track = self.track_mut(name)?;
        match param {
            ResampleParam::SampleRate(rate) => {
                if rate == engine_rate {
                    if track.resampler.is_some() {
                        remove_resampler(track, engine_rate);
                        return Ok(true);
                    }
                    track.sample_rate = rate;
                    return Ok(false);
                }
                if !is_supported_rate(rate, engine_rate) {
                    log::warn!("{}: sample rate {} not supported", name, rate);
                    return Err(MixerError::InvalidSampleRate(rate));
                }
                match track.resampler.as_mut() {
                    Some(resampler) if resampler.sample_rate() == rate => return Ok(false),
                    Some(resampler) => resampler.set_sample_rate(rate)?,
                    None => {
                        let channels = track.channel_count();
                        track.resampler = Some(Resampler::new(
                            quality,
                            track.format,
                            channels,
                            rate,
                            engine_rate,
                        )?);
                        log::debug!("{}: resampler created {} -> {} Hz", name, rate, engine_rate);
                    }
                }
                track.sample_rate = rate;
                Ok(true)
            }
            ResampleParam::Reset => {
                if track.resampler.is_none() {
                    return Ok(false);
                }
                track.release_held();
                track.reset_resampler();
                Ok(true)
            }
            ResampleParam::Remove => {
                if track.resampler.is_none() {
                    return Ok(false);
                }
                remove_resampler(track, engine_rate);
                log::debug!("{}: resampler removed", name);
                Ok(true)
            }
        }
    }

    fn set_volume_param(
        &mut self,
        name: TrackName,
        param: VolumeParam,
        ramp_frames: usize,
    ) -> Result<bool, MixerError> {
        let track = self.track_mut(name)?;
        let changed = match param {
            VolumeParam::Volume0(value) => track.volume[0].set(value, ramp_frames),
            VolumeParam::Volume1(value) => track.volume[1].set(value, ramp_frames),
            VolumeParam::AuxLevel(value) => track.aux_level.set(value, ramp_frames),
        };
        Ok(changed)
    }
}

fn remove_resampler(track: &mut Track, engine_rate: u32) {
    track.release_held();
    track.resampler = None;
    track.sample_rate = engine_rate;
}

fn rebuild_resampler(
    track: &mut Track,
    quality: ResamplerQuality,
    engine_rate: u32,
) -> Result<(), MixerError> {
    if track.resampler.is_none() {
        return Ok(());
    }
    track.release_held();
    let channels = track.channel_count();
    track.resampler = Some(Resampler::new(
        quality,
        track.format,
        channels,
        track.sample_rate,
        engine_rate,
    )?);
    Ok(())
}

impl<S: MixSample> Drop for AudioMixer<S> {
    fn drop(&mut self) {
        for index in bit_indices(self.allocated) {
            self.tracks[index].release_held();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::AudioFormat;
    use crate::playback_rate::PlaybackRate;
    use crate::provider::calculate_output_pts;
    use crate::test_support::{ProviderStats, ScriptedProvider};

    const BLOCK: usize = 16;
    const RATE: u32 = 44_100;

    fn fixed_mixer() -> FixedPointMixer {
        AudioMixer::new(MixerConfig::new(BLOCK, RATE, 8)).unwrap()
    }

    fn stereo_track(
        mixer: &mut FixedPointMixer,
        bus: BusId,
        value: f32,
        frames: usize,
    ) -> (TrackName, ProviderStats) {
        let name = mixer
            .acquire_track(ChannelMask::STEREO, AudioFormat::Pcm16, 1)
            .unwrap();
        mixer
            .set_parameter(name, Parameter::Track(TrackParam::MainBuffer(bus)))
            .unwrap();
        let provider = ScriptedProvider::constant(AudioFormat::Pcm16, 2, value, frames);
        let stats = provider.stats();
        mixer
            .set_buffer_provider(name, Some(Box::new(provider)))
            .unwrap();
        mixer.enable(name).unwrap();
        (name, stats)
    }

    fn pcm16(mixer: &FixedPointMixer, bus: BusId) -> Vec<i16> {
        mixer.output_bus(bus).unwrap().as_pcm16().unwrap().to_vec()
    }

    #[test]
    fn acquire_release_restores_pool() {
        let mut mixer: FixedPointMixer = AudioMixer::new(MixerConfig::new(BLOCK, RATE, 4)).unwrap();
        let names: Vec<TrackName> = (0..4)
            .map(|_| {
                mixer
                    .acquire_track(ChannelMask::STEREO, AudioFormat::Pcm16, 0)
                    .unwrap()
            })
            .collect();
        assert_eq!(mixer.free_track_count(), 0);
        assert!(matches!(
            mixer.acquire_track(ChannelMask::STEREO, AudioFormat::Pcm16, 0),
            Err(MixerError::NoFreeTracks)
        ));

        mixer.release_track(names[2]).unwrap();
        assert_eq!(mixer.free_track_count(), 1);
        assert_eq!(mixer.track_names().len(), 3);
        let again = mixer
            .acquire_track(ChannelMask::MONO, AudioFormat::PcmFloat, 7)
            .unwrap();
        assert_eq!(again, names[2]);
        let track = mixer.track(again).unwrap();
        assert_eq!(track.session_id(), 7);
        assert_eq!(track.channel_count(), 1);
        assert!(!track.is_enabled());
        assert_eq!(track.volume(0).target(), 1.0);
        assert!(track.aux_level().is_silent());
    }

    #[test]
    fn released_name_is_invalid() {
        let mut mixer = fixed_mixer();
        let name = mixer
            .acquire_track(ChannelMask::STEREO, AudioFormat::Pcm16, 0)
            .unwrap();
        mixer.release_track(name).unwrap();
        assert!(matches!(mixer.enable(name), Err(MixerError::InvalidTrack(_))));
        assert!(matches!(
            mixer.set_parameter(name, Parameter::Volume(VolumeParam::Volume0(0.5))),
            Err(MixerError::InvalidTrack(_))
        ));
        assert!(mixer.unreleased_frames(name).is_err());
    }

    #[test]
    fn rejects_compressed_and_unmixable_tracks() {
        let mut mixer = fixed_mixer();
        assert!(matches!(
            mixer.acquire_track(ChannelMask::STEREO, AudioFormat::Mp3, 0),
            Err(MixerError::InvalidFormat(AudioFormat::Mp3))
        ));
        assert!(matches!(
            mixer.acquire_track(ChannelMask::SURROUND_5_1, AudioFormat::Pcm16, 0),
            Err(MixerError::ChannelMask { .. })
        ));
        assert_eq!(mixer.free_track_count(), 8);

        let name = mixer
            .acquire_track(ChannelMask::STEREO, AudioFormat::Pcm16, 0)
            .unwrap();
        assert!(matches!(
            mixer.set_parameter(name, Parameter::Track(TrackParam::Format(AudioFormat::Opus))),
            Err(MixerError::InvalidFormat(AudioFormat::Opus))
        ));
        assert!(matches!(
            mixer.set_parameter(name, Parameter::Track(TrackParam::MainBuffer(BusId(3)))),
            Err(MixerError::InvalidBus(3))
        ));
    }

    #[test]
    fn single_stereo_track_takes_fast_path() {
        let mut mixer = fixed_mixer();
        let bus = mixer
            .add_output_bus(ChannelMask::STEREO, OutputFormat::Pcm16)
            .unwrap();
        let (name, stats) = stereo_track(&mut mixer, bus, 0.25, 256);
        assert_eq!(mixer.process_hook(), None);

        mixer.process(None);
        assert_eq!(mixer.process_hook(), Some(ProcessHook::OneTrackNoResampling));
        assert!(pcm16(&mixer, bus).iter().all(|&s| s == 8192));
        assert_eq!(mixer.unreleased_frames(name).unwrap(), 0);

        mixer.process(None);
        assert!(pcm16(&mixer, bus).iter().all(|&s| s == 8192));
        assert_eq!(stats.gets(), stats.releases());
    }

    #[test]
    fn starvation_yields_silence() {
        let mut mixer = fixed_mixer();
        let bus = mixer
            .add_output_bus(ChannelMask::STEREO, OutputFormat::Pcm16)
            .unwrap();
        let (name, stats) = stereo_track(&mut mixer, bus, 0.25, 8);

        mixer.process(None);
        let out = pcm16(&mixer, bus);
        assert!(out[..16].iter().all(|&s| s == 8192));
        assert!(out[16..].iter().all(|&s| s == 0));

        mixer.process(None);
        assert!(pcm16(&mixer, bus).iter().all(|&s| s == 0));
        assert!(mixer.track(name).unwrap().is_enabled());
        assert_eq!(mixer.process_hook(), Some(ProcessHook::OneTrackNoResampling));
        assert_eq!(stats.gets(), stats.releases() + 2);
    }

    #[test]
    fn generic_path_sums_tracks_and_survives_starvation() {
        let mut mixer = fixed_mixer();
        let bus = mixer
            .add_output_bus(ChannelMask::STEREO, OutputFormat::Pcm16)
            .unwrap();
        let (_, first) = stereo_track(&mut mixer, bus, 0.25, 256);
        let (_, second) = stereo_track(&mut mixer, bus, 0.125, 4);

        mixer.process(None);
        assert_eq!(mixer.process_hook(), Some(ProcessHook::GenericNoResampling));
        let out = pcm16(&mixer, bus);
        assert!(out[..8].iter().all(|&s| s == 8192 + 4096));
        assert!(out[8..].iter().all(|&s| s == 8192));

        mixer.process(None);
        assert!(pcm16(&mixer, bus).iter().all(|&s| s == 8192));
        assert_eq!(first.gets(), first.releases());
        assert_eq!(second.releases(), 1);
    }

    #[test]
    fn chunked_provider_receives_advancing_pts() {
        let mut mixer = fixed_mixer();
        let bus = mixer
            .add_output_bus(ChannelMask::STEREO, OutputFormat::Pcm16)
            .unwrap();
        let name = mixer
            .acquire_track(ChannelMask::STEREO, AudioFormat::Pcm16, 0)
            .unwrap();
        mixer
            .set_parameter(name, Parameter::Track(TrackParam::MainBuffer(bus)))
            .unwrap();
        let provider = ScriptedProvider::from_frames(AudioFormat::Pcm16, 2, &[0.1; 128], 4);
        let stats = provider.stats();
        mixer
            .set_buffer_provider(name, Some(Box::new(provider)))
            .unwrap();
        mixer.enable(name).unwrap();

        let base = 5_000_000;
        mixer.process(Some(base));
        let expected: Vec<Option<i64>> = [0, 4, 8, 12]
            .iter()
            .map(|&frame| calculate_output_pts(Some(base), frame, RATE))
            .collect();
        assert_eq!(stats.pts(), expected);

        mixer.process(None);
        assert_eq!(stats.pts()[4], None);
    }

    #[test]
    fn ramped_mono_resampled_track_feeds_aux() {
        let mut mixer = fixed_mixer();
        let bus = mixer
            .add_output_bus(ChannelMask::STEREO, OutputFormat::Pcm16)
            .unwrap();
        let aux = mixer.add_aux_bus();
        stereo_track(&mut mixer, bus, 0.25, 1024);

        let b = mixer
            .acquire_track(ChannelMask::MONO, AudioFormat::Pcm16, 2)
            .unwrap();
        for param in [
            Parameter::Track(TrackParam::MainBuffer(bus)),
            Parameter::Track(TrackParam::AuxBuffer(Some(aux))),
            Parameter::Resample(ResampleParam::SampleRate(22_050)),
            Parameter::Volume(VolumeParam::Volume0(0.0)),
            Parameter::Volume(VolumeParam::Volume1(0.0)),
            Parameter::RampVolume(VolumeParam::Volume0(1.0)),
            Parameter::RampVolume(VolumeParam::Volume1(1.0)),
            Parameter::Volume(VolumeParam::AuxLevel(1.0)),
        ] {
            mixer.set_parameter(b, param).unwrap();
        }
        let provider = ScriptedProvider::constant(AudioFormat::Pcm16, 1, 0.5, 1024);
        mixer
            .set_buffer_provider(b, Some(Box::new(provider)))
            .unwrap();
        mixer.enable(b).unwrap();

        mixer.process(None);
        assert_eq!(mixer.process_hook(), Some(ProcessHook::GenericResampling));
        let track = mixer.track(b).unwrap();
        assert!(track.has_resampler());
        assert!(track.needs().contains(Needs::RESAMPLE | Needs::AUX));
        assert_eq!(track.needs().channel_count(), 1);
        assert!(!track.volume(0).is_ramping());
        assert!(mixer.unreleased_frames(b).unwrap() > 0);

        // Only the resampled track sends to aux.
        let sent = mixer.aux_bus(aux).unwrap();
        assert_eq!(sent.len(), BLOCK);
        assert!(sent.iter().all(|&s| (s.to_unit() - 0.5).abs() < 1e-3));

        let out = pcm16(&mixer, bus);
        assert!((out[0] - 8192).abs() <= 1);
        assert!(out[2 * (BLOCK - 1)] > 8192 + 12_000);

        mixer.process(None);
        let out = pcm16(&mixer, bus);
        assert!(out.iter().all(|&s| (s - 24_576).abs() <= 1));
    }

    #[test]
    fn muted_track_keeps_draining_one_buffer_per_block() {
        let mut mixer = fixed_mixer();
        let bus = mixer
            .add_output_bus(ChannelMask::STEREO, OutputFormat::Pcm16)
            .unwrap();
        let (name, stats) = stereo_track(&mut mixer, bus, 0.5, 4096);
        mixer
            .set_parameter(name, Parameter::RampVolume(VolumeParam::Volume0(0.0)))
            .unwrap();
        mixer
            .set_parameter(name, Parameter::RampVolume(VolumeParam::Volume1(0.0)))
            .unwrap();

        mixer.process(None);
        assert!(mixer.track(name).unwrap().needs().contains(Needs::MUTE));
        assert_eq!(mixer.process_hook(), Some(ProcessHook::Nop));
        assert_eq!((stats.gets(), stats.releases()), (1, 1));

        for block in 2..=5 {
            mixer.process(None);
            assert_eq!((stats.gets(), stats.releases()), (block, block));
            assert!(pcm16(&mixer, bus).iter().all(|&s| s == 0));
        }
    }

    #[test]
    fn silent_track_is_muted_even_with_aux_send() {
        let mut mixer = fixed_mixer();
        let bus = mixer
            .add_output_bus(ChannelMask::STEREO, OutputFormat::Pcm16)
            .unwrap();
        let aux = mixer.add_aux_bus();
        let (name, stats) = stereo_track(&mut mixer, bus, 0.5, 4096);
        for param in [
            Parameter::Volume(VolumeParam::Volume0(0.0)),
            Parameter::Volume(VolumeParam::Volume1(0.0)),
            Parameter::Track(TrackParam::AuxBuffer(Some(aux))),
            Parameter::Volume(VolumeParam::AuxLevel(1.0)),
        ] {
            mixer.set_parameter(name, param).unwrap();
        }

        for block in 1..=2 {
            mixer.process(None);
            let needs = mixer.track(name).unwrap().needs();
            assert!(needs.contains(Needs::MUTE | Needs::AUX));
            assert!(mixer.aux_bus(aux).unwrap().iter().all(|&s| s == 0));
            assert!(pcm16(&mixer, bus).iter().all(|&s| s == 0));
            assert_eq!((stats.gets(), stats.releases()), (block, block));
        }
        assert_eq!(mixer.process_hook(), Some(ProcessHook::Nop));
    }

    #[test]
    fn ramped_lone_track_settles_into_fast_path() {
        let mut mixer = fixed_mixer();
        let bus = mixer
            .add_output_bus(ChannelMask::STEREO, OutputFormat::Pcm16)
            .unwrap();
        let (name, stats) = stereo_track(&mut mixer, bus, 0.5, 4096);
        mixer
            .set_parameter(name, Parameter::RampVolume(VolumeParam::Volume0(0.5)))
            .unwrap();
        mixer
            .set_parameter(name, Parameter::RampVolume(VolumeParam::Volume1(0.5)))
            .unwrap();

        mixer.process(None);
        assert!(!mixer.track(name).unwrap().volume(0).is_ramping());
        assert_eq!(mixer.process_hook(), Some(ProcessHook::OneTrackNoResampling));
        let out = pcm16(&mixer, bus);
        assert!(out[0] > out[2 * (BLOCK - 1)]);

        mixer.process(None);
        assert_eq!(mixer.process_hook(), Some(ProcessHook::OneTrackNoResampling));
        assert!(pcm16(&mixer, bus).iter().all(|&s| (s - 8192).abs() <= 1));
        assert_eq!((stats.gets(), stats.releases()), (2, 2));
    }

    #[test]
    fn tracks_mix_only_into_their_bus() {
        let mut mixer = fixed_mixer();
        let left = mixer
            .add_output_bus(ChannelMask::STEREO, OutputFormat::Pcm16)
            .unwrap();
        let right = mixer
            .add_output_bus(ChannelMask::STEREO, OutputFormat::Pcm16)
            .unwrap();
        let idle = mixer
            .add_output_bus(ChannelMask::STEREO, OutputFormat::Pcm16)
            .unwrap();
        stereo_track(&mut mixer, left, 0.25, 256);
        stereo_track(&mut mixer, right, 0.125, 256);

        mixer.process(None);
        assert!(pcm16(&mixer, left).iter().all(|&s| s == 8192));
        assert!(pcm16(&mixer, right).iter().all(|&s| s == 4096));
        assert!(pcm16(&mixer, idle).iter().all(|&s| s == 0));
    }

    #[test]
    fn float_engine_expands_mono_with_channel_volumes() {
        let mut mixer: FloatMixer = AudioMixer::new(MixerConfig::new(BLOCK, RATE, 2)).unwrap();
        let bus = mixer
            .add_output_bus(ChannelMask::STEREO, OutputFormat::Float)
            .unwrap();
        let name = mixer
            .acquire_track(ChannelMask::MONO, AudioFormat::PcmFloat, 0)
            .unwrap();
        for param in [
            Parameter::Track(TrackParam::MainBuffer(bus)),
            Parameter::Volume(VolumeParam::Volume0(0.5)),
            Parameter::Volume(VolumeParam::Volume1(0.25)),
        ] {
            mixer.set_parameter(name, param).unwrap();
        }
        let provider = ScriptedProvider::constant(AudioFormat::PcmFloat, 1, 0.5, 64);
        mixer
            .set_buffer_provider(name, Some(Box::new(provider)))
            .unwrap();
        mixer.enable(name).unwrap();

        mixer.process(None);
        assert_eq!(mixer.process_hook(), Some(ProcessHook::GenericNoResampling));
        let out = mixer.output_bus(bus).unwrap().as_float().unwrap();
        for frame in out.chunks(2) {
            assert_eq!(frame, &[0.25, 0.125]);
        }
    }

    #[test]
    fn float_engine_mixes_ramped_resampled_aux_track() {
        let mut mixer: FloatMixer = AudioMixer::new(MixerConfig::new(BLOCK, RATE, 4)).unwrap();
        let bus = mixer
            .add_output_bus(ChannelMask::STEREO, OutputFormat::Float)
            .unwrap();
        let aux = mixer.add_aux_bus();

        let a = mixer
            .acquire_track(ChannelMask::STEREO, AudioFormat::Pcm16, 1)
            .unwrap();
        mixer
            .set_parameter(a, Parameter::Track(TrackParam::MainBuffer(bus)))
            .unwrap();
        let provider = ScriptedProvider::constant(AudioFormat::Pcm16, 2, 0.25, 1024);
        mixer
            .set_buffer_provider(a, Some(Box::new(provider)))
            .unwrap();
        mixer.enable(a).unwrap();

        let b = mixer
            .acquire_track(ChannelMask::MONO, AudioFormat::Pcm16, 2)
            .unwrap();
        for param in [
            Parameter::Track(TrackParam::MainBuffer(bus)),
            Parameter::Track(TrackParam::AuxBuffer(Some(aux))),
            Parameter::Resample(ResampleParam::SampleRate(22_050)),
            Parameter::Volume(VolumeParam::Volume0(0.0)),
            Parameter::Volume(VolumeParam::Volume1(0.0)),
            Parameter::RampVolume(VolumeParam::Volume0(1.0)),
            Parameter::RampVolume(VolumeParam::Volume1(1.0)),
            Parameter::Volume(VolumeParam::AuxLevel(1.0)),
        ] {
            mixer.set_parameter(b, param).unwrap();
        }
        let provider = ScriptedProvider::constant(AudioFormat::Pcm16, 1, 0.5, 1024);
        mixer
            .set_buffer_provider(b, Some(Box::new(provider)))
            .unwrap();
        mixer.enable(b).unwrap();

        mixer.process(None);
        assert_eq!(mixer.process_hook(), Some(ProcessHook::GenericResampling));
        let track = mixer.track(b).unwrap();
        assert!(track.has_resampler());
        assert!(track.needs().contains(Needs::RESAMPLE | Needs::AUX));
        assert_eq!(track.needs().channel_count(), 1);
        assert!(!track.volume(1).is_ramping());

        let sent = mixer.aux_bus(aux).unwrap();
        assert_eq!(sent.len(), BLOCK);
        assert!(sent.iter().all(|&s| (s - 0.5).abs() < 1e-4));

        let out = mixer.output_bus(bus).unwrap().as_float().unwrap();
        assert!((out[0] - 0.25).abs() < 1e-4);
        assert!(out[2 * (BLOCK - 1)] > 0.6);

        mixer.process(None);
        let out = mixer.output_bus(bus).unwrap().as_float().unwrap();
        assert!(out.iter().all(|&s| (s - 0.75).abs() < 1e-4));
    }

    #[test]
    fn unchanged_parameters_keep_engine_valid() {
        let mut mixer = fixed_mixer();
        let bus = mixer
            .add_output_bus(ChannelMask::STEREO, OutputFormat::Pcm16)
            .unwrap();
        let (name, _) = stereo_track(&mut mixer, bus, 0.25, 256);
        mixer.process(None);
        assert!(mixer.process_hook().is_some());

        mixer
            .set_parameter(name, Parameter::Volume(VolumeParam::Volume0(1.0)))
            .unwrap();
        mixer
            .set_parameter(name, Parameter::Track(TrackParam::MainBuffer(bus)))
            .unwrap();
        mixer
            .set_parameter(name, Parameter::Resample(ResampleParam::SampleRate(RATE)))
            .unwrap();
        mixer
            .set_parameter(
                name,
                Parameter::Timestretch(TimestretchParam::PlaybackRate(PlaybackRate::default())),
            )
            .unwrap();
        mixer.enable(name).unwrap();
        assert!(mixer.process_hook().is_some());

        mixer
            .set_parameter(name, Parameter::Volume(VolumeParam::Volume0(0.5)))
            .unwrap();
        assert_eq!(mixer.process_hook(), None);
    }

    #[test]
    fn sample_rate_controls_resampler_lifetime() {
        let mut mixer = fixed_mixer();
        let name = mixer
            .acquire_track(ChannelMask::STEREO, AudioFormat::Pcm16, 0)
            .unwrap();
        assert!(matches!(
            mixer.set_parameter(name, Parameter::Resample(ResampleParam::SampleRate(0))),
            Err(MixerError::InvalidSampleRate(0))
        ));

        mixer
            .set_parameter(name, Parameter::Resample(ResampleParam::SampleRate(48_000)))
            .unwrap();
        assert_eq!(
            mixer.track(name).unwrap().resampler().map(|r| r.sample_rate()),
            Some(48_000)
        );
        mixer
            .set_parameter(name, Parameter::Resample(ResampleParam::SampleRate(RATE)))
            .unwrap();
        assert!(!mixer.track(name).unwrap().has_resampler());

        mixer
            .set_parameter(name, Parameter::Resample(ResampleParam::SampleRate(8_000)))
            .unwrap();
        mixer
            .set_parameter(name, Parameter::Resample(ResampleParam::Remove))
            .unwrap();
        let track = mixer.track(name).unwrap();
        assert!(!track.has_resampler());
        assert_eq!(track.sample_rate(), RATE);
    }

    #[test]
    fn enabled_track_without_provider_is_skipped() {
        let mut mixer = fixed_mixer();
        let bus = mixer
            .add_output_bus(ChannelMask::STEREO, OutputFormat::Pcm16)
            .unwrap();
        let name = mixer
            .acquire_track(ChannelMask::STEREO, AudioFormat::Pcm16, 0)
            .unwrap();
        mixer
            .set_parameter(name, Parameter::Track(TrackParam::MainBuffer(bus)))
            .unwrap();
        mixer.enable(name).unwrap();

        mixer.process(None);
        assert_eq!(mixer.process_hook(), Some(ProcessHook::Nop));
        assert!(pcm16(&mixer, bus).iter().all(|&s| s == 0));
    }

    #[test]
    fn held_buffers_are_returned() {
        let mut mixer = fixed_mixer();
        let bus = mixer
            .add_output_bus(ChannelMask::STEREO, OutputFormat::Pcm16)
            .unwrap();
        let (name, stats) = stereo_track(&mut mixer, bus, 0.25, 1024);
        mixer
            .set_parameter(name, Parameter::Resample(ResampleParam::SampleRate(32_000)))
            .unwrap();
        mixer.process(None);
        assert!(mixer.unreleased_frames(name).unwrap() > 0);
        assert_eq!(stats.gets(), stats.releases() + 1);

        mixer.release_track(name).unwrap();
        assert_eq!(stats.gets(), stats.releases());

        let (_, stats) = stereo_track(&mut mixer, bus, 0.25, 1024);
        mixer.process(None);
        drop(mixer);
        assert_eq!(stats.gets(), stats.releases());
    }

    #[test]
    fn provider_without_data_gives_silent_block() {
        let mut mixer = fixed_mixer();
        let bus = mixer
            .add_output_bus(ChannelMask::STEREO, OutputFormat::Pcm16)
            .unwrap();
        let (_, stats) = stereo_track(&mut mixer, bus, 0.25, 0);
        if let Some(samples) = mixer.buses[bus.0].pcm16_mut() {
            samples.fill(123);
        }

        mixer.process(None);
        assert!(pcm16(&mixer, bus).iter().all(|&s| s == 0));
        assert_eq!((stats.gets(), stats.releases()), (1, 0));
    }
}
