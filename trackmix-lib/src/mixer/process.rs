//! Validation pass and the per-block processing routines.

use crate::dsp::convert::convert_mixer_format;
use crate::dsp::volume::MixBus;
use crate::dsp::MixSample;
use crate::format::{ChannelMask, OutputFormat, MAX_CHANNELS};
use crate::provider::calculate_output_pts;

use super::bus::{AuxBus, AuxBusId};
use super::track::{Needs, TrackHook};
use super::{bit_indices, AudioMixer, BusGroup, ProcessHook, BLOCKSIZE};

fn aux_slice<S>(
    aux_buses: &mut [AuxBus<S>],
    id: Option<AuxBusId>,
    start: usize,
    frames: usize,
) -> Option<&mut [S]> {
    let bus = aux_buses.get_mut(id?.0)?;
    let end = (start + frames).min(bus.samples.len());
    bus.samples.get_mut(start.min(end)..end)
}

impl<S: MixSample> AudioMixer<S> {
    /// Mix one block into every bus.
    ///
    /// Pending configuration changes are validated first, which may select
    /// a different routine for this and subsequent blocks.
    ///
    /// # Arguments
    /// - `pts`: Presentation time of the block's first frame, forwarded to
    ///   providers and advanced per frame consumed.
    pub fn process(&mut self, pts: Option<i64>) {
        match self.hook {
            Some(hook) => self.run(hook, pts),
            None => self.validate(pts),
        }
    }

    fn validate(&mut self, pts: Option<i64>) {
        let changed = std::mem::take(&mut self.needs_changed);
        let mut enabled = self.enabled & !changed;
        for index in bit_indices(changed) {
            if self.allocated & (1 << index) != 0 && self.tracks[index].enabled {
                enabled |= 1 << index;
            }
        }

        for index in bit_indices(enabled) {
            let track = &self.tracks[index];
            let has_bus = track
                .main_bus
                .map_or(false, |bus| bus.0 < self.buses.len());
            if track.provider.is_none() || !has_bus {
                log::warn!(
                    "{}: enabled without {}, not mixed",
                    track.name(),
                    if track.provider.is_none() {
                        "a buffer provider"
                    } else {
                        "a main bus"
                    }
                );
                enabled &= !(1 << index);
            }
        }
        self.enabled = enabled;

        let mut count = 0;
        let mut resampling = false;
        let mut volume_ramp = false;
        for index in bit_indices(enabled) {
            let track = &mut self.tracks[index];
            track.needs = track.compute_needs();
            track.hook = if track.needs.contains(Needs::MUTE) {
                TrackHook::Nop
            } else if track.needs.contains(Needs::RESAMPLE) {
                TrackHook::Resample
            } else {
                TrackHook::NoResample
            };
            count += 1;
            resampling |= track.needs.contains(Needs::RESAMPLE);
            volume_ramp |= track.is_ramping();
        }

        if resampling {
            if self.scratch.resample.is_none() {
                self.scratch.resample =
                    Some(vec![S::SILENCE; self.config.frame_count * MAX_CHANNELS]);
            }
        } else {
            self.scratch.resample = None;
        }
        self.build_groups();

        let hook = if count == 0 {
            ProcessHook::Nop
        } else if resampling {
            ProcessHook::GenericResampling
        } else if count == 1 && !volume_ramp && self.fast_path_track().is_some() {
            ProcessHook::OneTrackNoResampling
        } else {
            ProcessHook::GenericNoResampling
        };
        log::info!(
            "mixer validated: {:?} with {} active track(s) on {} bus(es)",
            hook,
            count,
            self.groups.len()
        );
        self.hook = Some(hook);
        self.run(hook, pts);

        if count == 0 {
            return;
        }

        // Ramps have settled by now; silent tracks can stop being mixed.
        let mut all_muted = true;
        for index in bit_indices(self.enabled) {
            let track = &mut self.tracks[index];
            if track.needs.contains(Needs::MUTE) {
                continue;
            }
            if track.is_mute_eligible() {
                track.mark_muted();
            } else {
                all_muted = false;
            }
        }
        let settled = if all_muted {
            ProcessHook::Nop
        } else if count == 1 && self.fast_path_track().is_some() {
            ProcessHook::OneTrackNoResampling
        } else {
            hook
        };
        if settled != hook {
            log::debug!("mixer hook settled from {:?} to {:?}", hook, settled);
            self.hook = Some(settled);
        }
    }

    fn build_groups(&mut self) {
        let mut groups: Vec<BusGroup> = Vec::new();
        for index in bit_indices(self.enabled) {
            let bus = match self.tracks[index].main_bus {
                Some(bus) => bus,
                None => continue,
            };
            match groups.iter_mut().find(|group| group.bus == bus) {
                Some(group) => group.tracks.push(index),
                None => groups.push(BusGroup {
                    bus,
                    tracks: vec![index],
                }),
            }
        }
        groups.sort_by_key(|group| group.bus);
        self.groups = groups;
    }

    /// The single enabled track, if it qualifies for the 16-bit stereo path.
    fn fast_path_track(&self) -> Option<usize> {
        if self.enabled.count_ones() != 1 {
            return None;
        }
        let index = self.enabled.trailing_zeros() as usize;
        let track = &self.tracks[index];
        let bus = self.buses.get(track.main_bus?.0)?;
        let eligible = track.is_fast_path_eligible()
            && bus.channel_mask() == ChannelMask::STEREO
            && bus.format() == OutputFormat::Pcm16;
        eligible.then_some(index)
    }

    fn run(&mut self, hook: ProcessHook, pts: Option<i64>) {
        for aux in &mut self.aux_buses {
            aux.clear();
        }
        for (id, bus) in self.buses.iter_mut().enumerate() {
            if hook == ProcessHook::Nop || !self.groups.iter().any(|group| group.bus.0 == id) {
                bus.fill_silence();
            }
        }

        match hook {
            ProcessHook::Nop => self.process_nop(pts),
            ProcessHook::GenericNoResampling => self.process_generic_no_resampling(pts),
            ProcessHook::GenericResampling => self.process_generic_resampling(pts),
            ProcessHook::OneTrackNoResampling => self.process_one_track_no_resampling(pts),
        }

        #[cfg(feature = "debug")]
        log::trace!("{:?} block of {} frames done", hook, self.config.frame_count);
    }

    /// Keep providers advancing without mixing anything.
    fn process_nop(&mut self, pts: Option<i64>) {
        let frames = self.config.frame_count;
        let rate = self.config.sample_rate;
        for index in bit_indices(self.enabled) {
            self.tracks[index].drain(frames, pts, rate);
        }
    }

    fn process_generic_no_resampling(&mut self, pts: Option<i64>) {
        let frame_count = self.config.frame_count;
        let rate = self.config.sample_rate;
        let Self {
            tracks,
            groups,
            buses,
            aux_buses,
            scratch,
            rng,
            ..
        } = self;

        for group in groups.iter() {
            let bus = match buses.get_mut(group.bus.0) {
                Some(bus) => bus,
                None => continue,
            };
            let out_channels = bus.channel_count();

            // Tracks that starve drop out for the rest of this block only.
            let mut active: u32 = 0;
            for &index in &group.tracks {
                if tracks[index].fetch(frame_count, pts) {
                    active |= 1 << index;
                }
            }

            let mut done = 0;
            while done < frame_count {
                let chunk = BLOCKSIZE.min(frame_count - done);
                let accum = &mut scratch.accum[..chunk * out_channels];
                accum.fill(S::SILENCE);

                for &index in &group.tracks {
                    if active & (1 << index) == 0 {
                        continue;
                    }
                    let track = &mut tracks[index];
                    let mut filled = 0;
                    while filled < chunk {
                        let ready = track.frames_ready().min(chunk - filled);
                        if ready > 0 {
                            if track.hook != TrackHook::Nop {
                                let aux = aux_slice(aux_buses, track.aux_bus, done + filled, ready);
                                let target = MixBus {
                                    samples: &mut accum
                                        [filled * out_channels..(filled + ready) * out_channels],
                                    channels: out_channels,
                                };
                                track.mix_held(ready, &mut scratch.input, target, aux);
                            }
                            track.consumed += ready;
                            filled += ready;
                        }
                        if filled < chunk {
                            track.release_buffer();
                            let offset = done + filled;
                            let next_pts = calculate_output_pts(pts, offset, rate);
                            if !track.fetch(frame_count - offset, next_pts) {
                                active &= !(1 << index);
                                break;
                            }
                        }
                    }
                }

                let out = bus.slice_mut(done * out_channels, (done + chunk) * out_channels);
                convert_mixer_format(accum, out, rng);
                done += chunk;
            }

            for &index in &group.tracks {
                tracks[index].release_buffer();
            }
        }
    }

    fn process_generic_resampling(&mut self, pts: Option<i64>) {
        let frame_count = self.config.frame_count;
        let rate = self.config.sample_rate;
        let Self {
            tracks,
            groups,
            buses,
            aux_buses,
            scratch,
            rng,
            ..
        } = self;

        for group in groups.iter() {
            let bus = match buses.get_mut(group.bus.0) {
                Some(bus) => bus,
                None => continue,
            };
            let out_channels = bus.channel_count();
            let span = frame_count * out_channels;
            scratch.accum[..span].fill(S::SILENCE);

            for &index in &group.tracks {
                let track = &mut tracks[index];
                match track.hook {
                    TrackHook::Resample => {
                        let temp = match scratch.resample.as_mut() {
                            Some(temp) => temp,
                            None => continue,
                        };
                        let produced = track.resample_into(temp, frame_count, pts);
                        if produced < frame_count {
                            log::trace!(
                                "{}: resampler short by {} frames",
                                track.name(),
                                frame_count - produced
                            );
                        }
                        let channels = track.channel_count();
                        let aux = aux_slice(aux_buses, track.aux_bus, 0, frame_count);
                        let target = MixBus {
                            samples: &mut scratch.accum[..span],
                            channels: out_channels,
                        };
                        track.mix_decoded(&temp[..frame_count * channels], frame_count, target, aux);
                    }
                    TrackHook::NoResample | TrackHook::Nop => {
                        let mut out_frames = 0;
                        while out_frames < frame_count {
                            let next_pts = calculate_output_pts(pts, out_frames, rate);
                            if !track.fetch(frame_count - out_frames, next_pts) {
                                break;
                            }
                            let ready = track.frames_ready();
                            if track.hook == TrackHook::NoResample {
                                let aux = aux_slice(aux_buses, track.aux_bus, out_frames, ready);
                                let target = MixBus {
                                    samples: &mut scratch.accum[out_frames * out_channels..span],
                                    channels: out_channels,
                                };
                                track.mix_held(ready, &mut scratch.input, target, aux);
                            }
                            out_frames += ready;
                            track.release_buffer();
                        }
                    }
                }
            }

            convert_mixer_format(&scratch.accum[..span], bus.slice_mut(0, span), rng);
        }
    }

    /// One 16-bit stereo track straight into a 16-bit stereo bus.
    fn process_one_track_no_resampling(&mut self, pts: Option<i64>) {
        let index = match self.fast_path_track() {
            Some(index) => index,
            None => return self.process_generic_no_resampling(pts),
        };
        let frame_count = self.config.frame_count;
        let rate = self.config.sample_rate;
        let Self {
            tracks, buses, rng, ..
        } = self;
        let track = &mut tracks[index];
        let out = match track
            .main_bus
            .and_then(|bus| buses.get_mut(bus.0))
            .and_then(|bus| bus.pcm16_mut())
        {
            Some(out) => out,
            None => return,
        };

        let left = S::gain(&track.volume[0], 0);
        let right = S::gain(&track.volume[1], 0);
        let mut done = 0;
        while done < frame_count {
            if !track.fetch(frame_count - done, calculate_output_pts(pts, done, rate)) {
                log::trace!("{}: starved after {} frames", track.name(), done);
                out[done * 2..frame_count * 2].fill(0);
                break;
            }
            let ready = track.frames_ready();
            if let Some(raw) = track.buffer.raw.as_deref() {
                for frame in 0..ready {
                    let at = frame * 4;
                    let l = S::from_pcm16(i16::from_ne_bytes([raw[at], raw[at + 1]]));
                    let r = S::from_pcm16(i16::from_ne_bytes([raw[at + 2], raw[at + 3]]));
                    let dst = (done + frame) * 2;
                    out[dst] = l.scale(left).to_pcm16(rng);
                    out[dst + 1] = r.scale(right).to_pcm16(rng);
                }
            }
            done += ready;
            track.release_buffer();
        }
    }
}
