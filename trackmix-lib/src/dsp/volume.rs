//! Per-track gain and accumulation kernel.

use super::ramp::VolumeRamp;
use super::MixSample;

/// How a track's input channels map onto its bus channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelRoute {
    /// Input and bus carry the same number of channels.
    Direct,
    /// A mono input feeds every bus channel.
    MonoExpand,
}

/// Interleaved accumulation target.
pub struct MixBus<'a, S> {
    pub samples: &'a mut [S],
    pub channels: usize,
}

/// Mono aux accumulation target with the send level ramp.
pub struct AuxSend<'a, S> {
    pub samples: &'a mut [S],
    pub level: &'a VolumeRamp,
}

/// Scale `frames` interleaved input frames and add them to `bus`.
///
/// Buses with one or two channels take volume 0 on the left and volume 1
/// on the right; wider buses use volume 0 everywhere. When `aux` is given,
/// the mean of each input frame times the aux level is added to it.
/// Ramps are read relative to the start of this run and are not advanced.
pub fn mix_frames<S: MixSample>(
    input: &[S],
    input_channels: usize,
    frames: usize,
    route: ChannelRoute,
    volume: &[VolumeRamp; 2],
    bus: MixBus<'_, S>,
    aux: Option<AuxSend<'_, S>>,
) {
    let out_channels = bus.channels;
    if input_channels == 0 || out_channels == 0 {
        return;
    }
    let frames = frames
        .min(input.len() / input_channels)
        .min(bus.samples.len() / out_channels);
    let ramping = volume[0].is_ramping() || volume[1].is_ramping();
    let split_volume = out_channels <= 2;

    let mut left = S::gain(&volume[0], 0);
    let mut right = S::gain(&volume[1], 0);
    for frame in 0..frames {
        if ramping {
            left = S::gain(&volume[0], frame);
            right = S::gain(&volume[1], frame);
        }
        let src = &input[frame * input_channels..(frame + 1) * input_channels];
        let dst = &mut bus.samples[frame * out_channels..(frame + 1) * out_channels];
        for (channel, out) in dst.iter_mut().enumerate() {
            let sample = match route {
                ChannelRoute::Direct => src[channel.min(input_channels - 1)],
                ChannelRoute::MonoExpand => src[0],
            };
            let gain = if split_volume && channel == 1 { right } else { left };
            *out = out.accumulate(sample.scale(gain));
        }
    }

    if let Some(aux) = aux {
        let frames = frames.min(aux.samples.len());
        let mut level = S::gain(aux.level, 0);
        for frame in 0..frames {
            if aux.level.is_ramping() {
                level = S::gain(aux.level, frame);
            }
            let src = &input[frame * input_channels..(frame + 1) * input_channels];
            aux.samples[frame] = aux.samples[frame].accumulate(S::mean(src).scale(level));
        }
    }
}
