//! Channel and format adaptation strategies.
//!
//! The engine consults a [`TrackAdaptation`] whenever a track's channel
//! layout, bus binding or input format changes. The default strategy only
//! accepts layouts the mixing kernel handles without a remix matrix.

use crate::error::MixerError;
use crate::format::{AudioFormat, ChannelMask};

use super::track::TrackName;

pub use crate::dsp::volume::ChannelRoute;

/// Extension point for channel remixing and input reformatting.
pub trait TrackAdaptation: Send {
    /// Decide how `track_mask` maps onto a bus with `mixer_mask`.
    fn prepare_channel_adaptation(
        &mut self,
        name: TrackName,
        track_mask: ChannelMask,
        mixer_mask: ChannelMask,
    ) -> Result<ChannelRoute, MixerError>;

    /// Accept or reject `format` as the track's input format.
    fn prepare_format_adaptation(
        &mut self,
        name: TrackName,
        format: AudioFormat,
    ) -> Result<(), MixerError>;
}

/// Direct routing for equal channel counts, mono expansion otherwise.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultAdaptation;

impl TrackAdaptation for DefaultAdaptation {
    fn prepare_channel_adaptation(
        &mut self,
        name: TrackName,
        track_mask: ChannelMask,
        mixer_mask: ChannelMask,
    ) -> Result<ChannelRoute, MixerError> {
        let rejected = MixerError::ChannelMask {
            track: track_mask,
            mixer: mixer_mask,
        };
        if !track_mask.is_valid() || !mixer_mask.is_valid() {
            return Err(rejected);
        }
        let route = if track_mask.channel_count() == mixer_mask.channel_count() {
            ChannelRoute::Direct
        } else if track_mask.channel_count() == 1 {
            ChannelRoute::MonoExpand
        } else {
            log::debug!(
                "{}: no downmix from {} to {}",
                name,
                track_mask,
                mixer_mask
            );
            return Err(rejected);
        };
        Ok(route)
    }

    fn prepare_format_adaptation(
        &mut self,
        _name: TrackName,
        format: AudioFormat,
    ) -> Result<(), MixerError> {
        if format.is_linear_pcm() {
            Ok(())
        } else {
            Err(MixerError::UnsupportedFormat(format))
        }
    }
}
