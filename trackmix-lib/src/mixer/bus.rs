//! Engine-owned output and aux buses.

use crate::dsp::convert::OutputSlice;
use crate::dsp::MixSample;
use crate::format::{ChannelMask, OutputFormat};

/// Handle of a main output bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BusId(pub(crate) usize);

/// Handle of a mono aux bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AuxBusId(pub(crate) usize);

impl BusId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl AuxBusId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BusSamples {
    Pcm16(Vec<i16>),
    Float(Vec<f32>),
}

/// Interleaved main bus holding one block in its output format.
#[derive(Debug, Clone)]
pub struct OutputBus {
    channel_mask: ChannelMask,
    samples: BusSamples,
}

impl OutputBus {
    pub(crate) fn new(channel_mask: ChannelMask, format: OutputFormat, frame_count: usize) -> Self {
        let len = frame_count * channel_mask.channel_count();
        let samples = match format {
            OutputFormat::Pcm16 => BusSamples::Pcm16(vec![0; len]),
            OutputFormat::Float => BusSamples::Float(vec![0.0; len]),
        };
        Self {
            channel_mask,
            samples,
        }
    }

    pub fn channel_mask(&self) -> ChannelMask {
        self.channel_mask
    }

    pub fn channel_count(&self) -> usize {
        self.channel_mask.channel_count()
    }

    pub fn format(&self) -> OutputFormat {
        match self.samples {
            BusSamples::Pcm16(_) => OutputFormat::Pcm16,
            BusSamples::Float(_) => OutputFormat::Float,
        }
    }

    pub fn samples(&self) -> &BusSamples {
        &self.samples
    }

    /// Interleaved samples when the bus is 16-bit.
    pub fn as_pcm16(&self) -> Option<&[i16]> {
        match &self.samples {
            BusSamples::Pcm16(samples) => Some(samples),
            BusSamples::Float(_) => None,
        }
    }

    /// Interleaved samples when the bus is float.
    pub fn as_float(&self) -> Option<&[f32]> {
        match &self.samples {
            BusSamples::Float(samples) => Some(samples),
            BusSamples::Pcm16(_) => None,
        }
    }

    /// Block contents as unit-range floats, whatever the format.
    pub fn to_f32(&self) -> Vec<f32> {
        match &self.samples {
            BusSamples::Pcm16(samples) => samples.iter().map(|&s| s as f32 / 32768.0).collect(),
            BusSamples::Float(samples) => samples.clone(),
        }
    }

    pub(crate) fn is_silent(&self) -> bool {
        match &self.samples {
            BusSamples::Pcm16(samples) => samples.iter().all(|&s| s == 0),
            BusSamples::Float(samples) => samples.iter().all(|&s| s == 0.0),
        }
    }

    /// Mutable view of samples `start..end` for conversion.
    pub(crate) fn slice_mut(&mut self, start: usize, end: usize) -> OutputSlice<'_> {
        match &mut self.samples {
            BusSamples::Pcm16(samples) => {
                let end = end.min(samples.len());
                OutputSlice::Pcm16(&mut samples[start.min(end)..end])
            }
            BusSamples::Float(samples) => {
                let end = end.min(samples.len());
                OutputSlice::Float(&mut samples[start.min(end)..end])
            }
        }
    }

    pub(crate) fn pcm16_mut(&mut self) -> Option<&mut [i16]> {
        match &mut self.samples {
            BusSamples::Pcm16(samples) => Some(samples),
            BusSamples::Float(_) => None,
        }
    }

    pub(crate) fn fill_silence(&mut self) {
        match &mut self.samples {
            BusSamples::Pcm16(samples) => samples.fill(0),
            BusSamples::Float(samples) => samples.fill(0.0),
        }
    }
}

/// Mono aux bus in the engine's accumulation representation.
#[derive(Debug, Clone)]
pub(crate) struct AuxBus<S> {
    pub(crate) samples: Vec<S>,
}

impl<S: MixSample> AuxBus<S> {
    pub(crate) fn new(frame_count: usize) -> Self {
        Self {
            samples: vec![S::SILENCE; frame_count],
        }
    }

    pub(crate) fn clear(&mut self) {
        self.samples.fill(S::SILENCE);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bus_is_sized_for_block_and_channels() {
        let bus = OutputBus::new(ChannelMask::SURROUND_5_1, OutputFormat::Float, 16);
        assert_eq!(bus.as_float().map(|s| s.len()), Some(96));
        assert_eq!(bus.format(), OutputFormat::Float);
        assert!(bus.as_pcm16().is_none());
        assert!(bus.is_silent());
    }

    #[test]
    fn slice_mut_clamps_range() {
        let mut bus = OutputBus::new(ChannelMask::STEREO, OutputFormat::Pcm16, 4);
        assert_eq!(bus.slice_mut(4, 100).len(), 4);
        assert_eq!(bus.slice_mut(10, 12).len(), 0);
        if let Some(samples) = bus.pcm16_mut() {
            samples[0] = 5;
        }
        assert_eq!(bus.to_f32()[0], 5.0 / 32768.0);
        bus.fill_silence();
        assert!(bus.is_silent());
    }
}
