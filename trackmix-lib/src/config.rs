//! Engine configuration.

use serde::{Deserialize, Serialize};

use crate::error::MixerError;
use crate::resampler::ResamplerQuality;

/// Largest track pool an engine can hold.
pub const MAX_NUM_TRACKS: u32 = 32;

const DEFAULT_FRAME_COUNT: usize = 256;
const DEFAULT_SAMPLE_RATE: u32 = 44_100;
const DEFAULT_DITHER_SEED: u64 = 0x5eed;

/// Construction parameters of a mixing engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MixerConfig {
    /// Frames produced by each `process()` call.
    pub frame_count: usize,
    /// Output sample rate of every bus.
    pub sample_rate: u32,
    /// Number of track slots, at most [`MAX_NUM_TRACKS`].
    pub max_tracks: u32,
    /// Kernel used by resamplers created for tracks.
    pub resampler_quality: ResamplerQuality,
    /// Seed of the dither noise applied when narrowing to 16 bits.
    pub dither_seed: u64,
}

impl Default for MixerConfig {
    fn default() -> Self {
        Self {
            frame_count: DEFAULT_FRAME_COUNT,
            sample_rate: DEFAULT_SAMPLE_RATE,
            max_tracks: MAX_NUM_TRACKS,
            resampler_quality: ResamplerQuality::default(),
            dither_seed: DEFAULT_DITHER_SEED,
        }
    }
}

impl MixerConfig {
    pub fn new(frame_count: usize, sample_rate: u32, max_tracks: u32) -> Self {
        Self {
            frame_count,
            sample_rate,
            max_tracks,
            ..Self::default()
        }
    }

    /// Parse and validate a JSON config; missing fields take defaults.
    pub fn from_json_str(json: &str) -> Result<Self, MixerError> {
        let config: MixerConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), MixerError> {
        if self.frame_count == 0 {
            return Err(MixerError::InvalidConfig("frame_count must be > 0".to_string()));
        }
        if self.sample_rate == 0 {
            return Err(MixerError::InvalidConfig("sample_rate must be > 0".to_string()));
        }
        if self.max_tracks == 0 || self.max_tracks > MAX_NUM_TRACKS {
            return Err(MixerError::InvalidConfig(format!(
                "max_tracks must be within 1..={}",
                MAX_NUM_TRACKS
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = MixerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_tracks, MAX_NUM_TRACKS);
        assert_eq!(config.resampler_quality, ResamplerQuality::Cubic);
    }

    #[test]
    fn parses_partial_json() {
        let config =
            MixerConfig::from_json_str(r#"{"frame_count":16,"resampler_quality":"linear"}"#)
                .unwrap();
        assert_eq!(config.frame_count, 16);
        assert_eq!(config.sample_rate, DEFAULT_SAMPLE_RATE);
        assert_eq!(config.resampler_quality, ResamplerQuality::Linear);
    }

    #[test]
    fn rejects_out_of_range_values() {
        assert!(matches!(
            MixerConfig::from_json_str(r#"{"frame_count":0}"#),
            Err(MixerError::InvalidConfig(_))
        ));
        assert!(MixerConfig::new(16, 44_100, 33).validate().is_err());
        assert!(MixerConfig::new(16, 0, 4).validate().is_err());
        assert!(matches!(
            MixerConfig::from_json_str("{"),
            Err(MixerError::Config(_))
        ));
    }
}
