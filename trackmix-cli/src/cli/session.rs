//! JSON session files describing an offline render.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use trackmix_lib::dsp::level::{deserialize_optional_volume, deserialize_volume};
use trackmix_lib::{ChannelMask, MixerConfig, OutputFormat};

/// Internal accumulation type of the engine used for a render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Precision {
    #[default]
    Fixed,
    Float,
}

/// One input file mixed into the main bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackConfig {
    /// WAV file, relative to the session file.
    pub path: PathBuf,
    /// Rate to play the file at instead of its header rate.
    pub source_rate: Option<u32>,
    #[serde(deserialize_with = "deserialize_volume")]
    pub volume_left: f32,
    #[serde(deserialize_with = "deserialize_volume")]
    pub volume_right: f32,
    /// Start both channel volumes here and ramp to their targets over the
    /// first block.
    #[serde(deserialize_with = "deserialize_optional_volume")]
    pub ramp_from: Option<f32>,
    #[serde(deserialize_with = "deserialize_volume")]
    pub aux_level: f32,
    pub aux_ramp: bool,
    pub session_id: i32,
}

impl Default for TrackConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::new(),
            source_rate: None,
            volume_left: 1.0,
            volume_right: 1.0,
            ramp_from: None,
            aux_level: 0.0,
            aux_ramp: false,
            session_id: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub mixer: MixerConfig,
    pub precision: Precision,
    pub output_format: OutputFormat,
    pub output_channels: ChannelMask,
    /// Mono WAV receiving the aux bus, relative to the session file.
    pub aux_out: Option<PathBuf>,
    /// Stop after this many seconds of output even if inputs remain.
    pub max_seconds: Option<f32>,
    pub tracks: Vec<TrackConfig>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            mixer: MixerConfig::default(),
            precision: Precision::default(),
            output_format: OutputFormat::Pcm16,
            output_channels: ChannelMask::STEREO,
            aux_out: None,
            max_seconds: None,
            tracks: Vec::new(),
        }
    }
}

impl SessionConfig {
    /// Session printed by `tmix create session-json`.
    pub fn example() -> Self {
        Self {
            tracks: vec![
                TrackConfig {
                    path: PathBuf::from("drums.wav"),
                    ..TrackConfig::default()
                },
                TrackConfig {
                    path: PathBuf::from("vocal.wav"),
                    source_rate: Some(22_050),
                    volume_left: 0.8,
                    volume_right: 0.8,
                    ramp_from: Some(0.0),
                    aux_level: 0.5,
                    session_id: 1,
                    ..TrackConfig::default()
                },
            ],
            aux_out: Some(PathBuf::from("aux.wav")),
            ..Self::default()
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Resolve track and aux paths against `base`.
    pub fn resolve_paths(&mut self, base: &Path) {
        for track in &mut self.tracks {
            if track.path.is_relative() {
                track.path = base.join(&track.path);
            }
        }
        if let Some(aux) = self.aux_out.as_mut() {
            if aux.is_relative() {
                *aux = base.join(&*aux);
            }
        }
    }
}
