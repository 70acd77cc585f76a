//! Speed and pitch settings for time-stretch capable tracks.

use serde::{Deserialize, Serialize};

pub const TIMESTRETCH_SPEED_MIN: f32 = 0.01;
pub const TIMESTRETCH_SPEED_MAX: f32 = 20.0;
pub const TIMESTRETCH_SPEED_NORMAL: f32 = 1.0;
/// Speed limits when the fallback mode is [`TimestretchFallbackMode::Fail`].
pub const TIMESTRETCH_SPEED_MIN_STRICT: f32 = 0.1;
pub const TIMESTRETCH_SPEED_MAX_STRICT: f32 = 6.0;

pub const TIMESTRETCH_PITCH_MIN: f32 = 0.25;
pub const TIMESTRETCH_PITCH_MAX: f32 = 4.0;
pub const TIMESTRETCH_PITCH_NORMAL: f32 = 1.0;

const SPEED_DELTA: f32 = 0.0001;
const PITCH_DELTA: f32 = 0.0001;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestretchMode {
    Default,
    Voice,
}

/// What a stretcher does when it cannot honour the requested rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestretchFallbackMode {
    CutRepeat,
    Default,
    Mute,
    Fail,
}

/// Playback speed and pitch of a track.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackRate {
    pub speed: f32,
    pub pitch: f32,
    pub stretch_mode: TimestretchMode,
    pub fallback_mode: TimestretchFallbackMode,
}

impl Default for PlaybackRate {
    fn default() -> Self {
        Self {
            speed: TIMESTRETCH_SPEED_NORMAL,
            pitch: TIMESTRETCH_PITCH_NORMAL,
            stretch_mode: TimestretchMode::Default,
            fallback_mode: TimestretchFallbackMode::Default,
        }
    }
}

impl PlaybackRate {
    /// Whether speed and pitch fall inside the supported ranges.
    pub fn is_valid(&self) -> bool {
        let (speed_min, speed_max) = if self.fallback_mode == TimestretchFallbackMode::Fail {
            (TIMESTRETCH_SPEED_MIN_STRICT, TIMESTRETCH_SPEED_MAX_STRICT)
        } else {
            (TIMESTRETCH_SPEED_MIN, TIMESTRETCH_SPEED_MAX)
        };
        (speed_min..=speed_max).contains(&self.speed)
            && (TIMESTRETCH_PITCH_MIN..=TIMESTRETCH_PITCH_MAX).contains(&self.pitch)
    }

    /// Equality with the tolerance used to skip redundant updates.
    pub fn approx_eq(&self, other: &PlaybackRate) -> bool {
        (self.speed - other.speed).abs() < SPEED_DELTA
            && (self.pitch - other.pitch).abs() < PITCH_DELTA
            && self.stretch_mode == other.stretch_mode
            && self.fallback_mode == other.fallback_mode
    }

    pub fn is_normal(&self) -> bool {
        self.approx_eq(&PlaybackRate {
            stretch_mode: self.stretch_mode,
            fallback_mode: self.fallback_mode,
            ..PlaybackRate::default()
        })
    }
}
