//! Linear volume ramps held in parallel fixed-point and float form.
//!
//! A ramp stores a target, the value reached so far and a per-frame
//! increment. The fixed representation uses U4.12 for the target and U4.28
//! for the running value so that per-frame increments keep sixteen extra
//! bits of precision. Both representations are always updated together.

/// Unity gain in the U4.12 representation.
pub const UNITY_GAIN_INT: i32 = 0x1000;
/// Unity gain in the float representation.
pub const UNITY_GAIN_FLOAT: f32 = 1.0;

const FIXED_RAMP_SHIFT: u32 = 16;

/// Clamp a requested volume into `[0, unity]`.
///
/// Negative, NaN and subnormal values become silence; positive infinity
/// becomes unity gain.
pub fn sanitize_volume(volume: f32) -> f32 {
    if volume.is_nan() || volume <= 0.0 {
        return 0.0;
    }
    if volume.is_infinite() || volume >= UNITY_GAIN_FLOAT {
        return UNITY_GAIN_FLOAT;
    }
    if !volume.is_normal() {
        return 0.0;
    }
    volume
}

/// Convert a sanitized float volume to U4.12.
pub fn volume_to_u4_12(volume: f32) -> i32 {
    ((volume * UNITY_GAIN_INT as f32).round() as i32).clamp(0, UNITY_GAIN_INT)
}

/// Widen a U4.12 volume to the U4.28 ramp accumulator.
pub fn u4_12_to_u4_28(volume: i32) -> i32 {
    volume << FIXED_RAMP_SHIFT
}

/// Narrow a U4.28 ramp accumulator to U4.12.
pub fn u4_28_to_u4_12(volume: i32) -> i32 {
    volume >> FIXED_RAMP_SHIFT
}

/// One ramped scalar: a channel volume or an aux send level.
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeRamp {
    target: f32,
    prev: f32,
    inc: f32,
    target_fixed: i32,
    prev_fixed: i32,
    inc_fixed: i32,
    remaining: usize,
}

impl VolumeRamp {
    /// Ramp settled at `volume` (sanitized).
    pub fn settled(volume: f32) -> Self {
        let target = sanitize_volume(volume);
        let target_fixed = volume_to_u4_12(target);
        Self {
            target,
            prev: target,
            inc: 0.0,
            target_fixed,
            prev_fixed: u4_12_to_u4_28(target_fixed),
            inc_fixed: 0,
            remaining: 0,
        }
    }

    /// Ramp settled at unity gain.
    pub fn unity() -> Self {
        Self::settled(UNITY_GAIN_FLOAT)
    }

    /// Ramp settled at silence.
    pub fn silent() -> Self {
        Self::settled(0.0)
    }

    /// Start a ramp towards `target` lasting `ramp_frames` frames.
    ///
    /// A zero length, or an increment too small to make progress in either
    /// representation, applies the target immediately.
    ///
    /// # Returns
    /// `false` when the sanitized target equals the current target and
    /// nothing changed.
    pub fn set(&mut self, target: f32, ramp_frames: usize) -> bool {
        let target = sanitize_volume(target);
        if target == self.target {
            return false;
        }
        let target_fixed = volume_to_u4_12(target);
        self.target = target;
        self.target_fixed = target_fixed;

        if ramp_frames > 0 && self.start_ramp(ramp_frames) {
            return true;
        }
        self.snap();
        true
    }

    fn start_ramp(&mut self, ramp_frames: usize) -> bool {
        let frames = match i32::try_from(ramp_frames) {
            Ok(frames) => frames,
            Err(_) => return false,
        };

        let inc = (self.target - self.prev) / ramp_frames as f32;
        let max = self.prev.max(self.target);
        if !inc.is_normal() || max + inc == max {
            return false;
        }

        let inc_fixed = (u4_12_to_u4_28(self.target_fixed) - self.prev_fixed) / frames;
        if inc_fixed == 0 {
            return false;
        }

        self.inc = inc;
        self.inc_fixed = inc_fixed;
        self.remaining = ramp_frames;
        true
    }

    fn snap(&mut self) {
        self.prev = self.target;
        self.inc = 0.0;
        self.prev_fixed = u4_12_to_u4_28(self.target_fixed);
        self.inc_fixed = 0;
        self.remaining = 0;
    }

    /// Carry the ramp forward by `frames` processed frames.
    ///
    /// Once either representation reaches or passes its target, or the
    /// ramp length has elapsed, both snap to the target. Idempotent once
    /// settled.
    pub fn advance(&mut self, frames: usize) {
        if !self.is_ramping() || frames == 0 {
            return;
        }
        if frames >= self.remaining {
            self.snap();
            return;
        }

        let next = self.prev + self.inc * frames as f32;
        let next_fixed = self.prev_fixed as i64 + self.inc_fixed as i64 * frames as i64;
        let target_fixed = u4_12_to_u4_28(self.target_fixed) as i64;

        let float_done = (self.inc > 0.0 && next >= self.target)
            || (self.inc < 0.0 && next <= self.target);
        let fixed_done = (self.inc_fixed > 0 && next_fixed >= target_fixed)
            || (self.inc_fixed < 0 && next_fixed <= target_fixed);

        if float_done || fixed_done {
            self.snap();
        } else {
            self.prev = next;
            self.prev_fixed = next_fixed as i32;
            self.remaining -= frames;
        }
    }

    pub fn is_ramping(&self) -> bool {
        self.remaining > 0
    }

    /// Sanitized target in float form.
    pub fn target(&self) -> f32 {
        self.target
    }

    /// Value reached so far in float form.
    pub fn current(&self) -> f32 {
        self.prev
    }

    /// Target in U4.12.
    pub fn target_fixed(&self) -> i32 {
        self.target_fixed
    }

    /// Value reached so far in U4.28.
    pub fn current_fixed(&self) -> i32 {
        self.prev_fixed
    }

    /// Frames left before the ramp snaps to its target.
    pub fn remaining_frames(&self) -> usize {
        self.remaining
    }

    /// Whether both the settled value and the target are silence.
    pub fn is_silent(&self) -> bool {
        !self.is_ramping() && self.target_fixed == 0 && self.target == 0.0
    }

    /// Float gain `frame` frames into the current block.
    pub fn gain_at(&self, frame: usize) -> f32 {
        if !self.is_ramping() {
            return self.target;
        }
        let value = self.prev + self.inc * frame as f32;
        value.clamp(self.prev.min(self.target), self.prev.max(self.target))
    }

    /// U4.12 gain `frame` frames into the current block.
    pub fn gain_at_fixed(&self, frame: usize) -> i32 {
        if !self.is_ramping() {
            return self.target_fixed;
        }
        let target = u4_12_to_u4_28(self.target_fixed) as i64;
        let prev = self.prev_fixed as i64;
        let value = (prev + self.inc_fixed as i64 * frame as i64).clamp(prev.min(target), prev.max(target));
        (value >> FIXED_RAMP_SHIFT) as i32
    }
}

impl Default for VolumeRamp {
    fn default() -> Self {
        Self::unity()
    }
}
