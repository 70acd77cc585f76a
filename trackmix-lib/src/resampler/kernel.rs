//! Interpolation kernels over a four-frame history window.
//!
//! The window holds `[y0, y1, y2, y3]` with `y3` the most recent input
//! frame. Output lies between `y1` and `y2` at `fraction` in `[0, 1)`.

use super::ResamplerQuality;

pub(super) fn interpolate(quality: ResamplerQuality, window: &[f32; 4], fraction: f32) -> f32 {
    match quality {
        ResamplerQuality::Linear => linear(window, fraction),
        ResamplerQuality::Cubic => cubic(window, fraction),
    }
}

fn linear(window: &[f32; 4], fraction: f32) -> f32 {
    window[1] + (window[2] - window[1]) * fraction
}

fn cubic(window: &[f32; 4], fraction: f32) -> f32 {
    let [y0, y1, y2, y3] = *window;
    let a = (3.0 * (y1 - y2) - y0 + y3) * 0.5;
    let b = 2.0 * y2 + y0 - (5.0 * y1 + y3) * 0.5;
    let c = (y2 - y0) * 0.5;
    ((a * fraction + b) * fraction + c) * fraction + y1
}
