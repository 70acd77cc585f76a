//! Providers used by unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::format::{encode_sample, AudioFormat};
use crate::provider::{Buffer, BufferProvider};

/// Shared request counters, readable after the provider moved into an engine.
#[derive(Clone, Default)]
pub struct ProviderStats {
    gets: Arc<AtomicUsize>,
    releases: Arc<AtomicUsize>,
    pts: Arc<Mutex<Vec<Option<i64>>>>,
}

impl ProviderStats {
    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    pub fn pts(&self) -> Vec<Option<i64>> {
        self.pts.lock().unwrap().clone()
    }

    fn record_get(&self, pts: Option<i64>) {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.pts.lock().unwrap().push(pts);
    }

    fn record_release(&self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}

/// Provider serving queued unit-range samples in fixed-size chunks.
pub struct ScriptedProvider {
    format: AudioFormat,
    channels: usize,
    chunk: usize,
    samples: VecDeque<f32>,
    stats: ProviderStats,
    outstanding: usize,
}

impl ScriptedProvider {
    pub fn from_frames(format: AudioFormat, channels: usize, samples: &[f32], chunk: usize) -> Self {
        Self {
            format,
            channels,
            chunk,
            samples: samples.iter().copied().collect(),
            stats: ProviderStats::default(),
            outstanding: 0,
        }
    }

    /// Provider that repeats `value` on every channel for `frames` frames.
    pub fn constant(format: AudioFormat, channels: usize, value: f32, frames: usize) -> Self {
        Self::from_frames(format, channels, &vec![value; frames * channels], usize::MAX)
    }

    pub fn push_frames(&mut self, samples: &[f32]) {
        self.samples.extend(samples.iter().copied());
    }

    pub fn stats(&self) -> ProviderStats {
        self.stats.clone()
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding
    }
}

impl BufferProvider for ScriptedProvider {
    fn get_next_buffer(&mut self, buffer: &mut Buffer, pts: Option<i64>) -> bool {
        self.stats.record_get(pts);
        let frames = buffer
            .frame_count
            .min(self.chunk)
            .min(self.samples.len() / self.channels);
        if frames == 0 {
            buffer.raw = None;
            buffer.frame_count = 0;
            return false;
        }
        let mut raw = Vec::new();
        for sample in self.samples.drain(..frames * self.channels) {
            encode_sample(self.format, sample, &mut raw);
        }
        buffer.raw = Some(raw);
        buffer.frame_count = frames;
        self.outstanding += 1;
        true
    }

    fn release_buffer(&mut self, buffer: &mut Buffer) {
        self.stats.record_release();
        self.outstanding = self.outstanding.saturating_sub(1);
        buffer.raw = None;
        buffer.frame_count = 0;
    }
}

/// 16-bit sine generator delivering at most `chunk` frames per request.
pub struct ToneProvider {
    inner: ScriptedProvider,
}

impl ToneProvider {
    pub fn new(channels: usize, sample_rate: u32, frequency: f32, frames: usize, chunk: usize) -> Self {
        let mut samples = Vec::with_capacity(frames * channels);
        for frame in 0..frames {
            let t = frame as f32 / sample_rate as f32;
            let value = 0.5 * (2.0 * std::f32::consts::PI * frequency * t).sin();
            for _ in 0..channels {
                samples.push(value);
            }
        }
        Self {
            inner: ScriptedProvider::from_frames(AudioFormat::Pcm16, channels, &samples, chunk),
        }
    }

    pub fn stats(&self) -> ProviderStats {
        self.inner.stats()
    }

    pub fn outstanding(&self) -> usize {
        self.inner.outstanding()
    }
}

impl BufferProvider for ToneProvider {
    fn get_next_buffer(&mut self, buffer: &mut Buffer, pts: Option<i64>) -> bool {
        self.inner.get_next_buffer(buffer, pts)
    }

    fn release_buffer(&mut self, buffer: &mut Buffer) {
        self.inner.release_buffer(buffer)
    }
}
