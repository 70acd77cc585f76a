//! Ring-buffer backed provider fed from another component.

use std::sync::{Arc, Mutex, MutexGuard};

use dasp_ring_buffer::Bounded;

use super::{Buffer, BufferProvider};
use crate::format::{encode_sample, AudioFormat};

struct RingState {
    samples: Bounded<Vec<f32>>,
    finished: bool,
}

type SharedRing = Arc<Mutex<RingState>>;

fn lock_ring(shared: &SharedRing) -> MutexGuard<'_, RingState> {
    match shared.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Provider draining interleaved `f32` frames from a bounded ring.
///
/// Frames are encoded into the declared track format as they are handed
/// out. An empty ring answers "no data" whether or not the producer has
/// finished; [`RingBufferProvider::is_finished`] tells the two apart.
pub struct RingBufferProvider {
    shared: SharedRing,
    format: AudioFormat,
    channels: usize,
    spare: Option<Vec<u8>>,
}

/// Cloneable handle pushing frames into a [`RingBufferProvider`].
#[derive(Clone)]
pub struct RingProducer {
    shared: SharedRing,
    channels: usize,
}

/// Create a provider and its producer handle.
///
/// # Arguments
/// - `capacity_frames`: Ring capacity in frames.
/// - `channels`: Interleaved channel count of pushed frames.
/// - `format`: Sample format the provider encodes into.
pub fn ring_buffer_provider(
    capacity_frames: usize,
    channels: usize,
    format: AudioFormat,
) -> (RingBufferProvider, RingProducer) {
    let channels = channels.max(1);
    let capacity = capacity_frames.max(1) * channels;
    let shared = Arc::new(Mutex::new(RingState {
        samples: Bounded::from(vec![0.0; capacity]),
        finished: false,
    }));
    (
        RingBufferProvider {
            shared: shared.clone(),
            format,
            channels,
            spare: None,
        },
        RingProducer { shared, channels },
    )
}

impl RingProducer {
    /// Push whole interleaved frames without blocking.
    ///
    /// # Returns
    /// Number of samples accepted, always a multiple of the channel count.
    pub fn push_frames(&self, samples: &[f32]) -> usize {
        let mut state = lock_ring(&self.shared);
        let space = state.samples.max_len().saturating_sub(state.samples.len());
        let take = (space.min(samples.len()) / self.channels) * self.channels;
        for &sample in &samples[..take] {
            state.samples.push(sample);
        }
        take
    }

    /// Free space in frames.
    pub fn remaining_frames(&self) -> usize {
        let state = lock_ring(&self.shared);
        state.samples.max_len().saturating_sub(state.samples.len()) / self.channels
    }

    /// Mark the stream as complete; no more frames will follow.
    pub fn finish(&self) {
        lock_ring(&self.shared).finished = true;
        log::debug!("ring producer finished");
    }
}

impl RingBufferProvider {
    /// Frames currently queued.
    pub fn available_frames(&self) -> usize {
        lock_ring(&self.shared).samples.len() / self.channels
    }

    /// Whether the producer has finished and every frame has been handed out.
    pub fn is_finished(&self) -> bool {
        let state = lock_ring(&self.shared);
        state.finished && state.samples.is_empty()
    }

    /// Cheap shareable view of the end-of-stream condition.
    pub fn status(&self) -> RingStatus {
        RingStatus {
            shared: self.shared.clone(),
        }
    }
}

/// Read-only end-of-stream probe for a ring provider owned elsewhere.
#[derive(Clone)]
pub struct RingStatus {
    shared: SharedRing,
}

impl RingStatus {
    pub fn is_finished(&self) -> bool {
        let state = lock_ring(&self.shared);
        state.finished && state.samples.is_empty()
    }
}

impl BufferProvider for RingBufferProvider {
    fn get_next_buffer(&mut self, buffer: &mut Buffer, _pts: Option<i64>) -> bool {
        let mut state = lock_ring(&self.shared);
        let frames = buffer.frame_count.min(state.samples.len() / self.channels);
        if frames == 0 {
            buffer.raw = None;
            buffer.frame_count = 0;
            return false;
        }

        let mut raw = self.spare.take().unwrap_or_default();
        raw.clear();
        raw.reserve(self.format.frame_size(self.channels) * frames);
        for _ in 0..frames * self.channels {
            let sample = state.samples.pop().unwrap_or(0.0);
            encode_sample(self.format, sample, &mut raw);
        }
        buffer.raw = Some(raw);
        buffer.frame_count = frames;
        true
    }

    fn release_buffer(&mut self, buffer: &mut Buffer) {
        if let Some(raw) = buffer.raw.take() {
            self.spare = Some(raw);
        }
        buffer.frame_count = 0;
    }
}
