//! Pull-based sample supply for tracks.
//!
//! A [`BufferProvider`] hands out raw interleaved buffers on request. The
//! engine matches every successful [`BufferProvider::get_next_buffer`] with
//! exactly one [`BufferProvider::release_buffer`] before asking again.

pub mod ring;

pub use ring::{ring_buffer_provider, RingBufferProvider, RingProducer};

/// Raw sentinel for "no presentation timestamp" at external boundaries.
pub const INVALID_PTS: i64 = i64::MAX;

/// Ticks per second of presentation timestamps (nanoseconds).
pub const LOCAL_TIME_FREQ: i64 = 1_000_000_000;

/// Map a raw timestamp to `None` when it is the invalid sentinel.
pub fn pts_from_raw(raw: i64) -> Option<i64> {
    if raw == INVALID_PTS {
        None
    } else {
        Some(raw)
    }
}

/// Timestamp of the output frame `frame_index` frames after `base`.
pub fn calculate_output_pts(base: Option<i64>, frame_index: usize, sample_rate: u32) -> Option<i64> {
    let base = base?;
    if sample_rate == 0 {
        return Some(base);
    }
    let offset = frame_index as i128 * LOCAL_TIME_FREQ as i128 / sample_rate as i128;
    Some(base.saturating_add(i64::try_from(offset).unwrap_or(i64::MAX)))
}

/// Descriptor exchanged with a provider.
///
/// On request `frame_count` is the number of frames wanted. On return it is
/// the number delivered and `raw` holds them as native-endian samples in
/// the track's format. `raw == None` means no data.
#[derive(Debug, Default)]
pub struct Buffer {
    pub raw: Option<Vec<u8>>,
    pub frame_count: usize,
}

impl Buffer {
    /// Empty descriptor asking for `frame_count` frames.
    pub fn request(frame_count: usize) -> Self {
        Self {
            raw: None,
            frame_count,
        }
    }

    /// Whether the descriptor currently holds provider data.
    pub fn has_data(&self) -> bool {
        self.raw.is_some()
    }

    /// Forget any data and ask for `frame_count` frames next.
    pub fn reset_request(&mut self, frame_count: usize) {
        self.raw = None;
        self.frame_count = frame_count;
    }
}

/// Supplier of raw sample buffers for one stream.
///
/// Implementations run inline inside the processing call and must not
/// block for unbounded time.
pub trait BufferProvider: Send {
    /// Fill `buffer` with up to `buffer.frame_count` frames.
    ///
    /// # Arguments
    /// - `buffer`: Request on entry, delivered data on return.
    /// - `pts`: Presentation time of the first requested frame, if known.
    ///
    /// # Returns
    /// `false` (with `buffer.raw == None`) when no data is available.
    fn get_next_buffer(&mut self, buffer: &mut Buffer, pts: Option<i64>) -> bool;

    /// Return a buffer obtained from [`BufferProvider::get_next_buffer`].
    ///
    /// Implementations take the data out of `buffer`, leaving it empty.
    fn release_buffer(&mut self, buffer: &mut Buffer);
}

/// Fetch into `buffer`, normalizing an empty delivery to "no data".
///
/// The delivered frame count is clamped to what was requested and to what
/// `raw` actually holds for `frame_size`-byte frames.
pub(crate) fn fetch(
    provider: &mut dyn BufferProvider,
    buffer: &mut Buffer,
    frames: usize,
    frame_size: usize,
    pts: Option<i64>,
) -> bool {
    buffer.reset_request(frames);
    let delivered = provider.get_next_buffer(buffer, pts);
    let held = match buffer.raw.as_ref() {
        Some(raw) if frame_size > 0 => raw.len() / frame_size,
        Some(_) => 0,
        None => {
            buffer.reset_request(0);
            return false;
        }
    };
    if !delivered {
        provider.release_buffer(buffer);
        buffer.reset_request(0);
        return false;
    }
    buffer.frame_count = buffer.frame_count.min(frames).min(held);
    if buffer.frame_count == 0 {
        provider.release_buffer(buffer);
        buffer.reset_request(0);
        return false;
    }
    true
}

/// Release `buffer` to `provider` if it holds data.
pub(crate) fn release(provider: &mut dyn BufferProvider, buffer: &mut Buffer) {
    if buffer.raw.is_some() {
        provider.release_buffer(buffer);
    }
    buffer.reset_request(0);
}
