//! Device-side buffer queue
//!
//! A [`PlaybackSource`] is the endpoint a stream feeds: buffers are
//! allocated, filled with PCM, queued in playback order, and handed back
//! once the device has consumed them ("processed"). [`QueuedSource`] is the
//! in-process implementation rendered by the [`super::Mixer`] from the
//! output callback.

use std::collections::{HashMap, VecDeque};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Duration;

use thiserror::Error;

use crate::types::{SampleFormat, BYTES_PER_SAMPLE};

/// Handle of one buffer owned by a source
pub type BufferId = u32;

/// Default cap on buffers a single source may allocate
pub const DEFAULT_POOL_LIMIT: usize = 256;

/// Errors from buffer operations on a playback source
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// The source refused to allocate another buffer
    #[error("Buffer pool exhausted ({0} buffers allocated)")]
    PoolExhausted(usize),

    /// The buffer id was never allocated or has been deleted
    #[error("Unknown buffer: {0}")]
    UnknownBuffer(BufferId),

    /// Operation requires the buffer to be out of the queue
    #[error("Buffer {0} is still queued")]
    BufferQueued(BufferId),

    /// Data length is not a whole number of frames
    #[error("Buffer data is not frame aligned: {len} bytes with {frame}-byte frames")]
    Misaligned { len: usize, frame: usize },
}

/// Result type for playback source operations
pub type SourceResult<T> = Result<T, SourceError>;

/// Transport state reported by a source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceState {
    Initial,
    Playing,
    Paused,
    Stopped,
}

/// Endpoint a stream submits buffers to
pub trait PlaybackSource: Send + Sync {
    /// PCM layout of every buffer on this source
    fn format(&self) -> SampleFormat;

    /// Allocate a new empty buffer
    fn generate_buffer(&self) -> SourceResult<BufferId>;

    /// Replace the contents of an unqueued buffer
    fn buffer_data(&self, id: BufferId, data: &[u8]) -> SourceResult<()>;

    /// Append a buffer to the playback queue
    fn queue_buffer(&self, id: BufferId) -> SourceResult<()>;

    /// Remove the oldest processed buffer from the queue
    fn unqueue_processed(&self) -> Option<BufferId>;

    /// Queued buffers the device has finished with
    fn processed_count(&self) -> usize;

    /// Buffers currently in the queue, processed ones included
    fn queued_count(&self) -> usize;

    /// Bytes consumed since the front of the queue
    ///
    /// Covers processed buffers that have not been unqueued yet plus the
    /// position inside the buffer being played.
    fn byte_offset(&self) -> u64;

    fn play(&self);
    fn pause(&self);

    /// Stop playback and mark every queued buffer processed
    fn stop(&self);

    fn state(&self) -> SourceState;

    /// Free an unqueued buffer
    fn delete_buffer(&self, id: BufferId) -> SourceResult<()>;

    /// Buffers allocated and not yet deleted
    fn allocated_buffers(&self) -> usize;

    /// Block until the source reports stopped, at most `timeout`
    ///
    /// Returns `false` on timeout.
    fn wait_stopped(&self, timeout: Duration) -> bool;
}

struct SourceInner {
    state: SourceState,
    next_id: BufferId,
    buffers: HashMap<BufferId, Vec<u8>>,
    queue: VecDeque<BufferId>,
    /// Leading entries of `queue` already consumed
    processed: usize,
    /// Position in frames inside `queue[processed]`
    cursor: f64,
}

impl SourceInner {
    fn is_stopped(&self) -> bool {
        matches!(self.state, SourceState::Initial | SourceState::Stopped)
    }

    fn is_queued(&self, id: BufferId) -> bool {
        self.queue.contains(&id)
    }
}

/// In-process buffer queue, rendered by the mixer
pub struct QueuedSource {
    format: SampleFormat,
    pool_limit: usize,
    inner: Mutex<SourceInner>,
    stopped: Condvar,
}

impl QueuedSource {
    pub fn new(format: SampleFormat) -> Self {
        Self::with_pool_limit(format, DEFAULT_POOL_LIMIT)
    }

    pub fn with_pool_limit(format: SampleFormat, pool_limit: usize) -> Self {
        Self {
            format,
            pool_limit,
            inner: Mutex::new(SourceInner {
                state: SourceState::Initial,
                next_id: 1,
                buffers: HashMap::new(),
                queue: VecDeque::new(),
                processed: 0,
                cursor: 0.0,
            }),
            stopped: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SourceInner> {
        // A panic while holding the lock leaves the queue consistent
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Mix this source into `out` (interleaved, `channels` per frame)
    ///
    /// Advances through the queue at `src_rate / out_rate` frames per output
    /// frame. Running out of queued data stops the source.
    pub fn render(&self, out: &mut [f32], channels: usize, out_rate: u32) {
        if channels == 0 || out_rate == 0 {
            return;
        }

        let mut inner = self.lock();
        if inner.state != SourceState::Playing {
            return;
        }

        let src_channels = self.format.channels as usize;
        let frame_bytes = self.format.frame_bytes();
        let step = self.format.sample_rate as f64 / out_rate as f64;

        for frame in out.chunks_exact_mut(channels) {
            // Find the buffer holding the cursor, retiring finished ones
            let (left, right) = loop {
                let Some(&id) = inner.queue.get(inner.processed) else {
                    inner.state = SourceState::Stopped;
                    inner.cursor = 0.0;
                    self.stopped.notify_all();
                    return;
                };
                let data = inner.buffers.get(&id).map(Vec::as_slice).unwrap_or(&[]);
                let frames = data.len() / frame_bytes;
                let index = inner.cursor as usize;
                if index < frames {
                    let at = index * frame_bytes;
                    let left = read_sample(data, at);
                    let right = if src_channels == 2 {
                        read_sample(data, at + BYTES_PER_SAMPLE)
                    } else {
                        left
                    };
                    break (left, right);
                }
                inner.processed += 1;
                inner.cursor -= frames as f64;
            };

            if channels == 1 {
                frame[0] += (left + right) * 0.5;
            } else {
                frame[0] += left;
                frame[1] += right;
            }
            inner.cursor += step;
        }

        // Retire a buffer finished exactly on the chunk boundary
        if let Some(&id) = inner.queue.get(inner.processed) {
            let len = inner.buffers.get(&id).map_or(0, Vec::len);
            let frames = (len / frame_bytes) as f64;
            if inner.cursor >= frames {
                inner.processed += 1;
                inner.cursor -= frames;
            }
        }
    }
}

#[inline]
fn read_sample(data: &[u8], at: usize) -> f32 {
    i16::from_le_bytes([data[at], data[at + 1]]) as f32 / 32768.0
}

impl PlaybackSource for QueuedSource {
    fn format(&self) -> SampleFormat {
        self.format
    }

    fn generate_buffer(&self) -> SourceResult<BufferId> {
        let mut inner = self.lock();
        if inner.buffers.len() >= self.pool_limit {
            return Err(SourceError::PoolExhausted(inner.buffers.len()));
        }
        let id = inner.next_id;
        inner.next_id = inner.next_id.wrapping_add(1);
        inner.buffers.insert(id, Vec::new());
        Ok(id)
    }

    fn buffer_data(&self, id: BufferId, data: &[u8]) -> SourceResult<()> {
        let frame = self.format.frame_bytes();
        if frame == 0 || data.len() % frame != 0 {
            return Err(SourceError::Misaligned {
                len: data.len(),
                frame,
            });
        }
        let mut inner = self.lock();
        if inner.is_queued(id) {
            return Err(SourceError::BufferQueued(id));
        }
        let buffer = inner
            .buffers
            .get_mut(&id)
            .ok_or(SourceError::UnknownBuffer(id))?;
        buffer.clear();
        buffer.extend_from_slice(data);
        Ok(())
    }

    fn queue_buffer(&self, id: BufferId) -> SourceResult<()> {
        let mut inner = self.lock();
        if !inner.buffers.contains_key(&id) {
            return Err(SourceError::UnknownBuffer(id));
        }
        if inner.is_queued(id) {
            return Err(SourceError::BufferQueued(id));
        }
        inner.queue.push_back(id);
        Ok(())
    }

    fn unqueue_processed(&self) -> Option<BufferId> {
        let mut inner = self.lock();
        if inner.processed == 0 {
            return None;
        }
        inner.processed -= 1;
        inner.queue.pop_front()
    }

    fn processed_count(&self) -> usize {
        self.lock().processed
    }

    fn queued_count(&self) -> usize {
        self.lock().queue.len()
    }

    fn byte_offset(&self) -> u64 {
        let inner = self.lock();
        let frame_bytes = self.format.frame_bytes() as u64;
        let processed: u64 = inner
            .queue
            .iter()
            .take(inner.processed)
            .map(|id| inner.buffers.get(id).map_or(0, |b| b.len() as u64))
            .sum();
        processed + inner.cursor as u64 * frame_bytes
    }

    fn play(&self) {
        let mut inner = self.lock();
        inner.state = SourceState::Playing;
    }

    fn pause(&self) {
        let mut inner = self.lock();
        if inner.state == SourceState::Playing {
            inner.state = SourceState::Paused;
        }
    }

    fn stop(&self) {
        let mut inner = self.lock();
        inner.state = SourceState::Stopped;
        inner.processed = inner.queue.len();
        inner.cursor = 0.0;
        self.stopped.notify_all();
    }

    fn state(&self) -> SourceState {
        self.lock().state
    }

    fn delete_buffer(&self, id: BufferId) -> SourceResult<()> {
        let mut inner = self.lock();
        if inner.is_queued(id) {
            return Err(SourceError::BufferQueued(id));
        }
        inner
            .buffers
            .remove(&id)
            .map(|_| ())
            .ok_or(SourceError::UnknownBuffer(id))
    }

    fn allocated_buffers(&self) -> usize {
        self.lock().buffers.len()
    }

    fn wait_stopped(&self, timeout: Duration) -> bool {
        let inner = self.lock();
        let (inner, _) = self
            .stopped
            .wait_timeout_while(inner, timeout, |inner| !inner.is_stopped())
            .unwrap_or_else(|e| e.into_inner());
        inner.is_stopped()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stereo() -> QueuedSource {
        QueuedSource::new(SampleFormat::new(2, 44100))
    }

    fn queue(source: &QueuedSource, frames: usize, value: i16) -> BufferId {
        let id = source.generate_buffer().unwrap();
        let data: Vec<u8> = (0..frames * 2).flat_map(|_| value.to_le_bytes()).collect();
        source.buffer_data(id, &data).unwrap();
        source.queue_buffer(id).unwrap();
        id
    }

    #[test]
    fn test_render_consumes_in_queue_order() {
        let source = stereo();
        let first = queue(&source, 100, 1000);
        queue(&source, 100, -1000);
        source.play();

        let mut out = vec![0.0f32; 150 * 2];
        source.render(&mut out, 2, 44100);

        assert!(out[0] > 0.0);
        assert!(out[299] < 0.0);
        assert_eq!(source.processed_count(), 1);
        assert_eq!(source.byte_offset(), 150 * 4);
        assert_eq!(source.unqueue_processed(), Some(first));
        assert_eq!(source.byte_offset(), 50 * 4);
    }

    #[test]
    fn test_underrun_stops_source() {
        let source = stereo();
        queue(&source, 10, 500);
        source.play();

        let mut out = vec![0.0f32; 64 * 2];
        source.render(&mut out, 2, 44100);

        assert_eq!(source.state(), SourceState::Stopped);
        assert_eq!(source.processed_count(), 1);
        assert_eq!(out[20 * 2], 0.0);
        assert!(source.wait_stopped(Duration::from_millis(1)));
    }

    #[test]
    fn test_paused_source_renders_nothing() {
        let source = stereo();
        queue(&source, 10, 500);

        let mut out = vec![0.0f32; 8];
        source.render(&mut out, 2, 44100);

        assert!(out.iter().all(|s| *s == 0.0));
        assert_eq!(source.byte_offset(), 0);
    }

    #[test]
    fn test_half_rate_source_advances_half_as_fast() {
        let source = QueuedSource::new(SampleFormat::new(1, 22050));
        queue(&source, 100, 100);
        source.play();

        let mut out = vec![0.0f32; 100 * 2];
        source.render(&mut out, 2, 44100);

        assert_eq!(source.byte_offset(), 50 * 2);
    }

    #[test]
    fn test_stop_marks_everything_processed() {
        let source = stereo();
        queue(&source, 10, 1);
        queue(&source, 10, 1);
        source.play();
        source.stop();

        assert_eq!(source.processed_count(), 2);
        assert!(source.unqueue_processed().is_some());
        assert!(source.unqueue_processed().is_some());
        assert!(source.unqueue_processed().is_none());
    }

    #[test]
    fn test_queued_buffer_cannot_be_deleted() {
        let source = stereo();
        let id = queue(&source, 4, 1);
        assert_eq!(source.delete_buffer(id), Err(SourceError::BufferQueued(id)));
        assert_eq!(
            source.buffer_data(id, &[0; 4]),
            Err(SourceError::BufferQueued(id))
        );
    }

    #[test]
    fn test_pool_limit() {
        let source = QueuedSource::with_pool_limit(SampleFormat::new(1, 8000), 2);
        source.generate_buffer().unwrap();
        source.generate_buffer().unwrap();
        assert_eq!(source.generate_buffer(), Err(SourceError::PoolExhausted(2)));
    }

    #[test]
    fn test_misaligned_data_is_rejected() {
        let source = stereo();
        let id = source.generate_buffer().unwrap();
        assert!(matches!(
            source.buffer_data(id, &[0; 6]),
            Err(SourceError::Misaligned { len: 6, frame: 4 })
        ));
    }

    #[test]
    fn test_wait_stopped_times_out_while_playing() {
        let source = stereo();
        queue(&source, 10, 1);
        source.play();
        assert!(!source.wait_stopped(Duration::from_millis(5)));
    }
}
