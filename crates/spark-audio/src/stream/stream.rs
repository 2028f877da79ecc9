//! Per-sound buffering engine
//!
//! An [`AudioStream`] pulls PCM from its decoder into a bounded pool of
//! fixed-size buffers and keeps the playback source fed in FIFO order.
//! Position is derived from bytes consumed, never from wall-clock time.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use super::source::{BufferId, PlaybackSource, SourceState};
use super::state::StreamState;
use crate::config::StreamSettings;
use crate::decoder::{AudioDecoder, SharedDecoder};
use crate::types::SampleFormat;

static NEXT_STREAM_ID: AtomicU64 = AtomicU64::new(1);

struct StreamInner {
    state: StreamState,
    /// Paused by the engine because the decoder ran dry
    starved: bool,
    /// Queued buffers, oldest first
    buffers: VecDeque<BufferId>,
    /// Payload size of each entry in `buffers`
    byte_counts: VecDeque<usize>,
    /// Bytes consumed before the front of the source queue
    base_offset: i64,
    scratch: Vec<u8>,
    /// Taken on release; a released stream never calls into its backend
    source: Option<Arc<dyn PlaybackSource>>,
}

/// Resets the non-reentrant fill flag, also on unwind
struct FillGuard<'a>(&'a AtomicBool);

impl Drop for FillGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// One playable sound bound to a decoder and a playback source
pub struct AudioStream {
    id: u64,
    format: SampleFormat,
    buffer_bytes: usize,
    max_buffers: usize,
    filling: AtomicBool,
    decoder: Weak<Mutex<dyn AudioDecoder>>,
    inner: Mutex<StreamInner>,
}

impl AudioStream {
    /// Create a stream for `decoder` on `source`
    ///
    /// Without a source, with an invalid decoder, or with a sample format
    /// other than mono/stereo the stream is created `Dead`. Otherwise it
    /// starts out `Paused`.
    pub fn new(
        decoder: &SharedDecoder,
        source: Option<Arc<dyn PlaybackSource>>,
        settings: &StreamSettings,
    ) -> Self {
        let id = NEXT_STREAM_ID.fetch_add(1, Ordering::Relaxed);
        let (format, decoder_valid) = {
            let decoder = decoder.lock().unwrap_or_else(|e| e.into_inner());
            (decoder.format(), decoder.is_valid())
        };

        let frame_bytes = format.frame_bytes().max(1);
        let buffer_bytes = (settings.buffer_bytes / frame_bytes).max(1) * frame_bytes;
        let max_buffers = format.max_buffers(settings.max_buffered_ms, buffer_bytes);

        let ready = if !format.is_supported() {
            log::error!("Stream #{}: unsupported format {}", id, format);
            false
        } else if !decoder_valid {
            log::error!("Stream #{}: decoder is not valid", id);
            false
        } else {
            match &source {
                None => {
                    log::warn!("Stream #{}: no playback source available", id);
                    false
                }
                Some(source) if source.format() != format => {
                    log::error!(
                        "Stream #{}: source format {} does not match decoder format {}",
                        id,
                        source.format(),
                        format
                    );
                    false
                }
                Some(_) => true,
            }
        };

        let mut state = StreamState::Starting;
        if ready {
            advance(&mut state, StreamState::Ready);
            log::debug!(
                "Stream #{}: {} with up to {} buffers of {} bytes",
                id,
                format,
                max_buffers,
                buffer_bytes
            );
            // Streams start paused; playback must be requested
            advance(&mut state, StreamState::Paused);
        } else {
            advance(&mut state, StreamState::Dead);
        }

        Self {
            id,
            format,
            buffer_bytes,
            max_buffers,
            filling: AtomicBool::new(false),
            decoder: Arc::downgrade(decoder),
            inner: Mutex::new(StreamInner {
                state,
                starved: false,
                buffers: VecDeque::new(),
                byte_counts: VecDeque::new(),
                base_offset: 0,
                scratch: vec![0; buffer_bytes],
                source: if state.is_alive() { source } else { None },
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StreamInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn format(&self) -> SampleFormat {
        self.format
    }

    pub fn state(&self) -> StreamState {
        self.lock().state
    }

    /// False once the stream is dead; never becomes true again
    pub fn is_valid(&self) -> bool {
        self.state().is_alive()
    }

    pub fn paused(&self) -> bool {
        self.state() == StreamState::Paused
    }

    /// Paused by the engine while waiting for decoded data
    pub fn is_starved(&self) -> bool {
        self.lock().starved
    }

    /// Upper bound on buffers this stream keeps allocated
    pub fn max_buffers(&self) -> usize {
        self.max_buffers
    }

    pub fn buffer_bytes(&self) -> usize {
        self.buffer_bytes
    }

    /// Buffers currently submitted to the source
    pub fn queued_buffers(&self) -> usize {
        self.lock().buffers.len()
    }

    /// Bytes submitted to the source and not reclaimed yet
    pub fn queued_bytes(&self) -> usize {
        self.lock().byte_counts.iter().sum()
    }

    #[cfg(test)]
    pub(crate) fn source(&self) -> Option<Arc<dyn PlaybackSource>> {
        self.lock().source.clone()
    }

    /// Start or resume playback
    ///
    /// Fills the buffer pool first. If the decoder has nothing yet the
    /// stream stays paused and resumes on its own once data arrives.
    pub fn play(&self) {
        {
            let mut inner = self.lock();
            match inner.state {
                StreamState::Dead | StreamState::Playing => return,
                _ => {}
            }
            advance(&mut inner.state, StreamState::Playing);
            inner.starved = false;
        }
        self.fill();
    }

    pub fn pause(&self) {
        let mut inner = self.lock();
        if inner.state != StreamState::Playing && !inner.starved {
            return;
        }
        if let Some(source) = &inner.source {
            source.pause();
        }
        advance(&mut inner.state, StreamState::Paused);
        inner.starved = false;
    }

    /// Stop playback and drop every queued buffer
    ///
    /// Played time restarts at 0.
    pub fn stop(&self) {
        let mut inner = self.lock();
        if inner.state == StreamState::Dead {
            return;
        }
        self.drain(&mut inner);
        inner.base_offset = 0;
        inner.starved = false;
        advance(&mut inner.state, StreamState::Stopped);
    }

    /// Discard queued audio that has not been played yet
    ///
    /// The position keeps what was already consumed and the state is
    /// unchanged; a playing stream continues with the next decoded data.
    pub fn empty(&self) {
        let mut inner = self.lock();
        if inner.state == StreamState::Dead {
            return;
        }
        let played = inner.source.as_ref().map_or(0, |s| s.byte_offset());
        self.drain(&mut inner);
        inner.base_offset += played as i64;
    }

    /// Stop the source and delete every buffer it holds
    fn drain(&self, inner: &mut StreamInner) {
        if let Some(source) = &inner.source {
            source.stop();
            self.delete_processed(source.as_ref());
        }
        inner.buffers.clear();
        inner.byte_counts.clear();
    }

    /// Unqueue and delete every processed buffer, each exactly once
    fn delete_processed(&self, source: &dyn PlaybackSource) {
        while let Some(id) = source.unqueue_processed() {
            if let Err(e) = source.delete_buffer(id) {
                log::warn!("Stream #{}: failed to delete buffer: {}", self.id, e);
            }
        }
    }

    /// Milliseconds of audio consumed by the device
    pub fn played_time_ms(&self) -> u64 {
        let inner = self.lock();
        let offset = inner.source.as_ref().map_or(0, |s| s.byte_offset()) as i64;
        let consumed = (inner.base_offset + offset).max(0) as u64;
        self.format.bytes_to_ms(consumed)
    }

    /// Move the played-time origin so the position now reads `ms`
    pub fn set_played_time(&self, ms: u64) {
        let mut inner = self.lock();
        let target = (ms * self.format.bytes_per_second()).div_ceil(1000) as i64;
        let offset = inner.source.as_ref().map_or(0, |s| s.byte_offset()) as i64;
        inner.base_offset = target - offset;
    }

    /// Top up the source queue from the decoder
    ///
    /// Not reentrant: a call overlapping one in progress returns at once.
    pub fn fill(&self) {
        if self.filling.swap(true, Ordering::AcqRel) {
            return;
        }
        let _guard = FillGuard(&self.filling);

        let Some(decoder) = self.decoder.upgrade() else {
            return;
        };
        let mut decoder = decoder.lock().unwrap_or_else(|e| e.into_inner());
        let mut inner = self.lock();

        let source = match (inner.source.clone(), inner.state) {
            (Some(source), state) if state.is_alive() => source,
            _ => {
                // No output possible, drop the input
                decoder.skip_all();
                return;
            }
        };

        if !decoder.has_decoded_frames() {
            if inner.state == StreamState::Playing {
                log::debug!("Stream #{}: decoder starved, pausing", self.id);
                advance(&mut inner.state, StreamState::Paused);
                inner.starved = true;
            }
            // Whatever is already queued keeps playing out
            if inner.starved
                && source.queued_count() > source.processed_count()
                && source.state() != SourceState::Playing
            {
                source.play();
            }
            return;
        }

        let mut queued = 0usize;
        loop {
            let id = if source.processed_count() > 0 {
                match source.unqueue_processed() {
                    Some(id) => {
                        if inner.buffers.pop_front() != Some(id) {
                            log::warn!("Stream #{}: buffer reclaimed out of order", self.id);
                        }
                        let bytes = inner.byte_counts.pop_front().unwrap_or(0);
                        inner.base_offset += bytes as i64;
                        id
                    }
                    None => {
                        log::warn!("Stream #{}: failed to unqueue processed buffer", self.id);
                        break;
                    }
                }
            } else if inner.buffers.len() < self.max_buffers {
                match source.generate_buffer() {
                    Ok(id) => id,
                    Err(e) => {
                        log::error!("Stream #{}: buffer allocation failed: {}", self.id, e);
                        self.drain(&mut inner);
                        advance(&mut inner.state, StreamState::Dead);
                        decoder.skip_all();
                        return;
                    }
                }
            } else {
                break;
            };

            let len = read_frames(&mut *decoder, &mut inner.scratch, self.format.frame_bytes());
            if len == 0 {
                if let Err(e) = source.delete_buffer(id) {
                    log::warn!("Stream #{}: failed to delete buffer: {}", self.id, e);
                }
                break;
            }

            let submitted = source
                .buffer_data(id, &inner.scratch[..len])
                .and_then(|_| source.queue_buffer(id));
            if let Err(e) = submitted {
                log::warn!("Stream #{}: failed to queue buffer: {}", self.id, e);
                if let Err(e) = source.delete_buffer(id) {
                    log::warn!("Stream #{}: failed to delete buffer: {}", self.id, e);
                }
                break;
            }
            inner.buffers.push_back(id);
            inner.byte_counts.push_back(len);
            queued += 1;
        }

        if inner.starved && queued > 0 {
            log::debug!("Stream #{}: decoder caught up, resuming", self.id);
            inner.starved = false;
            advance(&mut inner.state, StreamState::Playing);
        }

        // Restart after an underrun or on the first fill after play()
        if inner.state == StreamState::Playing
            && !inner.buffers.is_empty()
            && source.state() != SourceState::Playing
        {
            source.play();
        }
    }

    /// Tear the stream down for good
    ///
    /// Waits up to `timeout` for the source to report stopped, then calls
    /// `detach` so the device stops reading it, then frees its buffers.
    /// The stream's reference to the source is dropped before returning:
    /// the source may live in a plugin library that is unloaded once its
    /// backend shuts down, while callers can keep the stream itself.
    pub(crate) fn release(&self, timeout: Duration, detach: impl FnOnce(&Arc<dyn PlaybackSource>)) {
        let mut inner = self.lock();
        if let Some(source) = inner.source.take() {
            // Freeze the position at what the device has consumed
            inner.base_offset += source.byte_offset() as i64;
            source.stop();
            if !source.wait_stopped(timeout) {
                log::warn!(
                    "Stream #{}: source not stopped after {:?}, forcing release",
                    self.id,
                    timeout
                );
            }
            detach(&source);
            // stop() marked every queued buffer processed
            self.delete_processed(source.as_ref());
        }
        inner.buffers.clear();
        inner.byte_counts.clear();
        inner.starved = false;
        advance(&mut inner.state, StreamState::Dead);
        log::debug!("Stream #{}: released", self.id);
    }
}

impl std::fmt::Debug for AudioStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioStream")
            .field("id", &self.id)
            .field("format", &self.format)
            .field("state", &self.state())
            .finish()
    }
}

fn advance(state: &mut StreamState, next: StreamState) {
    if *state == next {
        return;
    }
    debug_assert!(
        state.can_transition_to(next),
        "illegal stream transition {} -> {}",
        state,
        next
    );
    *state = next;
}

/// Copy decoder frames into `dest` until it is full or the decoder runs dry
fn read_frames(decoder: &mut dyn AudioDecoder, dest: &mut [u8], frame_bytes: usize) -> usize {
    let mut filled = 0;
    while filled < dest.len() && decoder.has_decoded_frames() {
        let written = decoder.copy_frame(&mut dest[filled..]).min(dest.len() - filled);
        if written == 0 {
            break;
        }
        filled += written;
    }
    filled - filled % frame_bytes.max(1)
}
