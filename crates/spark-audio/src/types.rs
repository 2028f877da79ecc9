//! Common types for spark-audio
//!
//! Sample format description and the byte/time arithmetic shared by the
//! streaming engine and the device-side buffer queue.

use std::fmt;

/// Bytes per PCM sample (signed 16-bit little-endian)
pub const BYTES_PER_SAMPLE: usize = 2;

/// Default size of one stream buffer in bytes
///
/// Kept small for latency; 4096 bytes is ~23ms of 44.1kHz stereo.
pub const DEFAULT_BUFFER_BYTES: usize = 4096;

/// Default upper bound on audio buffered ahead of the device (milliseconds)
pub const DEFAULT_MAX_BUFFERED_MS: u32 = 300;

/// Smallest pool a stream may use, whatever the buffered duration
pub const MIN_BUFFERS: usize = 2;

/// PCM layout of a stream: interleaved s16le at `sample_rate` with `channels`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SampleFormat {
    pub channels: u16,
    pub sample_rate: u32,
}

impl SampleFormat {
    pub fn new(channels: u16, sample_rate: u32) -> Self {
        Self {
            channels,
            sample_rate,
        }
    }

    /// Only mono and stereo streams can be played
    pub fn is_supported(&self) -> bool {
        (self.channels == 1 || self.channels == 2) && self.sample_rate > 0
    }

    /// Size of one interleaved frame in bytes
    #[inline]
    pub fn frame_bytes(&self) -> usize {
        self.channels as usize * BYTES_PER_SAMPLE
    }

    /// Bytes of audio per second of playback
    #[inline]
    pub fn bytes_per_second(&self) -> u64 {
        self.sample_rate as u64 * self.frame_bytes() as u64
    }

    /// Convert a byte count into whole milliseconds (floor)
    pub fn bytes_to_ms(&self, bytes: u64) -> u64 {
        let bps = self.bytes_per_second();
        if bps == 0 {
            return 0;
        }
        bytes * 1000 / bps
    }

    /// Convert milliseconds into a byte count aligned to a frame boundary
    pub fn ms_to_bytes(&self, ms: u64) -> u64 {
        let frame = self.frame_bytes() as u64;
        if frame == 0 {
            return 0;
        }
        let bytes = ms * self.bytes_per_second() / 1000;
        bytes - bytes % frame
    }

    /// Number of buffers of `buffer_bytes` needed to hold `max_buffered_ms` of audio
    ///
    /// Rounded up, never below [`MIN_BUFFERS`].
    pub fn max_buffers(&self, max_buffered_ms: u32, buffer_bytes: usize) -> usize {
        if buffer_bytes == 0 {
            return MIN_BUFFERS;
        }
        let wanted = self.bytes_per_second() * max_buffered_ms as u64 / 1000;
        let count = wanted.div_ceil(buffer_bytes as u64) as usize;
        count.max(MIN_BUFFERS)
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let layout = match self.channels {
            1 => "mono".to_string(),
            2 => "stereo".to_string(),
            n => format!("{} channels", n),
        };
        write!(f, "{}Hz {} s16le", self.sample_rate, layout)
    }
}
