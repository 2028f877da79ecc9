//! Decoder contract consumed by audio streams
//!
//! Streams never own their decoder: the player keeps the decoder alive and
//! streams hold a weak reference, pulling interleaved s16le frames from it
//! while buffering.
//!
//! ```ignore
//! use spark_audio::decoder::{shared, PcmDecoder};
//!
//! let decoder = shared(PcmDecoder::from_wav("jingle.wav")?);
//! let stream = manager.create_stream(&decoder);
//! ```

mod pcm;

use std::sync::{Arc, Mutex};

use crate::types::SampleFormat;

pub use pcm::PcmDecoder;

/// Source of decoded PCM for a stream
///
/// Samples are signed 16-bit little-endian, interleaved by channel.
pub trait AudioDecoder: Send {
    /// Sample rate in Hz
    fn sample_rate(&self) -> u32;

    /// Number of interleaved channels (1 or 2 are playable)
    fn channel_count(&self) -> u16;

    /// Whether the decoder initialised and can produce data
    fn is_valid(&self) -> bool;

    /// Whether decoded frames are ready to be copied right now
    ///
    /// `false` while a progressive decoder is still waiting for input.
    fn has_decoded_frames(&self) -> bool;

    /// Copy at most one decoded frame into `dest`
    ///
    /// Returns the number of bytes written; 0 means nothing is left.
    fn copy_frame(&mut self, dest: &mut [u8]) -> usize;

    /// Discard all remaining data
    fn skip_all(&mut self);

    /// Sample format derived from rate and channel count
    fn format(&self) -> SampleFormat {
        SampleFormat::new(self.channel_count(), self.sample_rate())
    }
}

/// Decoder shared between the player and its stream
pub type SharedDecoder = Arc<Mutex<dyn AudioDecoder>>;

/// Wrap a decoder for use with [`crate::AudioManager::create_stream`]
pub fn shared<D: AudioDecoder + 'static>(decoder: D) -> SharedDecoder {
    Arc::new(Mutex::new(decoder))
}
