//! In-memory PCM decoder
//!
//! Serves already-decoded s16 samples in fixed-size frames. Used by the
//! command-line player (WAV files through `hound`) and by tests.

use std::path::Path;

use super::AudioDecoder;
use crate::types::BYTES_PER_SAMPLE;

/// Samples per channel handed out by one `copy_frame` call
pub const DEFAULT_FRAME_SAMPLES: usize = 1152;

/// Decoder over a fully decoded interleaved sample buffer
#[derive(Debug, Clone)]
pub struct PcmDecoder {
    samples: Vec<i16>,
    position: usize,
    channels: u16,
    sample_rate: u32,
    frame_samples: usize,
}

impl PcmDecoder {
    /// Create a decoder over interleaved samples
    pub fn new(samples: Vec<i16>, channels: u16, sample_rate: u32) -> Self {
        Self {
            samples,
            position: 0,
            channels,
            sample_rate,
            frame_samples: DEFAULT_FRAME_SAMPLES,
        }
    }

    /// `duration_ms` of silence, mostly useful for tests and device checks
    pub fn silence(channels: u16, sample_rate: u32, duration_ms: u32) -> Self {
        let frames = sample_rate as usize * duration_ms as usize / 1000;
        Self::new(vec![0; frames * channels as usize], channels, sample_rate)
    }

    /// Change how many samples per channel one decoded frame carries
    pub fn with_frame_samples(mut self, frame_samples: usize) -> Self {
        self.frame_samples = frame_samples.max(1);
        self
    }

    /// Load a WAV file, converting any integer or float layout to s16
    pub fn from_wav(path: impl AsRef<Path>) -> hound::Result<Self> {
        let path = path.as_ref();
        let mut reader = hound::WavReader::open(path)?;
        let spec = reader.spec();

        let samples: Vec<i16> = match spec.sample_format {
            hound::SampleFormat::Int if spec.bits_per_sample <= 16 => {
                let shift = 16 - spec.bits_per_sample as u32;
                reader
                    .samples::<i16>()
                    .map(|s| s.map(|v| v << shift))
                    .collect::<hound::Result<_>>()?
            }
            hound::SampleFormat::Int => {
                let shift = spec.bits_per_sample as u32 - 16;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| (v >> shift) as i16))
                    .collect::<hound::Result<_>>()?
            }
            hound::SampleFormat::Float => reader
                .samples::<f32>()
                .map(|s| s.map(|v| (v.clamp(-1.0, 1.0) * i16::MAX as f32) as i16))
                .collect::<hound::Result<_>>()?,
        };

        log::info!(
            "Loaded {:?}: {} samples, {} channels @ {}Hz ({}-bit {:?})",
            path,
            samples.len(),
            spec.channels,
            spec.sample_rate,
            spec.bits_per_sample,
            spec.sample_format
        );

        Ok(Self::new(samples, spec.channels, spec.sample_rate))
    }

    /// Total length in milliseconds
    pub fn duration_ms(&self) -> u64 {
        let frames = self.samples.len() as u64 / self.channels.max(1) as u64;
        frames * 1000 / self.sample_rate.max(1) as u64
    }

    /// Samples not yet copied out
    pub fn remaining_samples(&self) -> usize {
        self.samples.len() - self.position
    }
}

impl AudioDecoder for PcmDecoder {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channel_count(&self) -> u16 {
        self.channels
    }

    fn is_valid(&self) -> bool {
        self.channels > 0 && self.sample_rate > 0
    }

    fn has_decoded_frames(&self) -> bool {
        self.position < self.samples.len()
    }

    fn copy_frame(&mut self, dest: &mut [u8]) -> usize {
        let channels = self.channels.max(1) as usize;
        let frame_bytes = channels * BYTES_PER_SAMPLE;

        // Whole interleaved frames only, so the stream never splits a frame
        let room = dest.len() / frame_bytes * channels;
        let count = room
            .min(self.frame_samples * channels)
            .min(self.remaining_samples());

        let chunk = &self.samples[self.position..self.position + count];
        for (sample, out) in chunk.iter().zip(dest.chunks_exact_mut(BYTES_PER_SAMPLE)) {
            out.copy_from_slice(&sample.to_le_bytes());
        }
        self.position += count;

        count * BYTES_PER_SAMPLE
    }

    fn skip_all(&mut self) {
        self.position = self.samples.len();
    }
}
