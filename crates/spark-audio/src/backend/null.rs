//! Backend that plays nothing
//!
//! Selected with `backend: none`. It has no output context, so every
//! stream it creates is dead and drops its decoder's data on fill.

use std::sync::{Arc, RwLock};

use super::{AudioBackend, DeviceKind};
use crate::config::StreamSettings;
use crate::decoder::SharedDecoder;
use crate::stream::AudioStream;

pub const NULL_BACKEND_ID: &str = "none";

#[derive(Default)]
pub struct NullBackend {
    settings: RwLock<StreamSettings>,
}

impl NullBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AudioBackend for NullBackend {
    fn name(&self) -> &str {
        "No audio"
    }

    fn backend_id(&self) -> &str {
        NULL_BACKEND_ID
    }

    fn list_devices(&self, _kind: DeviceKind) -> Vec<String> {
        Vec::new()
    }

    fn current_device(&self, _kind: DeviceKind) -> String {
        String::new()
    }

    fn select_device(&self, name: &str, kind: DeviceKind) {
        log::debug!("none: ignoring {} device '{}'", kind, name);
    }

    fn create_stream(&self, decoder: &SharedDecoder) -> Arc<AudioStream> {
        let settings = self.settings.read().map(|s| *s).unwrap_or_default();
        Arc::new(AudioStream::new(decoder, None, &settings))
    }

    fn free_stream(&self, stream: &Arc<AudioStream>) {
        let timeout = self
            .settings
            .read()
            .map(|s| s.free_timeout())
            .unwrap_or_default();
        stream.release(timeout, |_| {});
    }

    fn is_timing_available(&self) -> bool {
        false
    }

    fn configure_streams(&self, settings: StreamSettings) {
        if let Ok(mut current) = self.settings.write() {
            *current = settings;
        }
    }

    fn shutdown(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::{shared, PcmDecoder};
    use crate::stream::StreamState;

    #[test]
    fn test_streams_are_dead() {
        let backend = NullBackend::new();
        let decoder = shared(PcmDecoder::silence(2, 44100, 100));
        let stream = backend.create_stream(&decoder);

        assert_eq!(stream.state(), StreamState::Dead);
        assert!(!backend.is_timing_available());

        backend.play_stream(&stream);
        stream.fill();
        assert!(!decoder.lock().unwrap().has_decoded_frames());

        backend.free_stream(&stream);
        assert!(backend.list_devices(DeviceKind::Playback).is_empty());
    }
}
