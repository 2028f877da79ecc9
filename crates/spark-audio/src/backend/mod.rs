//! Audio backends
//!
//! Every backend implements [`AudioBackend`]. The hardware ones share the
//! [`MixingBackend`] engine and differ only in their [`OutputDriver`]:
//! - **cpal**: cross-platform output (ALSA/PipeWire, WASAPI, CoreAudio)
//! - **jack**: native JACK client on Linux (with the `jack-backend` feature)
//! - **none**: no output at all; every stream is created dead

mod cpal_driver;
mod error;
mod mixing;
mod null;
mod output;

#[cfg(all(target_os = "linux", feature = "jack-backend"))]
mod jack_driver;

use std::fmt;
use std::sync::Arc;

use crate::config::StreamSettings;
use crate::decoder::SharedDecoder;
use crate::stream::AudioStream;

pub use cpal_driver::{CpalBackend, CpalDriver};
pub use error::{BackendError, BackendResult};
pub use mixing::MixingBackend;
pub use null::{NullBackend, NULL_BACKEND_ID};
pub use output::{DeviceThread, OpenOutput, OutputDriver, OutputInfo};

#[cfg(all(target_os = "linux", feature = "jack-backend"))]
pub use jack_driver::{JackBackend, JackDriver};

#[cfg(test)]
pub(crate) use output::testing;

/// Direction of a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    Playback,
    Capture,
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceKind::Playback => f.write_str("playback"),
            DeviceKind::Capture => f.write_str("capture"),
        }
    }
}

/// One interchangeable audio output implementation
///
/// Instances are shared between threads behind an `Arc`, so every method
/// takes `&self`. Failures are logged and reported through return values
/// and stream state, never by panicking.
pub trait AudioBackend: Send + Sync {
    /// Human-readable name
    fn name(&self) -> &str;

    /// Identity used for lookup and selection
    fn backend_id(&self) -> &str;

    /// Device names of `kind`; empty when enumeration is unsupported
    fn list_devices(&self, kind: DeviceKind) -> Vec<String>;

    /// Name of the active device of `kind`, empty if none
    fn current_device(&self, kind: DeviceKind) -> String;

    /// Switch the device of `kind`
    ///
    /// Empty selects the system default. Selecting the active device does
    /// nothing, and when the new device cannot be opened the previous one
    /// stays active.
    fn select_device(&self, name: &str, kind: DeviceKind);

    /// Create a paused stream fed by `decoder`
    ///
    /// The stream is dead when the backend has no working output.
    fn create_stream(&self, decoder: &SharedDecoder) -> Arc<AudioStream>;

    /// Stop the stream, wait for the device to let go of it, free its buffers
    fn free_stream(&self, stream: &Arc<AudioStream>);

    fn pause_stream(&self, stream: &AudioStream) {
        stream.pause();
    }

    fn play_stream(&self, stream: &AudioStream) {
        stream.play();
    }

    fn stop_stream(&self, stream: &AudioStream) {
        stream.stop();
    }

    /// Whether streams report meaningful played time (an output is open)
    fn is_timing_available(&self) -> bool;

    /// Buffering parameters for streams created from now on
    fn configure_streams(&self, _settings: StreamSettings) {}

    /// Free every stream and close all devices
    fn shutdown(&self);
}
