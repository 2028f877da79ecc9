//! Audio settings
//!
//! The backend to load, the devices to open and the stream buffering
//! parameters, read from YAML and passed explicitly to the
//! [`crate::AudioManager`].
//!
//! ```yaml
//! backend: cpal
//! playback_device: ""
//! capture_device: ""
//! plugin_dir: null
//! stream:
//!   max_buffered_ms: 300
//!   buffer_bytes: 4096
//!   free_timeout_ms: 500
//!   fill_interval_ms: 10
//! ```

mod io;
mod paths;

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::{DEFAULT_BUFFER_BYTES, DEFAULT_MAX_BUFFERED_MS};

pub use io::{load_config, save_config};
pub use paths::{default_plugin_dir, default_settings_path, PLUGIN_DIR_ENV};

/// Backend picked when nothing is configured
pub const DEFAULT_BACKEND: &str = "cpal";

/// Top-level audio settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    /// Backend id to load (`cpal`, `jack`, `none`, or a plugin's id)
    pub backend: String,
    /// Playback device name; empty selects the system default
    pub playback_device: String,
    /// Capture device name; empty selects the system default
    pub capture_device: String,
    /// Plugin directory; `None` uses [`default_plugin_dir`]
    pub plugin_dir: Option<PathBuf>,
    pub stream: StreamSettings,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            backend: DEFAULT_BACKEND.to_string(),
            playback_device: String::new(),
            capture_device: String::new(),
            plugin_dir: None,
            stream: StreamSettings::default(),
        }
    }
}

impl AudioSettings {
    /// Settings selecting `backend`, everything else default
    pub fn with_backend(backend: impl Into<String>) -> Self {
        Self {
            backend: backend.into(),
            ..Self::default()
        }
    }

    /// Configured plugin directory or the default one
    pub fn plugin_dir(&self) -> PathBuf {
        self.plugin_dir.clone().unwrap_or_else(default_plugin_dir)
    }
}

/// Buffering parameters applied to every new stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamSettings {
    /// Audio kept queued ahead of the device
    pub max_buffered_ms: u32,
    /// Size of one stream buffer (rounded down to whole frames)
    pub buffer_bytes: usize,
    /// Longest `free_stream` waits for the device to stop a stream
    pub free_timeout_ms: u64,
    /// Period of the backend's fill pump
    pub fill_interval_ms: u64,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            max_buffered_ms: DEFAULT_MAX_BUFFERED_MS,
            buffer_bytes: DEFAULT_BUFFER_BYTES,
            free_timeout_ms: 500,
            fill_interval_ms: 10,
        }
    }
}

impl StreamSettings {
    pub fn free_timeout(&self) -> Duration {
        Duration::from_millis(self.free_timeout_ms)
    }

    pub fn fill_interval(&self) -> Duration {
        Duration::from_millis(self.fill_interval_ms.max(1))
    }
}
