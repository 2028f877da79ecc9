//! Spark Audio - Audio backend plugins and PCM streaming engine

pub mod backend;
pub mod config;
pub mod decoder;
pub mod manager;
pub mod plugin;
pub mod stream;
pub mod types;

pub use backend::{AudioBackend, DeviceKind};
pub use config::{AudioSettings, StreamSettings};
pub use decoder::{AudioDecoder, PcmDecoder, SharedDecoder};
pub use manager::AudioManager;
pub use plugin::{BackendHandle, PluginKind, PluginManager};
pub use stream::{AudioStream, StreamState};
pub use types::*;
