//! Audio backend plugins
//!
//! A backend is either compiled into this crate (`none`, `cpal`, `jack`) or
//! shipped as a shared library in the plugin directory. Libraries are found
//! by file name (see [`discovery`]) and loaded only when their backend is
//! acquired.
//!
//! # Writing a plugin
//!
//! ```toml
//! [lib]
//! name = "spark_pulse_audio"
//! crate-type = ["cdylib"]
//! ```
//!
//! ```ignore
//! use spark_audio::backend::AudioBackend;
//!
//! struct PulseBackend { /* ... */ }
//!
//! impl AudioBackend for PulseBackend { /* ... */ }
//!
//! spark_audio::export_audio_backend!(PulseBackend::new());
//! ```
//!
//! The resulting `libspark_pulse_audio.so` is picked up as backend `pulse`.

mod abi;
mod descriptor;
pub mod discovery;
mod error;
mod loader;
mod manager;

pub use abi::{BackendBox, CreateFn, ReleaseFn, CREATE_SYMBOL, RELEASE_SYMBOL};
pub use descriptor::{BackendFactory, PluginDescriptor, PluginKind, PluginSource};
pub use error::{PluginError, PluginResult};
pub use loader::{BackendHandle, LoadedBackend};
pub use manager::PluginManager;
