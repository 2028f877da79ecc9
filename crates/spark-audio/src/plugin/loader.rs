//! Live backend instances and the libraries behind them

use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;
use std::sync::Arc;

use libloading::Library;

use super::abi::{symbol_name, BackendBox, CreateFn, ReleaseFn, CREATE_SYMBOL, RELEASE_SYMBOL};
use super::error::{PluginError, PluginResult};
use crate::backend::AudioBackend;

/// Shared handle to a loaded backend
///
/// The library stays mapped until the last handle is dropped.
pub type BackendHandle = Arc<LoadedBackend>;

enum Instance {
    Builtin(Box<dyn AudioBackend>),
    Library {
        backend: NonNull<BackendBox>,
        release: ReleaseFn,
        path: PathBuf,
        // Dropped after `Drop::drop` has released the backend
        _library: Library,
    },
}

/// A backend instance owned by the plugin registry
pub struct LoadedBackend {
    instance: Instance,
}

// SAFETY: the boxed backend is `AudioBackend: Send + Sync`, and the pointer
// is only dereferenced immutably until the release entry point runs in Drop.
unsafe impl Send for LoadedBackend {}
unsafe impl Sync for LoadedBackend {}

impl LoadedBackend {
    pub fn builtin(backend: Box<dyn AudioBackend>) -> Self {
        Self {
            instance: Instance::Builtin(backend),
        }
    }

    /// Open `path`, resolve both entry points and build the backend
    pub fn from_library(path: &Path) -> PluginResult<Self> {
        // SAFETY: loading runs the library's initialisers. Plugin libraries
        // are trusted the same way the host binary is.
        let library = unsafe { Library::new(path) }.map_err(|e| PluginError::LoadFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let missing = |symbol: &[u8]| PluginError::MissingSymbol {
            path: path.to_path_buf(),
            symbol: symbol_name(symbol),
        };
        // SAFETY: the signatures match what `export_audio_backend!` generates
        let create: CreateFn = unsafe {
            *library
                .get::<CreateFn>(CREATE_SYMBOL)
                .map_err(|_| missing(CREATE_SYMBOL))?
        };
        let release: ReleaseFn = unsafe {
            *library
                .get::<ReleaseFn>(RELEASE_SYMBOL)
                .map_err(|_| missing(RELEASE_SYMBOL))?
        };

        let backend = NonNull::new(unsafe { create() })
            .ok_or_else(|| PluginError::FactoryFailed(path.display().to_string()))?;

        log::debug!("Created backend from {:?}", path);
        Ok(Self {
            instance: Instance::Library {
                backend,
                release,
                path: path.to_path_buf(),
                _library: library,
            },
        })
    }

    /// Library the backend came from, `None` for builtins
    pub fn path(&self) -> Option<&Path> {
        match &self.instance {
            Instance::Builtin(_) => None,
            Instance::Library { path, .. } => Some(path),
        }
    }
}

impl Deref for LoadedBackend {
    type Target = dyn AudioBackend;

    fn deref(&self) -> &Self::Target {
        match &self.instance {
            Instance::Builtin(backend) => backend.as_ref(),
            // SAFETY: valid from `create` until `release` in Drop
            Instance::Library { backend, .. } => unsafe { backend.as_ref().0.as_ref() },
        }
    }
}

impl Drop for LoadedBackend {
    fn drop(&mut self) {
        if let Instance::Library {
            backend,
            release,
            path,
            ..
        } = &self.instance
        {
            log::debug!("Releasing backend from {:?}", path);
            // SAFETY: `backend` came from this library's `create` and is
            // released exactly once; the library is unloaded afterwards.
            unsafe { release(backend.as_ptr()) };
        }
    }
}
