//! Backend plugin registry
//!
//! Knows every backend that can be selected, loads one on demand and keeps
//! it alive until it is released. Libraries found in the plugin directory
//! come first, then the backends compiled into this crate, so an external
//! plugin can replace a builtin of the same id.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::descriptor::{BackendFactory, PluginDescriptor, PluginKind, PluginSource};
use super::discovery::discover_plugins;
use super::error::{PluginError, PluginResult};
use super::loader::{BackendHandle, LoadedBackend};
use crate::backend::{AudioBackend, CpalBackend, CpalDriver, NullBackend, NULL_BACKEND_ID};

fn create_null() -> Box<dyn AudioBackend> {
    Box::new(NullBackend::new())
}

fn create_cpal() -> Box<dyn AudioBackend> {
    Box::new(CpalBackend::new(CpalDriver))
}

#[cfg(all(target_os = "linux", feature = "jack-backend"))]
fn create_jack() -> Box<dyn AudioBackend> {
    Box::new(crate::backend::JackBackend::new(crate::backend::JackDriver::default()))
}

/// Backend compiled into the host, re-added on every scan
struct Builtin {
    backend_id: String,
    name: String,
    factory: BackendFactory,
}

pub struct PluginManager {
    plugin_dir: PathBuf,
    builtins: Vec<Builtin>,
    descriptors: Vec<PluginDescriptor>,
}

impl PluginManager {
    /// Registry with the builtin backends plus whatever `plugin_dir` holds
    pub fn new(plugin_dir: impl Into<PathBuf>) -> Self {
        let mut manager = Self::without_builtins(plugin_dir);
        manager.add_builtin(NULL_BACKEND_ID, "No audio", create_null);
        manager.add_builtin("cpal", "CPAL", create_cpal);
        #[cfg(all(target_os = "linux", feature = "jack-backend"))]
        manager.add_builtin("jack", "JACK", create_jack);
        manager.scan();
        manager
    }

    /// Registry of library plugins only
    pub fn without_builtins(plugin_dir: impl Into<PathBuf>) -> Self {
        let mut manager = Self {
            plugin_dir: plugin_dir.into(),
            builtins: Vec::new(),
            descriptors: Vec::new(),
        };
        manager.scan();
        manager
    }

    /// Add a backend compiled into the host
    pub fn register_builtin(&mut self, backend_id: &str, name: &str, factory: BackendFactory) {
        self.add_builtin(backend_id, name, factory);
        self.scan();
    }

    fn add_builtin(&mut self, backend_id: &str, name: &str, factory: BackendFactory) {
        self.builtins.push(Builtin {
            backend_id: backend_id.to_string(),
            name: name.to_string(),
            factory,
        });
    }

    /// Rebuild the descriptor list from the plugin directory
    ///
    /// Descriptors that survive the scan keep their loaded instance and
    /// enabled flag. A loaded plugin whose library disappeared stays listed
    /// until it is released.
    pub fn scan(&mut self) {
        let libraries = match discover_plugins(&self.plugin_dir) {
            Ok(found) => found,
            Err(e) => {
                log::warn!("Failed to scan plugin directory {:?}: {}", self.plugin_dir, e);
                Vec::new()
            }
        };

        let mut previous = std::mem::take(&mut self.descriptors);
        let builtins = self
            .builtins
            .iter()
            .map(|b| PluginDescriptor::builtin(&b.backend_id, &b.name, b.factory));

        for mut descriptor in libraries.into_iter().chain(builtins) {
            if let Some(pos) = previous.iter().position(|p| p.same_origin(&descriptor)) {
                let old = previous.swap_remove(pos);
                descriptor.enabled = old.enabled;
                descriptor.instance = old.instance;
            }
            self.descriptors.push(descriptor);
        }

        for stale in previous.into_iter().filter(|p| p.is_loaded()) {
            log::warn!(
                "Backend '{}' is still loaded but no longer present, keeping it until released",
                stale.backend_id
            );
            self.descriptors.push(stale);
        }

        log::debug!("{} backend descriptor(s) registered", self.descriptors.len());
    }

    pub fn plugin_dir(&self) -> &Path {
        &self.plugin_dir
    }

    pub fn descriptors(&self) -> &[PluginDescriptor] {
        &self.descriptors
    }

    /// Ids of the enabled backends of `kind`, in lookup order without duplicates
    pub fn list_backends(&self, kind: PluginKind) -> Vec<String> {
        let mut ids: Vec<String> = Vec::new();
        for d in self.descriptors.iter().filter(|d| d.kind == kind && d.enabled) {
            if !ids.contains(&d.backend_id) {
                ids.push(d.backend_id.clone());
            }
        }
        ids
    }

    /// Whether any descriptor of `kind` provides `backend_id`
    pub fn has_backend(&self, backend_id: &str, kind: PluginKind) -> bool {
        self.descriptors
            .iter()
            .any(|d| d.kind == kind && d.backend_id == backend_id)
    }

    /// Enable or disable every descriptor of `backend_id`
    ///
    /// Returns false if none exists. Disabling does not unload a backend
    /// that is already in use.
    pub fn set_enabled(&mut self, backend_id: &str, enabled: bool) -> bool {
        let mut found = false;
        for d in self.descriptors.iter_mut().filter(|d| d.backend_id == backend_id) {
            d.enabled = enabled;
            found = true;
        }
        found
    }

    pub fn is_loaded(&self, backend_id: &str) -> bool {
        self.descriptors
            .iter()
            .any(|d| d.backend_id == backend_id && d.is_loaded())
    }

    /// Get the audio backend for `backend_id`, loading it if needed
    ///
    /// Only audio descriptors are considered. An already loaded instance
    /// is shared. Otherwise the enabled descriptors are tried in lookup
    /// order. Failures are logged and yield `None`.
    pub fn acquire(&mut self, backend_id: &str) -> Option<BackendHandle> {
        match self.try_acquire(backend_id) {
            Ok(handle) => Some(handle),
            Err(e) => {
                log::error!("Could not load audio backend '{}': {}", backend_id, e);
                None
            }
        }
    }

    fn try_acquire(&mut self, backend_id: &str) -> PluginResult<BackendHandle> {
        let provides =
            |d: &PluginDescriptor| d.kind == PluginKind::Audio && d.backend_id == backend_id;

        if let Some(handle) = self
            .descriptors
            .iter()
            .filter(|d| provides(d))
            .find_map(|d| d.instance.clone())
        {
            log::debug!("Backend '{}' already loaded", backend_id);
            return Ok(handle);
        }

        if !self.has_backend(backend_id, PluginKind::Audio) {
            return Err(PluginError::NotFound(backend_id.to_string()));
        }

        let mut last_error = PluginError::Disabled(backend_id.to_string());
        for descriptor in self
            .descriptors
            .iter_mut()
            .filter(|d| provides(d) && d.enabled)
        {
            let loaded = match &descriptor.source {
                PluginSource::Builtin(factory) => Ok(LoadedBackend::builtin(factory())),
                PluginSource::Library(path) => LoadedBackend::from_library(path),
            };
            match loaded {
                Ok(loaded) => {
                    if loaded.backend_id() != backend_id {
                        log::warn!(
                            "Plugin '{}' reports backend id '{}'",
                            descriptor.name,
                            loaded.backend_id()
                        );
                    }
                    log::info!("Loaded audio backend '{}' ({})", backend_id, descriptor.name);
                    let handle = Arc::new(loaded);
                    descriptor.instance = Some(Arc::clone(&handle));
                    return Ok(handle);
                }
                Err(e) => {
                    log::warn!("Plugin '{}' failed to load: {}", descriptor.name, e);
                    last_error = e;
                }
            }
        }
        Err(last_error)
    }

    /// Shut down a backend handed out by [`acquire`](Self::acquire)
    ///
    /// The library is unloaded once the last handle is dropped. Releasing
    /// a backend twice does nothing.
    pub fn release(&mut self, handle: &BackendHandle) {
        let Some(descriptor) = self
            .descriptors
            .iter_mut()
            .find(|d| d.instance.as_ref().is_some_and(|i| Arc::ptr_eq(i, handle)))
        else {
            log::debug!("Backend '{}' is not loaded, nothing to release", handle.backend_id());
            return;
        };

        descriptor.instance = None;
        handle.shutdown();
        log::info!("Released audio backend '{}'", descriptor.backend_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DeviceKind;
    use crate::config::StreamSettings;
    use crate::decoder::SharedDecoder;
    use crate::plugin::discovery::library_file_name;
    use crate::stream::AudioStream;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static COUNTED_LOADS: AtomicUsize = AtomicUsize::new(0);
    static COUNTED_SHUTDOWNS: AtomicUsize = AtomicUsize::new(0);

    /// Backend that records how often it is built and shut down
    struct CountedBackend;

    impl AudioBackend for CountedBackend {
        fn name(&self) -> &str {
            "Counted"
        }
        fn backend_id(&self) -> &str {
            "counted"
        }
        fn list_devices(&self, _kind: DeviceKind) -> Vec<String> {
            Vec::new()
        }
        fn current_device(&self, _kind: DeviceKind) -> String {
            String::new()
        }
        fn select_device(&self, _name: &str, _kind: DeviceKind) {}
        fn create_stream(&self, decoder: &SharedDecoder) -> Arc<AudioStream> {
            Arc::new(AudioStream::new(decoder, None, &StreamSettings::default()))
        }
        fn free_stream(&self, _stream: &Arc<AudioStream>) {}
        fn is_timing_available(&self) -> bool {
            false
        }
        fn shutdown(&self) {
            COUNTED_SHUTDOWNS.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn create_counted() -> Box<dyn AudioBackend> {
        COUNTED_LOADS.fetch_add(1, Ordering::SeqCst);
        Box::new(CountedBackend)
    }

    fn null_only(dir: &Path) -> PluginManager {
        let mut manager = PluginManager::without_builtins(dir);
        manager.register_builtin(NULL_BACKEND_ID, "No audio", create_null);
        manager
    }

    #[test]
    fn test_builtins_registered() {
        let dir = tempfile::tempdir().unwrap();
        let manager = PluginManager::new(dir.path());
        let backends = manager.list_backends(PluginKind::Audio);
        assert!(backends.contains(&NULL_BACKEND_ID.to_string()));
        assert!(backends.contains(&"cpal".to_string()));
        assert!(!manager.is_loaded("cpal"));
        assert_eq!(manager.plugin_dir(), dir.path());
    }

    #[test]
    fn test_unknown_backend() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = null_only(dir.path());
        assert!(!manager.has_backend("nonexistent", PluginKind::Audio));
        assert!(manager.acquire("nonexistent").is_none());
        assert!(!manager.is_loaded("nonexistent"));
    }

    #[test]
    fn test_acquire_shares_instance() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = null_only(dir.path());

        let first = manager.acquire(NULL_BACKEND_ID).unwrap();
        let second = manager.acquire(NULL_BACKEND_ID).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(manager.is_loaded(NULL_BACKEND_ID));
    }

    #[test]
    fn test_release_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = PluginManager::without_builtins(dir.path());
        manager.register_builtin("counted", "Counted", create_counted);

        let handle = manager.acquire("counted").unwrap();
        assert_eq!(COUNTED_LOADS.load(Ordering::SeqCst), 1);
        manager.release(&handle);
        manager.release(&handle);
        assert_eq!(COUNTED_SHUTDOWNS.load(Ordering::SeqCst), 1);
        assert!(!manager.is_loaded("counted"));

        // A later acquire builds a fresh instance
        let again = manager.acquire("counted").unwrap();
        assert!(!Arc::ptr_eq(&handle, &again));
        assert_eq!(COUNTED_LOADS.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_broken_library_is_listed_but_fails() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(library_file_name("broken", PluginKind::Audio)),
            b"not a library",
        )
        .unwrap();

        let mut manager = null_only(dir.path());
        assert!(manager.has_backend("broken", PluginKind::Audio));
        assert!(manager.list_backends(PluginKind::Audio).contains(&"broken".to_string()));
        assert!(manager.acquire("broken").is_none());
        assert!(!manager.is_loaded("broken"));
    }

    #[test]
    fn test_library_overrides_builtin_and_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(library_file_name(NULL_BACKEND_ID, PluginKind::Audio)),
            b"not a library",
        )
        .unwrap();

        let mut manager = null_only(dir.path());
        let first = &manager.descriptors()[0];
        assert_eq!(first.backend_id, NULL_BACKEND_ID);
        assert!(!first.is_builtin());
        assert_eq!(manager.list_backends(PluginKind::Audio), vec![NULL_BACKEND_ID.to_string()]);

        // The broken library is skipped in favour of the builtin
        let handle = manager.acquire(NULL_BACKEND_ID).unwrap();
        assert!(handle.path().is_none());
    }

    #[test]
    fn test_video_plugins_listed_separately() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(library_file_name("gl", PluginKind::Video)), b"x").unwrap();

        let manager = null_only(dir.path());
        assert_eq!(manager.list_backends(PluginKind::Video), vec!["gl".to_string()]);
        assert!(!manager.list_backends(PluginKind::Audio).contains(&"gl".to_string()));
    }

    #[test]
    fn test_video_plugin_is_not_an_audio_backend() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(library_file_name("gl", PluginKind::Video)), b"x").unwrap();

        let mut manager = null_only(dir.path());
        assert!(manager.has_backend("gl", PluginKind::Video));
        assert!(!manager.has_backend("gl", PluginKind::Audio));
        assert!(manager.acquire("gl").is_none());
        assert!(!manager.is_loaded("gl"));
    }

    #[test]
    fn test_disabled_backend() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = null_only(dir.path());

        assert!(manager.set_enabled(NULL_BACKEND_ID, false));
        assert!(!manager.set_enabled("nonexistent", false));
        assert!(manager.list_backends(PluginKind::Audio).is_empty());
        assert!(manager.acquire(NULL_BACKEND_ID).is_none());

        manager.set_enabled(NULL_BACKEND_ID, true);
        assert!(manager.acquire(NULL_BACKEND_ID).is_some());
    }

    #[test]
    fn test_rescan_keeps_loaded_instances() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = null_only(dir.path());
        let handle = manager.acquire(NULL_BACKEND_ID).unwrap();

        std::fs::write(dir.path().join(library_file_name("late", PluginKind::Audio)), b"x").unwrap();
        manager.scan();

        assert!(manager.has_backend("late", PluginKind::Audio));
        assert!(manager.is_loaded(NULL_BACKEND_ID));
        let again = manager.acquire(NULL_BACKEND_ID).unwrap();
        assert!(Arc::ptr_eq(&handle, &again));
    }
}
