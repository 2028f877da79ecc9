//! Host-facing audio manager
//!
//! Owns the selected backend and forwards stream and device calls to it.
//! With no backend loaded every call is logged and answered with
//! `None`/`false`, so the host keeps running silently.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::backend::DeviceKind;
use crate::config::AudioSettings;
use crate::decoder::SharedDecoder;
use crate::plugin::{BackendHandle, PluginKind, PluginManager};
use crate::stream::AudioStream;

pub struct AudioManager {
    plugins: Arc<Mutex<PluginManager>>,
    selected_backend: String,
    backend: Option<BackendHandle>,
    backends: Vec<String>,
    settings: AudioSettings,
}

impl AudioManager {
    /// Load the backend named in `settings`
    pub fn new(plugins: Arc<Mutex<PluginManager>>, settings: AudioSettings) -> Self {
        let backends = lock_plugins(&plugins).list_backends(PluginKind::Audio);
        let backend = settings.backend.clone();
        let mut manager = Self {
            plugins,
            selected_backend: String::new(),
            backend: None,
            backends,
            settings,
        };
        manager.set_backend(&backend);
        manager
    }

    /// Switch to another backend
    ///
    /// Streams of the previous backend are freed by its shutdown. A name
    /// that no audio plugin provides leaves the current backend in place.
    pub fn set_backend(&mut self, name: &str) {
        if name == self.selected_backend {
            return;
        }

        let mut plugins = lock_plugins(&self.plugins);
        if !plugins.has_backend(name, PluginKind::Audio) {
            log::error!("Audio backend '{}' not found, keeping '{}'", name, self.selected_backend);
            return;
        }

        if let Some(previous) = self.backend.take() {
            plugins.release(&previous);
        }
        self.selected_backend = name.to_string();
        self.backend = plugins.acquire(name);
        drop(plugins);

        let Some(backend) = &self.backend else {
            log::error!("Audio backend '{}' failed to load, audio disabled", name);
            return;
        };
        backend.configure_streams(self.settings.stream);
        if !self.settings.playback_device.is_empty() {
            backend.select_device(&self.settings.playback_device, DeviceKind::Playback);
        }
        if !self.settings.capture_device.is_empty() {
            backend.select_device(&self.settings.capture_device, DeviceKind::Capture);
        }
        log::info!("Audio backend '{}' ({}) active", backend.backend_id(), backend.name());
    }

    pub fn selected_backend(&self) -> &str {
        &self.selected_backend
    }

    pub fn is_backend_loaded(&self) -> bool {
        self.backend.is_some()
    }

    pub fn settings(&self) -> &AudioSettings {
        &self.settings
    }

    /// Audio backend ids as of the last refresh
    pub fn backends_list(&self) -> &[String] {
        &self.backends
    }

    /// Rescan the plugin directory and rebuild the backend list
    pub fn refresh_backends_list(&mut self) {
        let mut plugins = lock_plugins(&self.plugins);
        plugins.scan();
        self.backends = plugins.list_backends(PluginKind::Audio);
    }

    pub fn list_devices(&self, kind: DeviceKind) -> Vec<String> {
        self.backend
            .as_ref()
            .map(|b| b.list_devices(kind))
            .unwrap_or_default()
    }

    pub fn current_device(&self, kind: DeviceKind) -> String {
        self.backend
            .as_ref()
            .map(|b| b.current_device(kind))
            .unwrap_or_default()
    }

    /// Select a device and remember it for later backend switches
    pub fn select_device(&mut self, name: &str, kind: DeviceKind) {
        match kind {
            DeviceKind::Playback => self.settings.playback_device = name.to_string(),
            DeviceKind::Capture => self.settings.capture_device = name.to_string(),
        }
        match &self.backend {
            Some(backend) => backend.select_device(name, kind),
            None => log::error!("No audio backend loaded, cannot select {} device", kind),
        }
    }

    pub fn create_stream(&self, decoder: &SharedDecoder) -> Option<Arc<AudioStream>> {
        let backend = self.loaded("create_stream")?;
        Some(backend.create_stream(decoder))
    }

    pub fn free_stream(&self, stream: &Arc<AudioStream>) {
        if let Some(backend) = self.loaded("free_stream") {
            backend.free_stream(stream);
        }
    }

    pub fn pause_stream(&self, stream: &AudioStream) {
        if let Some(backend) = self.loaded("pause_stream") {
            backend.pause_stream(stream);
        }
    }

    pub fn play_stream(&self, stream: &AudioStream) {
        if let Some(backend) = self.loaded("play_stream") {
            backend.play_stream(stream);
        }
    }

    pub fn stop_stream(&self, stream: &AudioStream) {
        if let Some(backend) = self.loaded("stop_stream") {
            backend.stop_stream(stream);
        }
    }

    pub fn is_timing_available(&self) -> bool {
        self.loaded("is_timing_available")
            .map(|b| b.is_timing_available())
            .unwrap_or(false)
    }

    fn loaded(&self, operation: &str) -> Option<&BackendHandle> {
        if self.backend.is_none() {
            log::error!("{}: no audio backend loaded", operation);
        }
        self.backend.as_ref()
    }
}

impl Drop for AudioManager {
    fn drop(&mut self) {
        if let Some(backend) = self.backend.take() {
            lock_plugins(&self.plugins).release(&backend);
        }
    }
}

fn lock_plugins(plugins: &Mutex<PluginManager>) -> MutexGuard<'_, PluginManager> {
    plugins.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::{ManualDriver, TEST_RATE};
    use crate::backend::{AudioBackend, MixingBackend, NullBackend, NULL_BACKEND_ID};
    use crate::config::StreamSettings;
    use crate::decoder::{shared, PcmDecoder};
    use crate::plugin::discovery::library_file_name;
    use crate::stream::StreamState;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static NULL_LOADS: AtomicUsize = AtomicUsize::new(0);

    fn create_null() -> Box<dyn AudioBackend> {
        Box::new(NullBackend::new())
    }

    fn create_counted_null() -> Box<dyn AudioBackend> {
        NULL_LOADS.fetch_add(1, Ordering::SeqCst);
        Box::new(NullBackend::new())
    }

    fn create_manual() -> Box<dyn AudioBackend> {
        Box::new(MixingBackend::with_settings(
            ManualDriver::default(),
            StreamSettings {
                fill_interval_ms: 60_000,
                ..StreamSettings::default()
            },
        ))
    }

    fn plugins(dir: &std::path::Path) -> Arc<Mutex<PluginManager>> {
        let mut plugins = PluginManager::without_builtins(dir);
        plugins.register_builtin(NULL_BACKEND_ID, "No audio", create_null);
        plugins.register_builtin("manual", "Manual", create_manual);
        Arc::new(Mutex::new(plugins))
    }

    #[test]
    fn test_nonexistent_backend_disables_audio() {
        let dir = tempfile::tempdir().unwrap();
        let manager = AudioManager::new(plugins(dir.path()), AudioSettings::with_backend("nonexistent"));

        assert!(!manager.is_backend_loaded());
        assert_eq!(manager.selected_backend(), "");
        let decoder = shared(PcmDecoder::silence(2, 44100, 100));
        assert!(manager.create_stream(&decoder).is_none());
        assert!(!manager.is_timing_available());
        assert!(manager.list_devices(DeviceKind::Playback).is_empty());
    }

    #[test]
    fn test_unknown_backend_keeps_current() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = AudioManager::new(plugins(dir.path()), AudioSettings::with_backend("manual"));
        assert!(manager.is_timing_available());

        manager.set_backend("nonexistent");
        assert_eq!(manager.selected_backend(), "manual");
        assert!(manager.is_timing_available());
    }

    #[test]
    fn test_set_same_backend_loads_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut plugins = PluginManager::without_builtins(dir.path());
        plugins.register_builtin("counted", "Counted", create_counted_null);
        let plugins = Arc::new(Mutex::new(plugins));

        let mut manager = AudioManager::new(Arc::clone(&plugins), AudioSettings::with_backend("counted"));
        manager.set_backend("counted");
        manager.set_backend("counted");
        assert_eq!(NULL_LOADS.load(Ordering::SeqCst), 1);
        assert!(manager.is_backend_loaded());
    }

    #[test]
    fn test_null_backend_streams_are_dead() {
        let dir = tempfile::tempdir().unwrap();
        let manager = AudioManager::new(plugins(dir.path()), AudioSettings::with_backend(NULL_BACKEND_ID));
        assert!(manager.is_backend_loaded());
        assert!(!manager.is_timing_available());

        let decoder = shared(PcmDecoder::silence(2, 44100, 100));
        let stream = manager.create_stream(&decoder).unwrap();
        assert_eq!(stream.state(), StreamState::Dead);
        manager.play_stream(&stream);
        manager.free_stream(&stream);
    }

    #[test]
    fn test_switching_releases_previous_backend() {
        let dir = tempfile::tempdir().unwrap();
        let shared_plugins = plugins(dir.path());
        let mut manager = AudioManager::new(Arc::clone(&shared_plugins), AudioSettings::with_backend("manual"));

        let decoder = shared(PcmDecoder::silence(2, TEST_RATE, 1000));
        let stream = manager.create_stream(&decoder).unwrap();
        manager.play_stream(&stream);
        assert_eq!(stream.state(), StreamState::Playing);

        manager.set_backend(NULL_BACKEND_ID);
        assert!(!shared_plugins.lock().unwrap().is_loaded("manual"));
        assert!(!stream.is_valid());
        assert_eq!(manager.selected_backend(), NULL_BACKEND_ID);

        // Nothing of the unloaded backend is reachable from the stream
        assert!(stream.source().is_none());
        assert_eq!(stream.played_time_ms(), 0);
        manager.free_stream(&stream);
    }

    #[test]
    fn test_video_plugin_name_keeps_current() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(library_file_name("gl", PluginKind::Video)), b"x").unwrap();
        let shared_plugins = plugins(dir.path());
        let mut manager = AudioManager::new(Arc::clone(&shared_plugins), AudioSettings::with_backend("manual"));

        manager.set_backend("gl");
        assert_eq!(manager.selected_backend(), "manual");
        assert!(manager.is_backend_loaded());
        assert!(manager.is_timing_available());
        assert!(shared_plugins.lock().unwrap().is_loaded("manual"));
    }

    #[test]
    fn test_configured_device_applied() {
        let dir = tempfile::tempdir().unwrap();
        let settings = AudioSettings {
            playback_device: "right".to_string(),
            ..AudioSettings::with_backend("manual")
        };
        let mut manager = AudioManager::new(plugins(dir.path()), settings);
        assert_eq!(manager.current_device(DeviceKind::Playback), "right");

        manager.select_device("left", DeviceKind::Playback);
        assert_eq!(manager.current_device(DeviceKind::Playback), "left");
        assert_eq!(manager.settings().playback_device, "left");
    }

    #[test]
    fn test_drop_releases_backend() {
        let dir = tempfile::tempdir().unwrap();
        let shared_plugins = plugins(dir.path());
        {
            let _manager = AudioManager::new(Arc::clone(&shared_plugins), AudioSettings::with_backend("manual"));
            assert!(shared_plugins.lock().unwrap().is_loaded("manual"));
        }
        assert!(!shared_plugins.lock().unwrap().is_loaded("manual"));
    }

    #[test]
    fn test_refresh_backends_list() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = AudioManager::new(plugins(dir.path()), AudioSettings::with_backend(NULL_BACKEND_ID));
        assert_eq!(manager.backends_list(), ["none".to_string(), "manual".to_string()]);

        std::fs::write(dir.path().join(library_file_name("pulse", PluginKind::Audio)), b"x").unwrap();
        manager.refresh_backends_list();
        assert_eq!(manager.backends_list()[0], "pulse");
    }
}
