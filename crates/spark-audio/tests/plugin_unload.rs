//! Library backend unloaded under a live stream
//!
//! Builds the `spark-fixture-audio` plugin with cargo into its own target
//! directory, so it only runs on request:
//!
//! ```text
//! cargo test -p spark-audio --test plugin_unload -- --ignored
//! ```

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Arc, Mutex};

use spark_audio::backend::{AudioBackend, NullBackend, NULL_BACKEND_ID};
use spark_audio::decoder::shared;
use spark_audio::plugin::discovery::library_file_name;
use spark_audio::{AudioManager, AudioSettings, PcmDecoder, PluginKind, PluginManager};

fn create_null() -> Box<dyn AudioBackend> {
    Box::new(NullBackend::new())
}

fn build_fixture_plugin() -> PathBuf {
    let workspace = Path::new(env!("CARGO_MANIFEST_DIR")).join("../..");
    let target_dir = workspace.join("target").join("fixture");
    let status = Command::new(env!("CARGO"))
        .current_dir(&workspace)
        .args(["build", "-p", "spark-fixture-audio", "--target-dir"])
        .arg(&target_dir)
        .status()
        .expect("failed to run cargo");
    assert!(status.success(), "building spark-fixture-audio failed");
    target_dir
        .join("debug")
        .join(library_file_name("fixture", PluginKind::Audio))
}

#[test]
#[ignore = "builds the fixture plugin with cargo"]
fn test_stream_survives_plugin_unload() {
    let built = build_fixture_plugin();
    let dir = tempfile::tempdir().unwrap();
    std::fs::copy(&built, dir.path().join(built.file_name().unwrap())).unwrap();

    let mut plugins = PluginManager::without_builtins(dir.path());
    plugins.register_builtin(NULL_BACKEND_ID, "No audio", create_null);
    let plugins = Arc::new(Mutex::new(plugins));

    let mut manager = AudioManager::new(Arc::clone(&plugins), AudioSettings::with_backend("fixture"));
    assert!(manager.is_backend_loaded());
    assert!(manager.is_timing_available());

    let decoder = shared(PcmDecoder::silence(2, 44100, 1000));
    let stream = manager.create_stream(&decoder).unwrap();
    assert!(stream.is_valid());
    manager.play_stream(&stream);

    // Drops the last handle and unmaps the library
    manager.set_backend(NULL_BACKEND_ID);
    assert!(!plugins.lock().unwrap().is_loaded("fixture"));

    assert!(!stream.is_valid());
    assert_eq!(stream.played_time_ms(), 0);
    stream.fill();
    stream.pause();
    stream.stop();
    manager.free_stream(&stream);
    drop(stream);
    drop(manager);
}
