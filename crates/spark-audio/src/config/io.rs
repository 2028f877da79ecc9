//! YAML settings files
//!
//! Reading never fails: a missing or broken file yields defaults so the
//! audio layer can always come up. Writing reports errors to the caller.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

/// Read settings of type `T` from `path`, falling back to `T::default()`
///
/// ```ignore
/// let settings: AudioSettings = load_config(&default_settings_path());
/// ```
pub fn load_config<T>(path: &Path) -> T
where
    T: DeserializeOwned + Default,
{
    if !path.exists() {
        log::info!("No settings at {:?}, using defaults", path);
        return T::default();
    }

    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) => {
            log::warn!("Cannot read settings {:?}: {}, using defaults", path, e);
            return T::default();
        }
    };

    match serde_yaml::from_str::<T>(&contents) {
        Ok(config) => {
            log::info!("Loaded settings from {:?}", path);
            config
        }
        Err(e) => {
            log::warn!("Invalid settings in {:?}: {}, using defaults", path, e);
            T::default()
        }
    }
}

/// Write `config` to `path` as YAML, creating parent directories
pub fn save_config<T>(config: &T, path: &Path) -> Result<()>
where
    T: Serialize,
{
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create settings directory {:?}", parent))?;
    }

    let yaml = serde_yaml::to_string(config).context("Failed to serialize settings")?;
    std::fs::write(path, yaml).with_context(|| format!("Failed to write settings {:?}", path))?;

    log::info!("Saved settings to {:?}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AudioSettings;

    #[test]
    fn test_missing_file_gives_defaults() {
        let settings: AudioSettings = load_config(Path::new("/nonexistent/spark/audio.yaml"));
        assert_eq!(settings, AudioSettings::default());
    }

    #[test]
    fn test_invalid_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audio.yaml");
        std::fs::write(&path, "backend: [not, a, string").unwrap();

        let settings: AudioSettings = load_config(&path);
        assert_eq!(settings, AudioSettings::default());
    }

    #[test]
    fn test_save_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("audio.yaml");

        let settings = AudioSettings {
            backend: "jack".to_string(),
            playback_device: "system".to_string(),
            ..AudioSettings::default()
        };
        save_config(&settings, &path).unwrap();

        let loaded: AudioSettings = load_config(&path);
        assert_eq!(loaded, settings);
    }
}
