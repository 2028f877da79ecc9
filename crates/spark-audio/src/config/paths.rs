//! Default locations for settings and backend plugins

use std::path::PathBuf;

/// Environment variable overriding the plugin directory
pub const PLUGIN_DIR_ENV: &str = "SPARK_AUDIO_PLUGIN_DIR";

/// `~/.config/spark-audio/audio.yaml`
pub fn default_settings_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("spark-audio")
        .join("audio.yaml")
}

/// Directory scanned for backend plugins
///
/// `$SPARK_AUDIO_PLUGIN_DIR` if set, else `~/.local/share/spark-audio/plugins`.
pub fn default_plugin_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os(PLUGIN_DIR_ENV).filter(|v| !v.is_empty()) {
        return PathBuf::from(dir);
    }
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("spark-audio")
        .join("plugins")
}
