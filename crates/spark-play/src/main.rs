//! spark-play - play a WAV file through a spark-audio backend
//!
//! ```text
//! spark-play song.wav
//! spark-play --backend jack --device system song.wav
//! spark-play --list-backends
//! spark-play --backend cpal --list-devices
//! ```
//!
//! Settings come from `~/.config/spark-audio/audio.yaml` (or `--config`);
//! command line options override them for this run.

use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;

use spark_audio::config::{default_settings_path, load_config, save_config};
use spark_audio::decoder::shared;
use spark_audio::{
    AudioDecoder, AudioManager, AudioSettings, DeviceKind, PcmDecoder, PluginManager, StreamState,
};

/// Interval between progress updates
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Polls without progress after which a starved stream counts as finished
const IDLE_POLLS: u32 = 4;

#[derive(Parser)]
#[command(name = "spark-play")]
#[command(about = "Play a WAV file through a spark-audio backend")]
struct Args {
    /// WAV file to play
    file: Option<PathBuf>,

    /// Backend id (cpal, jack, none, or a plugin's id)
    #[arg(short, long)]
    backend: Option<String>,

    /// Playback device name
    #[arg(short, long)]
    device: Option<String>,

    /// Directory to scan for backend plugins
    #[arg(long)]
    plugin_dir: Option<PathBuf>,

    /// Settings file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write the effective settings back to the settings file
    #[arg(long)]
    save_config: bool,

    /// List the available backends and exit
    #[arg(long)]
    list_backends: bool,

    /// List the playback devices of the backend and exit
    #[arg(long)]
    list_devices: bool,
}

fn main() -> Result<()> {
    // Set RUST_LOG=debug for per-buffer detail
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = Args::parse();

    let config_path = args.config.clone().unwrap_or_else(default_settings_path);
    let mut settings: AudioSettings = load_config(&config_path);
    if let Some(backend) = &args.backend {
        settings.backend = backend.clone();
    }
    if let Some(device) = &args.device {
        settings.playback_device = device.clone();
    }
    if let Some(dir) = &args.plugin_dir {
        settings.plugin_dir = Some(dir.clone());
    }
    if args.save_config {
        save_config(&settings, &config_path)?;
        println!("Saved settings to {}", config_path.display());
    }

    let plugins = Arc::new(Mutex::new(PluginManager::new(settings.plugin_dir())));

    if args.list_backends {
        let plugins = plugins.lock().unwrap_or_else(|e| e.into_inner());
        println!("Backends (plugin directory {}):", plugins.plugin_dir().display());
        for descriptor in plugins.descriptors() {
            let origin = match descriptor.path() {
                Some(path) => path.display().to_string(),
                None => "builtin".to_string(),
            };
            println!(
                "  {:<10} {:<6} {}{}",
                descriptor.backend_id,
                descriptor.kind,
                origin,
                if descriptor.enabled { "" } else { " (disabled)" }
            );
        }
        return Ok(());
    }

    let manager = AudioManager::new(plugins, settings);

    if args.list_devices {
        let current = manager.current_device(DeviceKind::Playback);
        for device in manager.list_devices(DeviceKind::Playback) {
            let marker = if device == current { "*" } else { " " };
            println!("{} {}", marker, device);
        }
        return Ok(());
    }

    let path = args.file.context("No input file given (see --help)")?;
    let decoder = PcmDecoder::from_wav(&path)
        .with_context(|| format!("Failed to read WAV file {}", path.display()))?;
    let duration_ms = decoder.duration_ms();
    println!(
        "{}: {}Hz, {} channel(s), {}",
        path.display(),
        decoder.sample_rate(),
        decoder.channel_count(),
        format_time(duration_ms)
    );
    let decoder = shared(decoder);

    let stream = manager
        .create_stream(&decoder)
        .context("No audio backend loaded")?;
    if !stream.is_valid() {
        manager.free_stream(&stream);
        bail!(
            "Backend '{}' has no working output",
            manager.selected_backend()
        );
    }

    manager.play_stream(&stream);
    log::info!("Playing {} on '{}'", path.display(), manager.current_device(DeviceKind::Playback));

    let mut last = 0;
    let mut idle = 0;
    loop {
        thread::sleep(POLL_INTERVAL);
        let played = stream.played_time_ms();
        print!("\r{} / {}", format_time(played), format_time(duration_ms));
        std::io::stdout().flush()?;

        if played >= duration_ms || matches!(stream.state(), StreamState::Stopped | StreamState::Dead) {
            break;
        }
        if stream.is_starved() && played == last {
            idle += 1;
            if idle >= IDLE_POLLS {
                break;
            }
        } else {
            idle = 0;
        }
        last = played;
    }
    println!();

    manager.free_stream(&stream);
    Ok(())
}

fn format_time(ms: u64) -> String {
    let seconds = ms / 1000;
    format!("{}:{:02}.{:01}", seconds / 60, seconds % 60, (ms % 1000) / 100)
}
