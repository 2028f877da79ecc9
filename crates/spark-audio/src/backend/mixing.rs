//! Buffer-queue backend shared by the hardware drivers
//!
//! ```text
//! ┌──────────────┐  fill()   ┌──────────────┐  queue   ┌──────────────┐
//! │  Fill pump   │──────────►│ AudioStream  │─────────►│ QueuedSource │
//! │ (per backend)│           │  (per sound) │          │  (per sound) │
//! └──────────────┘           └──────────────┘          └──────┬───────┘
//!                                                             │ render
//!                            ┌──────────────┐          ┌──────▼───────┐
//!                            │ Device thread│─ owns ──►│    Mixer     │
//!                            │ (CPAL / JACK)│ callback │              │
//!                            └──────────────┘          └──────────────┘
//! ```
//!
//! The device thread owns the platform context and its callback renders
//! the mixer. The fill pump tops up every live stream on a fixed period.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::thread::JoinHandle;

use crossbeam::channel::{self, RecvTimeoutError, Sender};

use super::output::{DeviceThread, OutputDriver};
use super::{AudioBackend, DeviceKind};
use crate::config::StreamSettings;
use crate::decoder::SharedDecoder;
use crate::stream::{AudioStream, Mixer, PlaybackSource, QueuedSource};

/// Streams owned by one backend
type StreamList = Mutex<Vec<Arc<AudioStream>>>;

fn lock_list(list: &StreamList) -> MutexGuard<'_, Vec<Arc<AudioStream>>> {
    list.lock().unwrap_or_else(|e| e.into_inner())
}

/// Thread calling `fill()` on every live stream
struct FillPump {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

impl FillPump {
    fn spawn(
        backend_id: &str,
        streams: Arc<StreamList>,
        settings: Arc<RwLock<StreamSettings>>,
    ) -> Option<Self> {
        let (stop, stopped) = channel::bounded::<()>(1);
        let spawned = std::thread::Builder::new()
            .name(format!("spark-fill-{}", backend_id))
            .spawn(move || loop {
                let interval = settings
                    .read()
                    .map(|s| s.fill_interval())
                    .unwrap_or_else(|e| e.into_inner().fill_interval());
                match stopped.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {}
                    _ => break,
                }
                for stream in lock_list(&streams).iter() {
                    stream.fill();
                }
            });

        match spawned {
            Ok(handle) => Some(Self { stop, handle }),
            Err(e) => {
                log::error!("Failed to start fill pump: {}", e);
                None
            }
        }
    }

    fn stop(self) {
        let _ = self.stop.send(());
        if self.handle.join().is_err() {
            log::error!("Fill pump panicked");
        }
    }
}

/// Device selection of one kind
#[derive(Default)]
struct Selection {
    requested: String,
    active: String,
}

/// Backend that mixes stream buffer queues into one output device
pub struct MixingBackend<D: OutputDriver> {
    driver: Arc<D>,
    mixer: Arc<Mixer>,
    device: Option<DeviceThread>,
    streams: Arc<StreamList>,
    context_ready: AtomicBool,
    playback: Mutex<Selection>,
    capture: Mutex<Selection>,
    settings: Arc<RwLock<StreamSettings>>,
    pump: Mutex<Option<FillPump>>,
}

impl<D: OutputDriver> MixingBackend<D> {
    /// Create the backend and open the default playback device
    ///
    /// A device that fails to open leaves the backend without an output
    /// context: it still works, but every stream it creates is dead.
    pub fn new(driver: D) -> Self {
        Self::with_settings(driver, StreamSettings::default())
    }

    /// Like [`MixingBackend::new`] with explicit stream settings
    pub fn with_settings(driver: D, settings: StreamSettings) -> Self {
        let driver = Arc::new(driver);
        let mixer = Arc::new(Mixer::new());
        let streams = Arc::new(StreamList::default());
        let settings = Arc::new(RwLock::new(settings));

        let device = match DeviceThread::spawn(driver.clone(), mixer.clone()) {
            Ok(device) => Some(device),
            Err(e) => {
                log::error!("{}: {}", D::NAME, e);
                None
            }
        };
        let pump = FillPump::spawn(D::ID, streams.clone(), settings.clone());

        let backend = Self {
            driver,
            mixer,
            device,
            streams,
            context_ready: AtomicBool::new(false),
            playback: Mutex::new(Selection::default()),
            capture: Mutex::new(Selection::default()),
            settings,
            pump: Mutex::new(pump),
        };
        backend.open_playback("");
        backend
    }

    /// Number of streams created and not yet freed
    pub fn live_streams(&self) -> usize {
        lock_list(&self.streams).len()
    }

    #[cfg(test)]
    pub(crate) fn mixer(&self) -> &Arc<Mixer> {
        &self.mixer
    }

    fn open_playback(&self, name: &str) -> bool {
        let Some(device) = &self.device else {
            return false;
        };
        match device.open(name) {
            Ok(info) => {
                log::info!(
                    "{}: playback on '{}' ({}Hz, {} channels)",
                    D::NAME,
                    info.device,
                    info.sample_rate,
                    info.channels
                );
                if let Ok(mut selection) = self.playback.lock() {
                    selection.requested = name.to_string();
                    selection.active = info.device;
                }
                self.context_ready.store(true, Ordering::Release);
                true
            }
            Err(e) => {
                log::warn!("{}: cannot open playback device '{}': {}", D::NAME, name, e);
                false
            }
        }
    }

    fn stream_settings(&self) -> StreamSettings {
        self.settings
            .read()
            .map(|s| *s)
            .unwrap_or_else(|e| *e.into_inner())
    }
}

impl<D: OutputDriver> AudioBackend for MixingBackend<D> {
    fn name(&self) -> &str {
        D::NAME
    }

    fn backend_id(&self) -> &str {
        D::ID
    }

    fn list_devices(&self, kind: DeviceKind) -> Vec<String> {
        self.driver.list_devices(kind)
    }

    fn current_device(&self, kind: DeviceKind) -> String {
        let selection = match kind {
            DeviceKind::Playback => &self.playback,
            DeviceKind::Capture => &self.capture,
        };
        selection
            .lock()
            .map(|s| s.active.clone())
            .unwrap_or_default()
    }

    fn select_device(&self, name: &str, kind: DeviceKind) {
        match kind {
            DeviceKind::Playback => {
                let already = self
                    .playback
                    .lock()
                    .map(|s| s.requested == name || (!name.is_empty() && s.active == name))
                    .unwrap_or(false);
                if already && self.is_timing_available() {
                    return;
                }
                self.open_playback(name);
            }
            DeviceKind::Capture => match self.driver.find_capture(name) {
                Ok(resolved) => {
                    log::info!("{}: capture device set to '{}'", D::NAME, resolved);
                    if let Ok(mut selection) = self.capture.lock() {
                        selection.requested = name.to_string();
                        selection.active = resolved;
                    }
                }
                Err(e) => {
                    log::warn!("{}: cannot select capture device '{}': {}", D::NAME, name, e);
                }
            },
        }
    }

    fn create_stream(&self, decoder: &SharedDecoder) -> Arc<AudioStream> {
        let settings = self.stream_settings();
        let format = decoder.lock().unwrap_or_else(|e| e.into_inner()).format();

        let source = if self.is_timing_available() && format.is_supported() {
            let source = Arc::new(QueuedSource::new(format));
            self.mixer.attach(source.clone());
            Some(source)
        } else {
            None
        };

        let endpoint = source.clone().map(|s| s as Arc<dyn PlaybackSource>);
        let stream = Arc::new(AudioStream::new(decoder, endpoint, &settings));

        if stream.is_valid() {
            lock_list(&self.streams).push(stream.clone());
        } else if let Some(source) = source {
            self.mixer.detach(&source);
        }
        stream
    }

    fn free_stream(&self, stream: &Arc<AudioStream>) {
        {
            let mut streams = lock_list(&self.streams);
            streams.retain(|s| !Arc::ptr_eq(s, stream));
        }
        stream.release(self.stream_settings().free_timeout(), |source| {
            self.mixer.detach(source);
        });
    }

    fn is_timing_available(&self) -> bool {
        self.context_ready.load(Ordering::Acquire)
    }

    fn configure_streams(&self, settings: StreamSettings) {
        match self.settings.write() {
            Ok(mut current) => *current = settings,
            Err(e) => *e.into_inner() = settings,
        }
    }

    fn shutdown(&self) {
        let pump = self.pump.lock().ok().and_then(|mut p| p.take());
        if let Some(pump) = pump {
            pump.stop();
        }

        let timeout = self.stream_settings().free_timeout();
        let streams: Vec<_> = lock_list(&self.streams).drain(..).collect();
        if !streams.is_empty() {
            log::info!("{}: freeing {} streams", D::NAME, streams.len());
        }
        for stream in streams {
            stream.release(timeout, |source| {
                self.mixer.detach(source);
            });
        }
        self.mixer.clear();

        if let Some(device) = &self.device {
            device.close();
            device.shutdown();
        }
        self.context_ready.store(false, Ordering::Release);
    }
}

impl<D: OutputDriver> Drop for MixingBackend<D> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
