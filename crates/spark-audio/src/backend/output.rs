//! Output drivers and the thread that owns their device context
//!
//! Device handles (a CPAL stream, a JACK client) are generally not `Send`,
//! so they are created, replaced and dropped on one dedicated thread.
//! Every request reaches that thread over a channel, which serialises all
//! mutation of the device context.

use std::any::Any;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crossbeam::channel::{self, Receiver, Sender};

use super::error::{BackendError, BackendResult};
use super::DeviceKind;
use crate::stream::Mixer;

/// Device opened by a driver
pub struct OpenOutput {
    /// Keeps the device running; dropped to close it
    pub handle: Box<dyn Any>,
    pub info: OutputInfo,
}

/// Description of the active output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputInfo {
    /// Name the device was actually opened under
    pub device: String,
    pub sample_rate: u32,
    pub channels: u16,
}

/// Platform side of a mixing backend
pub trait OutputDriver: Send + Sync + 'static {
    /// Backend id used for lookup (`"cpal"`, `"jack"`)
    const ID: &'static str;
    /// Human-readable backend name
    const NAME: &'static str;

    /// Names of the devices of `kind`; empty when enumeration is unsupported
    fn list_devices(&self, kind: DeviceKind) -> Vec<String>;

    /// Open `device` (empty for the system default) rendering from `mixer`
    ///
    /// Always called on the device thread.
    fn open(&self, device: &str, mixer: Arc<Mixer>) -> BackendResult<OpenOutput>;

    /// Resolve a capture device name, empty for the system default
    fn find_capture(&self, device: &str) -> BackendResult<String> {
        if device.is_empty() {
            return Ok(String::new());
        }
        if self.list_devices(DeviceKind::Capture).iter().any(|d| d == device) {
            Ok(device.to_string())
        } else {
            Err(BackendError::DeviceNotFound(device.to_string()))
        }
    }
}

enum DeviceRequest {
    Open {
        device: String,
        reply: Sender<BackendResult<OutputInfo>>,
    },
    Close,
    Shutdown,
}

/// Owner of the device context of one backend
pub struct DeviceThread {
    requests: Sender<DeviceRequest>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl DeviceThread {
    /// Start the thread; no device is opened yet
    pub fn spawn<D: OutputDriver>(driver: Arc<D>, mixer: Arc<Mixer>) -> BackendResult<Self> {
        let (tx, rx) = channel::unbounded();
        let handle = std::thread::Builder::new()
            .name(format!("spark-device-{}", D::ID))
            .spawn(move || run_device_thread(driver, mixer, rx))
            .map_err(|e| BackendError::DeviceThread(e.to_string()))?;

        Ok(Self {
            requests: tx,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Open `device`, replacing the current one only on success
    pub fn open(&self, device: &str) -> BackendResult<OutputInfo> {
        let (reply, result) = channel::bounded(1);
        self.requests
            .send(DeviceRequest::Open {
                device: device.to_string(),
                reply,
            })
            .map_err(|_| BackendError::DeviceThread("request channel closed".into()))?;
        result
            .recv()
            .map_err(|_| BackendError::DeviceThread("no reply from device thread".into()))?
    }

    /// Close the current device, if any
    pub fn close(&self) {
        let _ = self.requests.send(DeviceRequest::Close);
    }

    /// Close the device and join the thread
    pub fn shutdown(&self) {
        let _ = self.requests.send(DeviceRequest::Shutdown);
        let handle = self.handle.lock().ok().and_then(|mut h| h.take());
        if let Some(handle) = handle {
            if handle.join().is_err() {
                log::error!("Device thread panicked");
            }
        }
    }
}

impl Drop for DeviceThread {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_device_thread<D: OutputDriver>(
    driver: Arc<D>,
    mixer: Arc<Mixer>,
    requests: Receiver<DeviceRequest>,
) {
    let mut active: Option<Box<dyn Any>> = None;

    for request in requests {
        match request {
            DeviceRequest::Open { device, reply } => {
                let result = driver.open(&device, mixer.clone()).map(|output| {
                    // The previous device closes only once the new one is up
                    active = Some(output.handle);
                    output.info
                });
                let _ = reply.send(result);
            }
            DeviceRequest::Close => {
                active = None;
            }
            DeviceRequest::Shutdown => break,
        }
    }

    drop(active);
    log::debug!("{} device thread exiting", D::NAME);
}
