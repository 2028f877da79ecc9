//! Native JACK output driver for Linux
//!
//! Registers a stereo pair of output ports and renders the backend's mixer
//! from the JACK process callback. Devices are the server's playback
//! clients (e.g. `system`); selecting one connects our ports to its first
//! two playback ports.
//!
//! Works with PipeWire's JACK compatibility layer.

use std::collections::BTreeSet;
use std::sync::Arc;

use jack::{AudioOut, Client, ClientOptions, Control, Port, PortFlags, ProcessScope};

use super::error::{BackendError, BackendResult};
use super::mixing::MixingBackend;
use super::output::{OpenOutput, OutputDriver, OutputInfo};
use super::DeviceKind;
use crate::stream::Mixer;

/// Frames pre-allocated for the render buffer when the server period is shorter
const MIN_RENDER_FRAMES: usize = 8192;

/// Client used when the server is asked for the default device
const DEFAULT_DEVICE: &str = "system";

const OUT_LEFT: &str = "out_left";
const OUT_RIGHT: &str = "out_right";

/// Buffer-queue backend over a JACK client
pub type JackBackend = MixingBackend<JackDriver>;

#[derive(Debug, Clone)]
pub struct JackDriver {
    client_name: String,
}

impl Default for JackDriver {
    fn default() -> Self {
        Self {
            client_name: "spark_audio".to_string(),
        }
    }
}

impl JackDriver {
    /// Ports matching `pattern`, grouped by owning client
    fn clients_with_ports(pattern: &str, flags: PortFlags) -> Vec<String> {
        let (client, _) = match Client::new("spark_port_query", ClientOptions::NO_START_SERVER) {
            Ok(c) => c,
            Err(e) => {
                log::debug!("Could not connect to JACK to enumerate ports: {}", e);
                return Vec::new();
            }
        };

        let clients: BTreeSet<String> = client
            .ports(Some(pattern), None, flags)
            .into_iter()
            .filter_map(|port| port.rfind(':').map(|colon| port[..colon].to_string()))
            .collect();
        clients.into_iter().collect()
    }
}

/// Process handler: pulls one period from the mixer into the two ports
struct JackRender {
    left: Port<AudioOut>,
    right: Port<AudioOut>,
    mixer: Arc<Mixer>,
    sample_rate: u32,
    scratch: Vec<f32>,
}

impl jack::ProcessHandler for JackRender {
    fn process(&mut self, _client: &Client, ps: &ProcessScope) -> Control {
        let left = self.left.as_mut_slice(ps);
        let right = self.right.as_mut_slice(ps);
        render_period(&self.mixer, &mut self.scratch, self.sample_rate, left, right);
        Control::Continue
    }
}

/// Fill both port buffers from `mixer`
///
/// A period longer than `scratch` is rendered in several passes, so every
/// frame of the ports is written.
fn render_period(
    mixer: &Mixer,
    scratch: &mut [f32],
    sample_rate: u32,
    left: &mut [f32],
    right: &mut [f32],
) {
    let chunk = scratch.len() / 2;
    if chunk == 0 {
        left.fill(0.0);
        right.fill(0.0);
        return;
    }
    for (left, right) in left.chunks_mut(chunk).zip(right.chunks_mut(chunk)) {
        let interleaved = &mut scratch[..left.len() * 2];
        mixer.render(interleaved, 2, sample_rate);
        for ((l, r), frame) in left.iter_mut().zip(right.iter_mut()).zip(interleaved.chunks_exact(2)) {
            *l = frame[0];
            *r = frame[1];
        }
    }
}

struct JackNotifications;

impl jack::NotificationHandler for JackNotifications {
    fn xrun(&mut self, _client: &Client) -> Control {
        log::warn!("JACK xrun detected");
        Control::Continue
    }
}

impl OutputDriver for JackDriver {
    const ID: &'static str = "jack";
    const NAME: &'static str = "JACK";

    fn list_devices(&self, kind: DeviceKind) -> Vec<String> {
        match kind {
            DeviceKind::Playback => Self::clients_with_ports(".*:playback_.*", PortFlags::IS_INPUT),
            DeviceKind::Capture => Self::clients_with_ports(".*:capture_.*", PortFlags::IS_OUTPUT),
        }
    }

    fn open(&self, device: &str, mixer: Arc<Mixer>) -> BackendResult<OpenOutput> {
        let target = if device.is_empty() { DEFAULT_DEVICE } else { device };

        let (client, _status) = Client::new(&self.client_name, ClientOptions::NO_START_SERVER)
            .map_err(|e| BackendError::ClientError(format!("Failed to create JACK client: {}", e)))?;

        let client_name = client.name().to_string();
        let sample_rate = client.sample_rate() as u32;
        let period = (client.buffer_size() as usize).max(MIN_RENDER_FRAMES);

        let pattern = format!("^{}:playback_.*", regex_escape(target));
        let playback = client.ports(Some(pattern.as_str()), None, PortFlags::IS_INPUT);
        if playback.len() < 2 {
            return Err(BackendError::DeviceNotFound(target.to_string()));
        }

        let left = client
            .register_port(OUT_LEFT, AudioOut::default())
            .map_err(|e| BackendError::ClientError(format!("Failed to register port: {}", e)))?;
        let right = client
            .register_port(OUT_RIGHT, AudioOut::default())
            .map_err(|e| BackendError::ClientError(format!("Failed to register port: {}", e)))?;

        let render = JackRender {
            left,
            right,
            mixer,
            sample_rate,
            scratch: vec![0.0; period * 2],
        };
        let active = client
            .activate_async(JackNotifications, render)
            .map_err(|e| BackendError::ClientError(format!("Failed to activate JACK client: {}", e)))?;

        for (port, dest) in [OUT_LEFT, OUT_RIGHT].iter().zip(playback.iter()) {
            let source = format!("{}:{}", client_name, port);
            if let Err(e) = active.as_client().connect_ports_by_name(&source, dest) {
                log::warn!("Failed to connect {} -> {}: {}", source, dest, e);
            }
        }

        log::info!(
            "JACK client '{}' connected to '{}' ({}Hz)",
            client_name,
            target,
            sample_rate
        );

        Ok(OpenOutput {
            handle: Box::new(active),
            info: OutputInfo {
                device: target.to_string(),
                sample_rate,
                channels: 2,
            },
        })
    }
}

/// Escape a client name for use in a JACK port regex
fn regex_escape(name: &str) -> String {
    let mut escaped = String::with_capacity(name.len());
    for c in name.chars() {
        if "\\.+*?()|[]{}^$".contains(c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
