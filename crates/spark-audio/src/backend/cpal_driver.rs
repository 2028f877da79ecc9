//! CPAL output driver
//!
//! Opens one f32 output stream on the default host and renders the
//! backend's mixer from its callback. Device names are the host's own
//! (e.g. `default`, `hw:CARD=PCH,DEV=0` on ALSA).

use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig};

use super::error::{BackendError, BackendResult};
use super::mixing::MixingBackend;
use super::output::{OpenOutput, OutputDriver, OutputInfo};
use super::DeviceKind;
use crate::stream::Mixer;

/// Preferred device rate when the device supports it
const PREFERRED_SAMPLE_RATE: u32 = 44100;

/// Buffer-queue backend over CPAL
pub type CpalBackend = MixingBackend<CpalDriver>;

#[derive(Debug, Default)]
pub struct CpalDriver;

impl CpalDriver {
    fn find_device(
        host: &cpal::Host,
        name: &str,
        kind: DeviceKind,
    ) -> BackendResult<cpal::Device> {
        if name.is_empty() {
            let device = match kind {
                DeviceKind::Playback => host.default_output_device(),
                DeviceKind::Capture => host.default_input_device(),
            };
            return device.ok_or_else(|| BackendError::NoDefaultDevice(kind.to_string()));
        }

        Self::devices(host, kind)
            .map_err(|e| BackendError::ConfigError(e.to_string()))?
            .into_iter()
            .find(|d| d.name().ok().as_deref() == Some(name))
            .ok_or_else(|| BackendError::DeviceNotFound(name.to_string()))
    }

    fn devices(
        host: &cpal::Host,
        kind: DeviceKind,
    ) -> Result<Vec<cpal::Device>, cpal::DevicesError> {
        Ok(match kind {
            DeviceKind::Playback => host.output_devices()?.collect(),
            DeviceKind::Capture => host.input_devices()?.collect(),
        })
    }

    /// Pick an f32 configuration, stereo and 44.1kHz when available
    fn output_config(device: &cpal::Device) -> BackendResult<StreamConfig> {
        let supported: Vec<_> = device
            .supported_output_configs()
            .map_err(|e| BackendError::ConfigError(e.to_string()))?
            .filter(|c| c.sample_format() == SampleFormat::F32)
            .collect();

        let in_range = |c: &cpal::SupportedStreamConfigRange| {
            PREFERRED_SAMPLE_RATE >= c.min_sample_rate().0
                && PREFERRED_SAMPLE_RATE <= c.max_sample_rate().0
        };

        let best = supported
            .iter()
            .find(|c| c.channels() == 2 && in_range(*c))
            .or_else(|| supported.iter().find(|c| c.channels() >= 2))
            .or_else(|| supported.first())
            .ok_or_else(|| BackendError::ConfigError("no f32 output configuration".to_string()))?;

        let rate = if in_range(best) {
            cpal::SampleRate(PREFERRED_SAMPLE_RATE)
        } else {
            best.max_sample_rate()
        };

        Ok(best.clone().with_sample_rate(rate).config())
    }
}

impl OutputDriver for CpalDriver {
    const ID: &'static str = "cpal";
    const NAME: &'static str = "CPAL";

    fn list_devices(&self, kind: DeviceKind) -> Vec<String> {
        match Self::devices(&cpal::default_host(), kind) {
            Ok(devices) => devices.iter().filter_map(|d| d.name().ok()).collect(),
            Err(e) => {
                log::debug!("Could not enumerate {} devices: {}", kind, e);
                Vec::new()
            }
        }
    }

    fn open(&self, device: &str, mixer: Arc<Mixer>) -> BackendResult<OpenOutput> {
        let host = cpal::default_host();
        let device = Self::find_device(&host, device, DeviceKind::Playback)?;
        let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        let config = Self::output_config(&device)?;

        let channels = config.channels as usize;
        let sample_rate = config.sample_rate.0;

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                    mixer.render(data, channels, sample_rate);
                },
                move |err| {
                    log::error!("CPAL output stream error: {}", err);
                },
                None,
            )
            .map_err(|e| BackendError::StreamBuildError(e.to_string()))?;
        stream
            .play()
            .map_err(|e| BackendError::StreamPlayError(e.to_string()))?;

        Ok(OpenOutput {
            handle: Box::new(stream),
            info: OutputInfo {
                device: name,
                sample_rate,
                channels: config.channels,
            },
        })
    }

    fn find_capture(&self, device: &str) -> BackendResult<String> {
        let host = cpal::default_host();
        let device = Self::find_device(&host, device, DeviceKind::Capture)?;
        Ok(device.name().unwrap_or_default())
    }
}
