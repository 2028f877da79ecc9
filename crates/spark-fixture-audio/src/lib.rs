//! Backend plugin with no device behind it
//!
//! Streams get a real playback source, so a host can exercise the whole
//! load, stream and unload cycle of a library plugin without hardware.

use std::sync::Arc;

use spark_audio::backend::{BackendResult, MixingBackend, OpenOutput, OutputDriver, OutputInfo};
use spark_audio::stream::Mixer;
use spark_audio::DeviceKind;

struct SilentDriver;

impl OutputDriver for SilentDriver {
    const ID: &'static str = "fixture";
    const NAME: &'static str = "Fixture";

    fn list_devices(&self, _kind: DeviceKind) -> Vec<String> {
        vec!["silent".to_string()]
    }

    fn open(&self, _device: &str, _mixer: Arc<Mixer>) -> BackendResult<OpenOutput> {
        Ok(OpenOutput {
            handle: Box::new(()),
            info: OutputInfo {
                device: "silent".to_string(),
                sample_rate: 44100,
                channels: 2,
            },
        })
    }
}

spark_audio::export_audio_backend!(MixingBackend::new(SilentDriver));
