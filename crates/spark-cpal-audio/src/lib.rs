//! CPAL backend as a plugin library
//!
//! Copy the built `libspark_cpal_audio.so` into the plugin directory to
//! have it replace the builtin `cpal` backend.

use spark_audio::backend::{CpalBackend, CpalDriver};

spark_audio::export_audio_backend!(CpalBackend::new(CpalDriver));
