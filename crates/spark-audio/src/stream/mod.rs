//! Streaming engine
//!
//! - [`AudioStream`]: per-sound state machine and buffer-filling loop
//! - [`PlaybackSource`] / [`QueuedSource`]: device-side buffer queue
//! - [`Mixer`]: sums every attached source in the output callback
//!
//! Streams are fed by repeated calls to [`AudioStream::fill`], either from
//! the backend's fill pump or directly by the caller. The device consumes
//! buffers at its own pace; played time is counted from consumed bytes.

mod mixer;
mod source;
mod state;
#[allow(clippy::module_inception)]
mod stream;

pub use mixer::Mixer;
pub use source::{
    BufferId, PlaybackSource, QueuedSource, SourceError, SourceResult, SourceState,
    DEFAULT_POOL_LIMIT,
};
pub use state::StreamState;
pub use stream::AudioStream;
