//! Sums every attached source into the device output buffer

use std::sync::{Arc, Mutex, TryLockError};

use super::source::QueuedSource;

/// Set of sources rendered by one output callback
#[derive(Default)]
pub struct Mixer {
    sources: Mutex<Vec<Arc<QueuedSource>>>,
}

impl Mixer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, source: Arc<QueuedSource>) {
        let mut sources = self.sources.lock().unwrap_or_else(|e| e.into_inner());
        sources.push(source);
    }

    /// Remove a source from the render path
    ///
    /// Once this returns the callback no longer touches the source's buffers.
    /// Matches by address, so a stream's `Arc<dyn PlaybackSource>` works too.
    pub fn detach<T: ?Sized>(&self, source: &Arc<T>) -> bool {
        let mut sources = self.sources.lock().unwrap_or_else(|e| e.into_inner());
        let before = sources.len();
        sources.retain(|s| !std::ptr::addr_eq(Arc::as_ptr(s), Arc::as_ptr(source)));
        sources.len() != before
    }

    pub fn clear(&self) {
        self.sources
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    pub fn source_count(&self) -> usize {
        self.sources.lock().map(|s| s.len()).unwrap_or(0)
    }

    /// Render one device period into `out`
    ///
    /// `out` is interleaved with `channels` per frame at `sample_rate`.
    /// It is overwritten, not accumulated into.
    pub fn render(&self, out: &mut [f32], channels: usize, sample_rate: u32) {
        out.fill(0.0);

        // Never block the device thread behind a stream being freed
        let sources = match self.sources.try_lock() {
            Ok(sources) => sources,
            Err(TryLockError::Poisoned(e)) => e.into_inner(),
            Err(TryLockError::WouldBlock) => return,
        };
        for source in sources.iter() {
            source.render(out, channels, sample_rate);
        }
        drop(sources);

        for sample in out.iter_mut() {
            *sample = sample.clamp(-1.0, 1.0);
        }
    }
}
