//! Stream lifecycle states

use std::fmt;

/// Lifecycle of an [`super::AudioStream`]
///
/// `Starting -> Ready -> Paused <-> Playing -> Stopped`, with `Dead`
/// reachable from anywhere and never left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamState {
    Starting,
    Ready,
    Playing,
    Paused,
    Stopped,
    Dead,
}

impl StreamState {
    /// Whether the stream can still produce sound
    pub fn is_alive(self) -> bool {
        self != StreamState::Dead
    }

    /// Whether `self -> next` is a legal transition
    pub fn can_transition_to(self, next: StreamState) -> bool {
        use StreamState::*;
        match (self, next) {
            (Dead, _) => false,
            (_, Dead) => true,
            (Starting, Ready) => true,
            (Ready, Paused) => true,
            (Paused, Playing) | (Playing, Paused) => true,
            (Paused, Stopped) | (Playing, Stopped) | (Stopped, Stopped) => true,
            (Stopped, Playing) => true,
            (a, b) => a == b,
        }
    }
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StreamState::Starting => "starting",
            StreamState::Ready => "ready",
            StreamState::Playing => "playing",
            StreamState::Paused => "paused",
            StreamState::Stopped => "stopped",
            StreamState::Dead => "dead",
        };
        f.write_str(name)
    }
}
