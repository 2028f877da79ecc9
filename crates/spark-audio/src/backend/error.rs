//! Audio backend error types

use thiserror::Error;

/// Errors raised while opening or driving an output device
#[derive(Error, Debug)]
pub enum BackendError {
    /// The host has no default device of the requested kind
    #[error("No default audio device: {0}")]
    NoDefaultDevice(String),

    /// Device not found
    #[error("Audio device not found: {0}")]
    DeviceNotFound(String),

    /// Failed to get device configuration
    #[error("Failed to get device config: {0}")]
    ConfigError(String),

    /// Failed to build the output stream
    #[error("Failed to build audio stream: {0}")]
    StreamBuildError(String),

    /// Failed to start the output stream
    #[error("Failed to start audio stream: {0}")]
    StreamPlayError(String),

    /// Sound server client failure (JACK)
    #[error("Audio server client error: {0}")]
    ClientError(String),

    /// The device thread is gone or could not be started
    #[error("Device thread unavailable: {0}")]
    DeviceThread(String),
}

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;
