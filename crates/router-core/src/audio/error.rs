//! Audio backend error types

use thiserror::Error;

/// Errors that can occur during audio operations
#[derive(Error, Debug)]
pub enum AudioError {
    /// No audio devices available
    #[error("No audio devices found")]
    NoDevices,

    /// Device not found
    #[error("Audio device not found: {0}")]
    DeviceNotFound(String),

    /// Failed to get device configuration
    #[error("Failed to get device config: {0}")]
    ConfigError(String),

    /// Failed to build audio stream
    #[error("Failed to build audio stream: {0}")]
    StreamBuildError(String),

    /// Failed to start/play stream
    #[error("Failed to start audio stream: {0}")]
    StreamPlayError(String),

    /// Unsupported sample format
    #[error("Unsupported sample format: {0}")]
    UnsupportedFormat(String),

    /// The stream owner thread could not be spawned or died
    #[error("Audio stream thread failed: {0}")]
    StreamThread(String),

    /// A full chunk did not arrive within the read deadline
    #[error("Timed out waiting for input chunk")]
    Timeout,

    /// The output ring has no room for a whole chunk
    #[error("Output buffer full, chunk dropped")]
    BufferFull,

    /// The peer side of a stream is gone
    #[error("Audio stream disconnected")]
    Disconnected,
}

/// Result type for audio operations
pub type AudioResult<T> = Result<T, AudioError>;
