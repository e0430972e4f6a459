//! Router error types
//!
//! Configuration errors are reported synchronously to the control-path caller
//! and never change routing state. Device-open failures arrive wrapped as
//! [`RouterError::Audio`]. Transient I/O errors never surface here: the engine
//! worker absorbs them.

use thiserror::Error;

use crate::audio::{AudioError, DeviceId};

/// Errors returned by control operations on the router
#[derive(Error, Debug)]
pub enum RouterError {
    /// No destination is configured for this device
    #[error("Unknown destination: {0}")]
    UnknownDestination(DeviceId),

    /// The device is already a destination
    #[error("Destination already added: {0}")]
    DestinationExists(DeviceId),

    /// Destination limit reached
    #[error("Cannot route to more than {0} destinations")]
    TooManyDestinations(usize),

    /// Bus identifier other than L/R
    #[error("Invalid bus identifier: {0:?} (expected \"L\" or \"R\")")]
    InvalidBus(String),

    /// Input channel index outside the input layout
    #[error("Invalid input channel {channel} (input has {channels} channels)")]
    InvalidChannel { channel: usize, channels: usize },

    /// Gain that is not a finite number
    #[error("Invalid gain: {0}")]
    InvalidGain(f32),

    /// Latency outside what the delay line can hold
    #[error("Latency {ms}ms out of range (0..={max_ms:.1}ms)")]
    LatencyOutOfRange { ms: f32, max_ms: f32 },

    /// Device does not provide enough channels for its role
    #[error("Device {device} has {channels} channels, {required} required")]
    InsufficientChannels {
        device: String,
        channels: u16,
        required: u16,
    },

    /// start() called while a session is running
    #[error("Router is already running")]
    AlreadyRunning,

    /// The engine command queue is full; retry later
    #[error("Engine command queue is full")]
    CommandQueueFull,

    /// Device enumeration or stream open failure
    #[error(transparent)]
    Audio(#[from] AudioError),
}

/// Result type for router control operations
pub type RouterResult<T> = Result<T, RouterError>;
