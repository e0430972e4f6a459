//! Audio I/O boundary of the router
//!
//! The engine never talks to a native audio library directly. It sees:
//! - [`InputSource`]: a blocking-read primitive returning one full chunk
//! - [`OutputSink`]: a non-blocking write of one stereo chunk per call
//! - [`AudioBackend`]: device enumeration and explicit stream open
//!
//! Closing is explicit through ownership: dropping a source or sink closes
//! its native stream.

use crate::types::{InputChunk, StereoSample};

use super::config::{DeviceId, StreamSettings};
use super::error::AudioResult;

/// Whether a device is listed as an input or an output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceDirection {
    Input,
    Output,
}

/// Information about an audio device
#[derive(Debug, Clone, PartialEq)]
pub struct AudioDevice {
    /// Device identifier for configuration (includes host info)
    pub id: DeviceId,
    /// Human-readable device name
    pub name: String,
    /// Host backend name (e.g., "ALSA", "JACK")
    pub host: String,
    /// Whether this is the system default device for its host
    pub is_default: bool,
    /// Maximum channel count in this direction
    pub channels: u16,
    /// Native sample rate (the device's default configuration)
    pub sample_rate: u32,
}

impl std::fmt::Display for AudioDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}] {} ({} ch, {} Hz{})",
            self.host,
            self.name,
            self.channels,
            self.sample_rate,
            if self.is_default { ", default" } else { "" }
        )
    }
}

/// Source of input chunks
pub trait InputSource: Send {
    /// Fill `chunk` with the next whole chunk of interleaved input
    ///
    /// Waits at most one chunk period. On `Err` nothing was consumed and the
    /// contents of `chunk` are unspecified. Device overruns are never
    /// reported as errors.
    fn read_chunk(&mut self, chunk: &mut InputChunk) -> AudioResult<()>;
}

/// Sink for one destination's stereo output
pub trait OutputSink: Send {
    /// Queue one chunk of stereo frames without blocking
    ///
    /// Returns `Err(AudioError::BufferFull)` when the device is behind; the
    /// chunk is then dropped by the caller.
    fn write_chunk(&mut self, frames: &[StereoSample]) -> AudioResult<()>;
}

/// A native audio library as seen by the router
pub trait AudioBackend: Send + Sync {
    /// Every device that can capture audio, with its maximum channel count
    fn input_devices(&self) -> AudioResult<Vec<AudioDevice>>;

    /// Every device that can play audio, with its maximum channel count
    fn output_devices(&self) -> AudioResult<Vec<AudioDevice>>;

    /// Open and start an input stream
    fn open_input(
        &self,
        id: &DeviceId,
        settings: &StreamSettings,
    ) -> AudioResult<Box<dyn InputSource>>;

    /// Open and start an output stream
    fn open_output(
        &self,
        id: &DeviceId,
        settings: &StreamSettings,
    ) -> AudioResult<Box<dyn OutputSink>>;

    /// Look up one device by id
    ///
    /// An id without a host matches the first device with that name.
    fn find_device(&self, id: &DeviceId, direction: DeviceDirection) -> AudioResult<AudioDevice> {
        let devices = match direction {
            DeviceDirection::Input => self.input_devices()?,
            DeviceDirection::Output => self.output_devices()?,
        };
        devices
            .into_iter()
            .find(|d| d.id == *id || (id.host.is_none() && d.id.name == id.name))
            .ok_or_else(|| super::AudioError::DeviceNotFound(id.to_string()))
    }
}
