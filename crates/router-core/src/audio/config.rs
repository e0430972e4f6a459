//! Audio stream configuration
//!
//! Device identifiers and the parameters every stream is opened with.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::{CHUNK_SIZE, DEFAULT_SAMPLE_RATE, INPUT_CHANNELS, OUTPUT_CHANNELS};

/// Number of chunks the input ring can hold before the callback drops samples
pub const INPUT_RING_CHUNKS: usize = 8;

/// Number of chunks queued towards an output device before writes are refused
/// 4x the chunk size absorbs timing jitter between the worker and the device
pub const OUTPUT_RING_CHUNKS: usize = 4;

/// Audio device identifier
///
/// Includes both the device name and the host backend (JACK, ALSA, etc.)
/// so devices exposed by several hosts can be told apart.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceId {
    /// Device name as reported by the system
    pub name: String,
    /// Audio host identifier (e.g., "JACK", "ALSA", "CoreAudio")
    /// If None, every host is searched by name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

impl DeviceId {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host: None,
        }
    }

    pub fn with_host(name: &str, host: &str) -> Self {
        Self {
            name: name.to_string(),
            host: Some(host.to_string()),
        }
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.host {
            Some(host) => write!(f, "[{}] {}", host, self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// Parameters a stream is opened with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSettings {
    /// Sample rate in Hz (all streams of a session share the input's rate)
    pub sample_rate: u32,
    /// Frames per chunk
    pub chunk_frames: usize,
    /// Channels delivered to / accepted from the engine
    pub channels: usize,
}

impl StreamSettings {
    /// Settings for the 6-channel input stream
    pub fn input(sample_rate: u32, chunk_frames: usize) -> Self {
        Self {
            sample_rate,
            chunk_frames,
            channels: INPUT_CHANNELS,
        }
    }

    /// Settings for a stereo destination stream
    pub fn output(sample_rate: u32, chunk_frames: usize) -> Self {
        Self {
            sample_rate,
            chunk_frames,
            channels: OUTPUT_CHANNELS,
        }
    }

    /// Interleaved samples in one chunk
    #[inline]
    pub fn chunk_samples(&self) -> usize {
        self.chunk_frames * self.channels
    }

    /// Wall-clock duration of one chunk (the per-chunk deadline)
    pub fn chunk_period(&self) -> Duration {
        chunk_period(self.chunk_frames, self.sample_rate)
    }
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self::output(DEFAULT_SAMPLE_RATE, CHUNK_SIZE)
    }
}

/// Duration of `frames` frames at `sample_rate`
pub fn chunk_period(frames: usize, sample_rate: u32) -> Duration {
    Duration::from_secs_f64(frames as f64 / sample_rate.max(1) as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_id_display() {
        assert_eq!(DeviceId::with_host("hw:0,0", "ALSA").to_string(), "[ALSA] hw:0,0");
        assert_eq!(DeviceId::new("Speakers").to_string(), "Speakers");
    }

    #[test]
    fn test_chunk_period() {
        let settings = StreamSettings::input(48000, 480);
        assert_eq!(settings.chunk_period(), Duration::from_millis(10));
        assert_eq!(settings.chunk_samples(), 480 * INPUT_CHANNELS);
    }
}
