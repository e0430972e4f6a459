//! Configuration types

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::audio::DeviceId;
use crate::effect::FilterBand;
use crate::types::{CHUNK_SIZE, DEFAULT_SAMPLE_RATE, MAX_CHUNK_SIZE, MAX_DESTINATIONS};

/// Smallest accepted chunk size in frames
const MIN_CHUNK_SIZE: usize = 16;

/// Top-level configuration file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    pub engine: EngineConfig,
    pub routing: RoutingPreset,
}

/// Engine tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Frames per chunk
    /// Clamped to [16, 8192] when used.
    /// Default: 512
    pub chunk_size: usize,

    /// Rate used to validate latency settings while stopped
    /// A running session always uses its input device's rate.
    /// Default: 48000
    pub fallback_sample_rate: u32,

    /// Pending control commands the engine queue can hold
    /// Default: 256
    pub command_queue_capacity: usize,

    /// Destination limit (never above 16)
    /// Default: 16
    pub max_destinations: usize,

    /// Interval between level broadcasts
    /// Default: 50ms (20 updates per second)
    pub meter_interval_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chunk_size: CHUNK_SIZE,
            fallback_sample_rate: DEFAULT_SAMPLE_RATE,
            command_queue_capacity: 256,
            max_destinations: MAX_DESTINATIONS,
            meter_interval_ms: 50,
        }
    }
}

impl EngineConfig {
    /// Chunk size in frames, clamped to the supported range
    pub fn chunk_frames(&self) -> usize {
        self.chunk_size.clamp(MIN_CHUNK_SIZE, MAX_CHUNK_SIZE)
    }

    pub fn destination_limit(&self) -> usize {
        self.max_destinations.min(MAX_DESTINATIONS)
    }

    pub fn fallback_rate(&self) -> u32 {
        if self.fallback_sample_rate == 0 {
            DEFAULT_SAMPLE_RATE
        } else {
            self.fallback_sample_rate
        }
    }

    pub fn meter_interval(&self) -> Duration {
        Duration::from_millis(self.meter_interval_ms.max(1))
    }
}

/// Saved routing: the input device and every destination
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingPreset {
    /// Input to start with, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_device: Option<DeviceId>,
    pub destinations: Vec<DestinationPreset>,
}

/// Saved configuration of one destination
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DestinationPreset {
    pub device: DeviceId,
    /// Input channel → gain on the left bus
    #[serde(default)]
    pub left: BTreeMap<usize, f32>,
    /// Input channel → gain on the right bus
    #[serde(default)]
    pub right: BTreeMap<usize, f32>,
    #[serde(default)]
    pub latency_ms: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<FilterBand>,
}

impl DestinationPreset {
    pub fn new(device: DeviceId) -> Self {
        Self {
            device,
            left: BTreeMap::new(),
            right: BTreeMap::new(),
            latency_ms: 0.0,
            filter: None,
        }
    }
}
