//! Common types for the router
//!
//! Fundamental audio types shared by the engine and the audio backends:
//! sample and frame types, the 6-channel input chunk and the stereo
//! output buffer, and the bus identifier used by the mixing matrix.

use std::fmt;
use std::ops::{Index, IndexMut};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RouterError;

/// Default sample rate (48kHz), used when no device rate is known yet
pub const DEFAULT_SAMPLE_RATE: u32 = 48000;

/// Frames per processing chunk
/// 512 frames @ 48kHz = ~10.7ms chunk period
pub const CHUNK_SIZE: usize = 512;

/// Largest chunk size buffers are ever sized for
pub const MAX_CHUNK_SIZE: usize = 8192;

/// Required channel count of the input (5.1 layout)
pub const INPUT_CHANNELS: usize = 6;

/// Channel count of every destination (stereo)
pub const OUTPUT_CHANNELS: usize = 2;

/// Upper bound on simultaneously routed destinations
/// The engine reserves this many slots up front so adding never allocates.
pub const MAX_DESTINATIONS: usize = 16;

/// Audio sample type (32-bit float, nominal range [-1.0, 1.0])
pub type Sample = f32;

/// Output mix bus of a destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Bus {
    #[serde(rename = "L")]
    Left,
    #[serde(rename = "R")]
    Right,
}

impl Bus {
    /// Index of this bus in an interleaved stereo frame
    #[inline]
    pub fn index(self) -> usize {
        match self {
            Bus::Left => 0,
            Bus::Right => 1,
        }
    }

    /// Short label used by control surfaces ("L" / "R")
    pub fn label(self) -> &'static str {
        match self {
            Bus::Left => "L",
            Bus::Right => "R",
        }
    }
}

impl fmt::Display for Bus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Bus {
    type Err = RouterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "L" | "l" | "left" | "Left" => Ok(Bus::Left),
            "R" | "r" | "right" | "Right" => Ok(Bus::Right),
            other => Err(RouterError::InvalidBus(other.to_string())),
        }
    }
}

/// A single stereo sample (left and right channels)
///
/// `#[repr(C)]` guarantees the [left, right] layout so a `&[StereoSample]`
/// can be viewed as interleaved `&[f32]` through bytemuck.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct StereoSample {
    pub left: Sample,
    pub right: Sample,
}

impl StereoSample {
    #[inline]
    pub fn new(left: Sample, right: Sample) -> Self {
        Self { left, right }
    }

    #[inline]
    pub fn silence() -> Self {
        Self::default()
    }

    /// Sample value on the given bus
    #[inline]
    pub fn bus(&self, bus: Bus) -> Sample {
        match bus {
            Bus::Left => self.left,
            Bus::Right => self.right,
        }
    }
}

/// A buffer of stereo samples
///
/// The engine allocates these once per destination at the chunk size and
/// only ever changes their length within capacity on the real-time path.
#[derive(Debug, Clone, Default)]
pub struct StereoBuffer {
    samples: Vec<StereoSample>,
}

impl StereoBuffer {
    /// Create a buffer filled with silence
    pub fn silence(len: usize) -> Self {
        Self {
            samples: vec![StereoSample::silence(); len],
        }
    }

    /// Create a buffer from interleaved samples [L, R, L, R, ...]
    pub fn from_interleaved(interleaved: &[Sample]) -> Self {
        assert!(interleaved.len() % 2 == 0, "Interleaved buffer must have even length");
        let samples = interleaved
            .chunks_exact(2)
            .map(|frame| StereoSample::new(frame[0], frame[1]))
            .collect();
        Self { samples }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Set the working length of a pre-allocated buffer (real-time safe)
    ///
    /// Must stay within the capacity reserved at construction.
    #[inline]
    pub fn set_len_from_capacity(&mut self, new_len: usize) {
        if new_len > self.samples.len() {
            debug_assert!(
                new_len <= self.samples.capacity(),
                "set_len_from_capacity called with len > capacity"
            );
            self.samples.resize(new_len, StereoSample::silence());
        } else {
            self.samples.truncate(new_len);
        }
    }

    #[inline]
    pub fn as_slice(&self) -> &[StereoSample] {
        &self.samples
    }

    /// Zero-copy view as interleaved f32 [L, R, L, R, ...]
    #[inline]
    pub fn as_interleaved(&self) -> &[Sample] {
        bytemuck::cast_slice(&self.samples)
    }

    /// Zero-copy mutable view as interleaved f32 [L, R, L, R, ...]
    #[inline]
    pub fn as_interleaved_mut(&mut self) -> &mut [Sample] {
        bytemuck::cast_slice_mut(&mut self.samples)
    }

    pub fn iter(&self) -> impl Iterator<Item = &StereoSample> {
        self.samples.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut StereoSample> {
        self.samples.iter_mut()
    }

    /// Peak level of one bus: max(|sample|) over the buffer
    pub fn peak(&self, bus: Bus) -> Sample {
        peak_level(self.samples.iter().map(|s| s.bus(bus)))
    }
}

impl Index<usize> for StereoBuffer {
    type Output = StereoSample;

    #[inline]
    fn index(&self, index: usize) -> &Self::Output {
        &self.samples[index]
    }
}

impl IndexMut<usize> for StereoBuffer {
    #[inline]
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.samples[index]
    }
}

/// One chunk of 6-channel interleaved input audio
///
/// Layout is frame-major: `[f0c0, f0c1, .. f0c5, f1c0, ..]`, the same order
/// the device delivers samples in.
#[derive(Debug, Clone)]
pub struct InputChunk {
    samples: Vec<Sample>,
}

impl InputChunk {
    /// Create a chunk of `frames` silent frames
    pub fn silence(frames: usize) -> Self {
        Self {
            samples: vec![0.0; frames * INPUT_CHANNELS],
        }
    }

    /// Build a chunk by evaluating `f(frame, channel)` for every sample
    pub fn from_fn(frames: usize, mut f: impl FnMut(usize, usize) -> Sample) -> Self {
        let mut samples = Vec::with_capacity(frames * INPUT_CHANNELS);
        for frame in 0..frames {
            for channel in 0..INPUT_CHANNELS {
                samples.push(f(frame, channel));
            }
        }
        Self { samples }
    }

    /// Number of frames in the chunk
    #[inline]
    pub fn frames(&self) -> usize {
        self.samples.len() / INPUT_CHANNELS
    }

    /// All channels of one frame
    #[inline]
    pub fn frame(&self, index: usize) -> &[Sample] {
        let start = index * INPUT_CHANNELS;
        &self.samples[start..start + INPUT_CHANNELS]
    }

    /// Iterate frames as 6-sample slices
    #[inline]
    pub fn frames_iter(&self) -> impl Iterator<Item = &[Sample]> {
        self.samples.chunks_exact(INPUT_CHANNELS)
    }

    /// Iterate one channel's samples
    pub fn channel(&self, channel: usize) -> impl Iterator<Item = Sample> + '_ {
        self.samples
            .iter()
            .skip(channel)
            .step_by(INPUT_CHANNELS)
            .copied()
    }

    #[inline]
    pub fn as_interleaved(&self) -> &[Sample] {
        &self.samples
    }

    #[inline]
    pub fn as_interleaved_mut(&mut self) -> &mut [Sample] {
        &mut self.samples
    }

    /// Peak level of every input channel
    pub fn peaks(&self) -> [Sample; INPUT_CHANNELS] {
        let mut peaks: [Sample; INPUT_CHANNELS] = [0.0; INPUT_CHANNELS];
        for frame in self.frames_iter() {
            for (peak, sample) in peaks.iter_mut().zip(frame) {
                *peak = peak.max(sample.abs());
            }
        }
        peaks
    }
}

/// Maximum absolute sample value, 0.0 for an empty iterator
#[inline]
pub fn peak_level(samples: impl Iterator<Item = Sample>) -> Sample {
    samples.fold(0.0, |peak, s| peak.max(s.abs()))
}
