//! Mix matrix - routes the 6 input channels onto a destination's two buses
//!
//! Each bus is a sparse map from input channel to gain. Only positive gains
//! are stored: writing a gain of zero or less removes the entry. The matrix
//! is a small `Copy` value so a whole matrix can be swapped into the engine
//! in one command.

use std::collections::BTreeMap;

use crate::error::{RouterError, RouterResult};
use crate::types::{Bus, InputChunk, StereoBuffer, StereoSample, INPUT_CHANNELS, OUTPUT_CHANNELS};

/// Per-destination gain maps, one per bus
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MixMatrix {
    gains: [[Option<f32>; INPUT_CHANNELS]; OUTPUT_CHANNELS],
}

impl MixMatrix {
    /// Create an empty matrix (every bus silent)
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a matrix from per-bus channel→gain maps
    pub fn from_maps(
        left: &BTreeMap<usize, f32>,
        right: &BTreeMap<usize, f32>,
    ) -> RouterResult<Self> {
        let mut matrix = Self::new();
        for (bus, map) in [(Bus::Left, left), (Bus::Right, right)] {
            for (&channel, &gain) in map {
                matrix.set_gain(channel, bus, gain)?;
            }
        }
        Ok(matrix)
    }

    /// Insert, overwrite or (for `gain <= 0`) remove one entry
    pub fn set_gain(&mut self, channel: usize, bus: Bus, gain: f32) -> RouterResult<()> {
        if channel >= INPUT_CHANNELS {
            return Err(RouterError::InvalidChannel {
                channel,
                channels: INPUT_CHANNELS,
            });
        }
        if !gain.is_finite() {
            return Err(RouterError::InvalidGain(gain));
        }
        self.gains[bus.index()][channel] = (gain > 0.0).then_some(gain);
        Ok(())
    }

    /// Gain of one entry, `None` when the channel is not routed to the bus
    pub fn gain(&self, channel: usize, bus: Bus) -> Option<f32> {
        self.gains[bus.index()].get(channel).copied().flatten()
    }

    /// Empty both buses
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn is_empty(&self) -> bool {
        self.gains.iter().flatten().all(Option::is_none)
    }

    /// Routed channels of one bus in channel order
    pub fn entries(&self, bus: Bus) -> impl Iterator<Item = (usize, f32)> + '_ {
        self.gains[bus.index()]
            .iter()
            .enumerate()
            .filter_map(|(channel, gain)| gain.map(|g| (channel, g)))
    }

    /// One bus as a channel→gain map
    pub fn gains(&self, bus: Bus) -> BTreeMap<usize, f32> {
        self.entries(bus).collect()
    }

    /// Mix one input chunk into `out`
    ///
    /// `out` must have been allocated for at least `input.frames()` frames.
    /// Nothing is clipped: summed gains above unity may leave [-1, 1].
    pub fn mix(&self, input: &InputChunk, out: &mut StereoBuffer) {
        out.set_len_from_capacity(input.frames());
        let [left, right] = &self.gains;
        for (frame, sample) in input.frames_iter().zip(out.iter_mut()) {
            *sample = StereoSample::new(sum_bus(left, frame), sum_bus(right, frame));
        }
    }
}

#[inline]
fn sum_bus(gains: &[Option<f32>; INPUT_CHANNELS], frame: &[f32]) -> f32 {
    gains
        .iter()
        .zip(frame)
        .filter_map(|(gain, &x)| gain.map(|g| g * x))
        .sum()
}
