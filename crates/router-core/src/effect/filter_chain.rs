//! Band-limiting stage of a destination
//!
//! Each bus runs its own high-pass section into its own low-pass section.
//! The buses share coefficients but never state.

use serde::{Deserialize, Serialize};

use crate::types::{StereoBuffer, OUTPUT_CHANNELS};

use super::biquad::{BiquadFilter, FilterKind, DEFAULT_Q};

/// Lowest accepted high-pass cutoff
pub const MIN_LOW_CUTOFF_HZ: f32 = 20.0;
/// Distance the high-pass cutoff keeps from Nyquist
pub const NYQUIST_LOW_MARGIN_HZ: f32 = 100.0;
/// Minimum distance between the two cutoffs
pub const MIN_BANDWIDTH_HZ: f32 = 100.0;
/// Distance the low-pass cutoff keeps from Nyquist
pub const HIGH_CUTOFF_MARGIN_HZ: f32 = 10.0;

/// Pass band of a destination: high-pass at `low_hz`, low-pass at `high_hz`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilterBand {
    pub low_hz: f32,
    pub high_hz: f32,
}

impl FilterBand {
    pub fn new(low_hz: f32, high_hz: f32) -> Self {
        Self { low_hz, high_hz }
    }

    /// Clamp the band into what the sections can realise at `sample_rate`
    ///
    /// low is kept in [20, nyquist - 100] and high in [low + 100,
    /// nyquist - 10]. The Nyquist bound wins when the ranges cross and NaN
    /// falls back to the lower bound.
    pub fn clamped(self, sample_rate: u32) -> Self {
        let nyquist = sample_rate as f32 / 2.0;
        let low_hz = self
            .low_hz
            .max(MIN_LOW_CUTOFF_HZ)
            .min(nyquist - NYQUIST_LOW_MARGIN_HZ);
        let high_hz = self
            .high_hz
            .max(low_hz + MIN_BANDWIDTH_HZ)
            .min(nyquist - HIGH_CUTOFF_MARGIN_HZ);
        Self { low_hz, high_hz }
    }
}

/// High-pass into low-pass cascade per bus
#[derive(Debug, Clone)]
pub struct FilterChain {
    /// `[high-pass, low-pass]` for each bus
    stages: [[BiquadFilter; 2]; OUTPUT_CHANNELS],
    band: Option<FilterBand>,
}

impl FilterChain {
    /// Create a disabled chain
    pub fn new() -> Self {
        Self {
            stages: [[BiquadFilter::new(); 2]; OUTPUT_CHANNELS],
            band: None,
        }
    }

    /// Configure both sections of both buses and enable the chain
    ///
    /// State is reset even when the band is unchanged. Returns the band
    /// actually applied after clamping.
    pub fn set_band(&mut self, low_hz: f32, high_hz: f32, sample_rate: u32) -> FilterBand {
        let band = FilterBand::new(low_hz, high_hz).clamped(sample_rate);
        for [high_pass, low_pass] in self.stages.iter_mut() {
            high_pass.configure(FilterKind::HighPass, band.low_hz, sample_rate, DEFAULT_Q);
            low_pass.configure(FilterKind::LowPass, band.high_hz, sample_rate, DEFAULT_Q);
            high_pass.reset();
            low_pass.reset();
        }
        self.band = Some(band);
        band
    }

    /// Turn the chain into the identity
    pub fn disable(&mut self) {
        self.band = None;
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.band.is_some()
    }

    /// Clamped band in use, `None` while disabled
    pub fn band(&self) -> Option<FilterBand> {
        self.band
    }

    /// Filter a stereo buffer in place (no-op while disabled)
    pub fn process(&mut self, buffer: &mut StereoBuffer) {
        if !self.is_enabled() {
            return;
        }
        let [left, right] = &mut self.stages;
        for frame in buffer.iter_mut() {
            frame.left = cascade(left, frame.left);
            frame.right = cascade(right, frame.right);
        }
    }
}

impl Default for FilterChain {
    fn default() -> Self {
        Self::new()
    }
}

#[inline]
fn cascade(stages: &mut [BiquadFilter; 2], x: f32) -> f32 {
    let [high_pass, low_pass] = stages;
    low_pass.process_sample(high_pass.process_sample(x))
}
