//! Frequency shaping for destinations
//!
//! - [`BiquadFilter`]: one second-order IIR section with persistent state
//! - [`FilterChain`]: per-bus high-pass into low-pass cascade with an enable
//!   flag, applied to a destination's stereo mix

mod biquad;
mod filter_chain;

pub use biquad::{BiquadCoefficients, BiquadFilter, FilterKind, DEFAULT_Q};
pub use filter_chain::{
    FilterBand, FilterChain, HIGH_CUTOFF_MARGIN_HZ, MIN_BANDWIDTH_HZ, MIN_LOW_CUTOFF_HZ,
    NYQUIST_LOW_MARGIN_HZ,
};
