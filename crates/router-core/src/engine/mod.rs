//! Audio engine - mixing, latency alignment, metering and the worker loop
//!
//! - MixMatrix: sparse per-bus gain maps for one destination
//! - DelayLine: whole-chunk latency alignment with a fixed-capacity ring
//! - ProcessingEngine: the per-chunk algorithm over all destinations
//! - EngineWorker: the one real-time thread that drives the engine
//!
//! The control path talks to a running engine only through the command
//! queue and reads its state only through the atomics in [`meters`].

mod command;
mod engine;
pub mod gc;
mod latency;
pub mod meters;
mod mixer;
mod worker;

pub use command::*;
pub use engine::*;
pub use latency::*;
pub use meters::{EngineStats, InputMeters, OutputMeters, PeakMeter, StatsSnapshot};
pub use mixer::*;
pub use worker::*;
