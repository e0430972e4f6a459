//! Lock-free metering shared between the engine worker and the control path
//!
//! The worker is the only writer. Readers on any thread see the most recent
//! chunk's peaks without locking. All operations use `Ordering::Relaxed`
//! since only visibility is needed, not synchronization with other memory.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use serde::Serialize;

use crate::types::{Sample, INPUT_CHANNELS, OUTPUT_CHANNELS};

/// One peak level stored as `f32` bits
#[derive(Debug, Default)]
pub struct PeakMeter(AtomicU32);

impl PeakMeter {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn store(&self, level: Sample) {
        self.0.store(level.to_bits(), Ordering::Relaxed);
    }

    #[inline]
    pub fn load(&self) -> Sample {
        Sample::from_bits(self.0.load(Ordering::Relaxed))
    }

    pub fn reset(&self) {
        self.store(0.0);
    }
}

/// Peak levels of the six input channels
#[derive(Debug, Default)]
pub struct InputMeters {
    channels: [PeakMeter; INPUT_CHANNELS],
}

impl InputMeters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish one chunk's peaks (worker only)
    #[inline]
    pub fn publish(&self, peaks: &[Sample; INPUT_CHANNELS]) {
        for (meter, &peak) in self.channels.iter().zip(peaks) {
            meter.store(peak);
        }
    }

    pub fn levels(&self) -> [Sample; INPUT_CHANNELS] {
        std::array::from_fn(|channel| self.channels[channel].load())
    }

    pub fn reset(&self) {
        self.channels.iter().for_each(PeakMeter::reset);
    }
}

/// Peak levels of one destination's two buses
#[derive(Debug, Default)]
pub struct OutputMeters {
    buses: [PeakMeter; OUTPUT_CHANNELS],
}

impl OutputMeters {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn publish(&self, left: Sample, right: Sample) {
        self.buses[0].store(left);
        self.buses[1].store(right);
    }

    /// `[left, right]`
    pub fn levels(&self) -> [Sample; OUTPUT_CHANNELS] {
        [self.buses[0].load(), self.buses[1].load()]
    }

    pub fn reset(&self) {
        self.buses.iter().for_each(PeakMeter::reset);
    }
}

/// Counters the worker keeps instead of logging from the chunk loop
#[derive(Debug, Default)]
pub struct EngineStats {
    chunks_processed: AtomicU64,
    input_dropouts: AtomicU64,
    output_drops: AtomicU64,
    panics_caught: AtomicU64,
}

impl EngineStats {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record_chunk(&self) {
        self.chunks_processed.fetch_add(1, Ordering::Relaxed);
    }

    /// An input read failed and the chunk was skipped
    #[inline]
    pub fn record_input_dropout(&self) {
        self.input_dropouts.fetch_add(1, Ordering::Relaxed);
    }

    /// A destination refused or failed a write
    #[inline]
    pub fn record_output_drop(&self) {
        self.output_drops.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_panic(&self) {
        self.panics_caught.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            chunks_processed: self.chunks_processed.load(Ordering::Relaxed),
            input_dropouts: self.input_dropouts.load(Ordering::Relaxed),
            output_drops: self.output_drops.load(Ordering::Relaxed),
            panics_caught: self.panics_caught.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        self.chunks_processed.store(0, Ordering::Relaxed);
        self.input_dropouts.store(0, Ordering::Relaxed);
        self.output_drops.store(0, Ordering::Relaxed);
        self.panics_caught.store(0, Ordering::Relaxed);
    }
}

/// Point-in-time copy of [`EngineStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub chunks_processed: u64,
    pub input_dropouts: u64,
    pub output_drops: u64,
    pub panics_caught: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peak_meter_roundtrips_exact_bits() {
        let meter = PeakMeter::new();
        assert_eq!(meter.load(), 0.0);
        meter.store(0.123_456_79);
        assert_eq!(meter.load(), 0.123_456_79);
        meter.reset();
        assert_eq!(meter.load(), 0.0);
    }

    #[test]
    fn test_input_meters_publish_and_reset() {
        let meters = InputMeters::new();
        meters.publish(&[0.1, 0.2, 0.3, 0.4, 0.5, 1.5]);
        assert_eq!(meters.levels(), [0.1, 0.2, 0.3, 0.4, 0.5, 1.5]);
        meters.reset();
        assert_eq!(meters.levels(), [0.0; INPUT_CHANNELS]);
    }

    #[test]
    fn test_stats_snapshot() {
        let stats = EngineStats::new();
        stats.record_chunk();
        stats.record_chunk();
        stats.record_output_drop();
        stats.record_panic();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.chunks_processed, 2);
        assert_eq!(snapshot.input_dropouts, 0);
        assert_eq!(snapshot.output_drops, 1);
        assert_eq!(snapshot.panics_caught, 1);

        stats.reset();
        assert_eq!(stats.snapshot(), StatsSnapshot::default());
    }
}
