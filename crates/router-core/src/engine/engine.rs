//! Processing engine - the per-chunk algorithm
//!
//! Owned exclusively by the engine worker. For every input chunk it
//! publishes input peaks, then runs each destination through
//! mix → filter → delay → meter → write.
//!
//! The destination list only changes in [`ProcessingEngine::apply_command`],
//! which the worker calls between chunks, so every chunk sees one
//! consistent list and one consistent configuration per destination.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use basedrop::Owned;

use crate::audio::{AudioResult, OutputSink};
use crate::effect::{FilterBand, FilterChain};
use crate::types::{Bus, InputChunk, StereoBuffer, MAX_DESTINATIONS};

use super::command::{DestinationKey, EngineCommand};
use super::latency::DelayLine;
use super::meters::{EngineStats, InputMeters, OutputMeters};
use super::mixer::MixMatrix;

/// Everything the engine needs to produce one destination's output
pub struct DestinationSlot {
    key: DestinationKey,
    mix: MixMatrix,
    filter: FilterChain,
    delay: DelayLine,
    meters: Arc<OutputMeters>,
    sink: Option<Box<dyn OutputSink>>,
    buffer: StereoBuffer,
    sample_rate: u32,
}

impl DestinationSlot {
    /// Build a slot with an empty mix, latency 0 and the filter disabled
    ///
    /// Allocates the delay ring and the chunk buffer; call off the
    /// real-time thread.
    pub fn new(
        key: DestinationKey,
        sink: Box<dyn OutputSink>,
        meters: Arc<OutputMeters>,
        sample_rate: u32,
        chunk_frames: usize,
    ) -> Self {
        Self {
            key,
            mix: MixMatrix::new(),
            filter: FilterChain::new(),
            delay: DelayLine::new(sample_rate, chunk_frames),
            meters,
            sink: Some(sink),
            buffer: StereoBuffer::silence(chunk_frames),
            sample_rate,
        }
    }

    #[inline]
    pub fn key(&self) -> DestinationKey {
        self.key
    }

    pub fn set_mix(&mut self, matrix: MixMatrix) {
        self.mix = matrix;
    }

    /// Returns the latency in samples actually applied
    pub fn set_latency(&mut self, latency_ms: f32) -> usize {
        self.delay.set_latency(latency_ms, self.sample_rate)
    }

    /// Enable the filter with `band`, or disable it
    pub fn set_filter(&mut self, band: Option<FilterBand>) {
        match band {
            Some(band) => {
                self.filter.set_band(band.low_hz, band.high_hz, self.sample_rate);
            }
            None => self.filter.disable(),
        }
    }

    /// Close the output stream now instead of when the slot is collected
    pub fn close(&mut self) {
        self.sink.take();
    }

    /// Produce and emit this destination's chunk
    fn process(&mut self, input: &InputChunk) -> AudioResult<()> {
        self.mix.mix(input, &mut self.buffer);
        self.filter.process(&mut self.buffer);
        self.delay.push_and_pull(&mut self.buffer);
        self.meters
            .publish(self.buffer.peak(Bus::Left), self.buffer.peak(Bus::Right));

        match self.sink.as_mut() {
            Some(sink) => sink.write_chunk(self.buffer.as_slice()),
            None => Ok(()),
        }
    }
}

/// The real-time processing engine
pub struct ProcessingEngine {
    sample_rate: u32,
    chunk_frames: usize,
    /// Reserved for `MAX_DESTINATIONS` so adding never reallocates
    destinations: Vec<Owned<DestinationSlot>>,
    input_meters: Arc<InputMeters>,
    stats: Arc<EngineStats>,
}

impl ProcessingEngine {
    pub fn new(
        sample_rate: u32,
        chunk_frames: usize,
        input_meters: Arc<InputMeters>,
        stats: Arc<EngineStats>,
    ) -> Self {
        Self {
            sample_rate,
            chunk_frames,
            destinations: Vec::with_capacity(MAX_DESTINATIONS),
            input_meters,
            stats,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn chunk_frames(&self) -> usize {
        self.chunk_frames
    }

    pub fn destination_count(&self) -> usize {
        self.destinations.len()
    }

    pub fn stats(&self) -> &Arc<EngineStats> {
        &self.stats
    }

    /// Add a destination before the worker starts
    pub fn add_destination(&mut self, slot: Owned<DestinationSlot>) {
        debug_assert!(
            self.destinations.len() < MAX_DESTINATIONS,
            "destination limit is enforced by the router"
        );
        self.destinations.push(slot);
    }

    fn slot_mut(&mut self, key: DestinationKey) -> Option<&mut DestinationSlot> {
        self.destinations
            .iter_mut()
            .find(|slot| slot.key() == key)
            .map(|slot| &mut **slot)
    }

    /// Apply one command (worker only, between chunks)
    ///
    /// Commands for unknown keys are ignored: the destination was removed
    /// before the command arrived.
    pub fn apply_command(&mut self, cmd: EngineCommand) {
        match cmd {
            EngineCommand::AddDestination { slot } => self.add_destination(slot),
            EngineCommand::RemoveDestination { key } => {
                if let Some(index) = self.destinations.iter().position(|s| s.key() == key) {
                    // Dropping an Owned only queues it for the collector thread
                    drop(self.destinations.remove(index));
                }
            }
            EngineCommand::SetMix { key, matrix } => {
                if let Some(slot) = self.slot_mut(key) {
                    slot.set_mix(matrix);
                }
            }
            EngineCommand::SetLatency { key, latency_ms } => {
                if let Some(slot) = self.slot_mut(key) {
                    slot.set_latency(latency_ms);
                }
            }
            EngineCommand::SetFilter { key, band } => {
                if let Some(slot) = self.slot_mut(key) {
                    slot.set_filter(band);
                }
            }
        }
    }

    /// Drain every pending command
    pub fn process_commands(&mut self, commands: &mut rtrb::Consumer<EngineCommand>) {
        while let Ok(cmd) = commands.pop() {
            self.apply_command(cmd);
        }
    }

    /// Run one input chunk through every destination
    ///
    /// Each destination is its own error boundary: a failed write or a panic
    /// in one destination is counted and the remaining destinations still
    /// get their chunk.
    pub fn process_chunk(&mut self, input: &InputChunk) {
        self.input_meters.publish(&input.peaks());

        for slot in self.destinations.iter_mut() {
            let slot: &mut DestinationSlot = slot;
            match panic::catch_unwind(AssertUnwindSafe(|| slot.process(input))) {
                Ok(Ok(())) => {}
                Ok(Err(_)) => self.stats.record_output_drop(),
                Err(_) => self.stats.record_panic(),
            }
        }

        self.stats.record_chunk();
    }

    /// Close every destination's output stream
    ///
    /// Called by the worker once its loop has exited.
    pub fn close_outputs(&mut self) {
        for slot in self.destinations.iter_mut() {
            slot.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioError;
    use crate::engine::command::command_channel;
    use crate::engine::gc::gc_handle;
    use crate::types::StereoSample;
    use crossbeam::channel::{unbounded, Receiver, Sender};

    const SR: u32 = 48000;
    const N: usize = 32;

    struct ChannelSink(Sender<Vec<StereoSample>>);

    impl OutputSink for ChannelSink {
        fn write_chunk(&mut self, frames: &[StereoSample]) -> AudioResult<()> {
            let _ = self.0.send(frames.to_vec());
            Ok(())
        }
    }

    struct FullSink;

    impl OutputSink for FullSink {
        fn write_chunk(&mut self, _frames: &[StereoSample]) -> AudioResult<()> {
            Err(AudioError::BufferFull)
        }
    }

    struct PanickingSink;

    impl OutputSink for PanickingSink {
        fn write_chunk(&mut self, _frames: &[StereoSample]) -> AudioResult<()> {
            panic!("sink failure");
        }
    }

    fn engine() -> ProcessingEngine {
        ProcessingEngine::new(
            SR,
            N,
            Arc::new(InputMeters::new()),
            Arc::new(EngineStats::new()),
        )
    }

    fn slot(key: u64, sink: Box<dyn OutputSink>) -> (Owned<DestinationSlot>, Arc<OutputMeters>) {
        let meters = Arc::new(OutputMeters::new());
        let mut slot = DestinationSlot::new(DestinationKey(key), sink, meters.clone(), SR, N);
        let mut mix = MixMatrix::new();
        mix.set_gain(0, Bus::Left, 1.0).unwrap();
        mix.set_gain(1, Bus::Right, 1.0).unwrap();
        slot.set_mix(mix);
        (Owned::new(&gc_handle(), slot), meters)
    }

    fn channel_slot(key: u64) -> (Owned<DestinationSlot>, Receiver<Vec<StereoSample>>) {
        let (tx, rx) = unbounded();
        let (slot, _) = slot(key, Box::new(ChannelSink(tx)));
        (slot, rx)
    }

    fn ramp_input() -> InputChunk {
        InputChunk::from_fn(N, |frame, channel| {
            (frame as f32 / N as f32) * if channel % 2 == 0 { 1.0 } else { -0.5 }
        })
    }

    /// Constant `level` on channel 0, silence elsewhere
    fn dc_input(level: f32) -> InputChunk {
        InputChunk::from_fn(N, |_, channel| if channel == 0 { level } else { 0.0 })
    }

    #[test]
    fn test_filter_removes_dc_and_restarts_on_reconfigure() {
        let mut engine = engine();
        let (slot, rx) = channel_slot(1);
        engine.add_destination(slot);
        let set_band = |band| EngineCommand::SetFilter {
            key: DestinationKey(1),
            band,
        };
        let band = Some(FilterBand::new(100.0, 8000.0));
        engine.apply_command(set_band(band));

        let input = dc_input(0.5);
        engine.process_chunk(&input);
        let first = rx.try_recv().unwrap();
        assert!(first[0].left > 0.0);

        for _ in 0..200 {
            engine.process_chunk(&input);
        }
        let settled = rx.try_iter().last().unwrap();
        assert!(settled.iter().all(|s| s.left.abs() < 1e-4 && s.right == 0.0));

        // Same band again starts from zero state
        engine.apply_command(set_band(band));
        engine.process_chunk(&input);
        assert_eq!(rx.try_recv().unwrap(), first);

        engine.apply_command(set_band(None));
        engine.process_chunk(&input);
        let out = rx.try_recv().unwrap();
        assert!(out.iter().all(|s| s.left == 0.5 && s.right == 0.0));
    }

    #[test]
    fn test_chunk_reaches_destination() {
        let mut engine = engine();
        let (slot, rx) = channel_slot(1);
        engine.add_destination(slot);

        let input = ramp_input();
        engine.process_chunk(&input);

        let out = rx.try_recv().unwrap();
        assert_eq!(out.len(), N);
        for (frame, sample) in input.frames_iter().zip(&out) {
            assert_eq!(sample.left, frame[0]);
            assert_eq!(sample.right, frame[1]);
        }
        assert_eq!(engine.stats().snapshot().chunks_processed, 1);
    }

    #[test]
    fn test_meters_report_exact_peaks() {
        let mut engine = engine();
        let input_meters = engine.input_meters.clone();
        let (tx, _rx) = unbounded();
        let (slot, meters) = slot(1, Box::new(ChannelSink(tx)));
        engine.add_destination(slot);

        let input = ramp_input();
        engine.process_chunk(&input);

        assert_eq!(input_meters.levels(), input.peaks());
        let max = (N - 1) as f32 / N as f32;
        assert_eq!(meters.levels(), [max, max * 0.5]);
    }

    #[test]
    fn test_failing_destination_does_not_affect_others() {
        let mut engine = engine();
        let (full, _) = slot(1, Box::new(FullSink));
        let (panicking, _) = slot(2, Box::new(PanickingSink));
        let (healthy, rx) = channel_slot(3);
        engine.add_destination(full);
        engine.add_destination(panicking);
        engine.add_destination(healthy);

        engine.process_chunk(&ramp_input());
        engine.process_chunk(&ramp_input());

        assert_eq!(rx.try_iter().count(), 2);
        let stats = engine.stats().snapshot();
        assert_eq!(stats.output_drops, 2);
        assert_eq!(stats.panics_caught, 2);
        assert_eq!(stats.chunks_processed, 2);
    }

    #[test]
    fn test_commands_apply_between_chunks() {
        let mut engine = engine();
        let (mut tx, mut rx) = command_channel(16);
        let (first, first_rx) = channel_slot(1);
        let (second, second_rx) = channel_slot(2);
        engine.add_destination(first);
        engine.add_destination(second);

        let mut mono = MixMatrix::new();
        mono.set_gain(2, Bus::Left, 1.0).unwrap();
        assert!(tx
            .send(EngineCommand::SetMix {
                key: DestinationKey(2),
                matrix: mono,
            })
            .is_ok());
        assert!(tx
            .send(EngineCommand::RemoveDestination { key: DestinationKey(1) })
            .is_ok());

        // Nothing applies until the worker drains the queue
        engine.process_chunk(&ramp_input());
        assert_eq!(first_rx.try_iter().count(), 1);
        assert_eq!(engine.destination_count(), 2);

        engine.process_commands(&mut rx);
        assert_eq!(engine.destination_count(), 1);

        let input = ramp_input();
        engine.process_chunk(&input);
        assert_eq!(first_rx.try_iter().count(), 0);
        let out = second_rx.try_iter().last().unwrap();
        for (frame, sample) in input.frames_iter().zip(&out) {
            assert_eq!(sample.left, frame[2]);
            assert_eq!(sample.right, 0.0);
        }
    }

    #[test]
    fn test_commands_for_removed_destination_are_ignored() {
        let mut engine = engine();
        engine.apply_command(EngineCommand::SetLatency {
            key: DestinationKey(9),
            latency_ms: 10.0,
        });
        engine.apply_command(EngineCommand::RemoveDestination { key: DestinationKey(9) });
        assert_eq!(engine.destination_count(), 0);
    }

    #[test]
    fn test_closed_outputs_receive_nothing() {
        let mut engine = engine();
        let (slot, rx) = channel_slot(1);
        engine.add_destination(slot);
        engine.close_outputs();

        engine.process_chunk(&InputChunk::silence(N));
        assert!(rx.try_recv().is_err());
        assert_eq!(engine.stats().snapshot().output_drops, 0);
    }
}
