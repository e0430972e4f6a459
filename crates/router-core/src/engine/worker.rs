//! The dedicated engine worker thread
//!
//! Exactly one worker runs per session. Each iteration it:
//! 1. checks the stop flag
//! 2. pulls one input chunk (bounded to one chunk period)
//! 3. applies pending control commands
//! 4. runs the chunk through the engine
//!
//! Commands queued before a chunk arrives therefore apply to that chunk.
//!
//! A failed read skips the chunk. Nothing a chunk does can end the loop:
//! only [`EngineWorker::stop`] does.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::audio::{chunk_period, AudioError, AudioResult, InputSource};
use crate::types::InputChunk;

use super::command::EngineCommand;
use super::engine::ProcessingEngine;
use super::meters::StatsSnapshot;

/// How often the worker summarises its statistics
const STATS_INTERVAL: Duration = Duration::from_secs(1);

/// Handle to a running engine worker
pub struct EngineWorker {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl EngineWorker {
    /// Move the engine, its input and the command queue onto a new thread
    pub fn spawn(
        engine: ProcessingEngine,
        input: Box<dyn InputSource>,
        commands: rtrb::Consumer<EngineCommand>,
    ) -> AudioResult<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();

        let thread = thread::Builder::new()
            .name("router-engine".to_string())
            .spawn(move || run(engine, input, commands, &stop_flag))
            .map_err(|e| AudioError::StreamThread(e.to_string()))?;

        Ok(Self {
            stop,
            thread: Some(thread),
        })
    }

    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Signal the loop and wait for it to exit
    ///
    /// The loop observes the flag within one chunk period. When this returns
    /// the input and every output stream owned by the engine are closed.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("Engine worker panicked outside the chunk boundary");
            }
        }
    }
}

impl Drop for EngineWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(
    mut engine: ProcessingEngine,
    mut input: Box<dyn InputSource>,
    mut commands: rtrb::Consumer<EngineCommand>,
    stop: &AtomicBool,
) {
    let mut chunk = InputChunk::silence(engine.chunk_frames());
    let period = chunk_period(engine.chunk_frames(), engine.sample_rate());
    let stats = engine.stats().clone();

    let mut last_report = Instant::now();
    let mut reported = StatsSnapshot::default();

    log::info!(
        "Engine worker running: {} Hz, {} frames/chunk, {} destinations",
        engine.sample_rate(),
        engine.chunk_frames(),
        engine.destination_count()
    );

    while !stop.load(Ordering::Acquire) {
        let read = input.read_chunk(&mut chunk);
        engine.process_commands(&mut commands);

        match read {
            Ok(()) => {
                let processed =
                    panic::catch_unwind(AssertUnwindSafe(|| engine.process_chunk(&chunk)));
                if processed.is_err() {
                    stats.record_panic();
                }
            }
            Err(AudioError::Disconnected) => {
                // The source never recovers; keep polling for stop and commands
                stats.record_input_dropout();
                thread::sleep(period);
            }
            Err(_) => stats.record_input_dropout(),
        }

        if last_report.elapsed() >= STATS_INTERVAL {
            let current = stats.snapshot();
            if current.input_dropouts != reported.input_dropouts
                || current.output_drops != reported.output_drops
                || current.panics_caught != reported.panics_caught
            {
                log::debug!(
                    "Engine: {} chunks, {} input dropouts, {} output drops, {} panics",
                    current.chunks_processed,
                    current.input_dropouts,
                    current.output_drops,
                    current.panics_caught
                );
            }
            reported = current;
            last_report = Instant::now();
        }
    }

    engine.process_commands(&mut commands);
    engine.close_outputs();
    drop(input);
    log::info!("Engine worker stopped");
}
