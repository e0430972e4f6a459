//! Router - the control-path facade
//!
//! Every control-surface command maps to one method here. The router holds
//! the authoritative [`RoutingState`] and, while a session runs, the
//! producer half of the engine's command queue.
//!
//! # Locking
//!
//! - `lifecycle` serialises the operations that open or close devices
//!   (start, stop, add, remove). It is held across device I/O.
//! - `inner` guards the routing state and the session. It is never held
//!   across device I/O, and the engine worker never takes it.
//!
//! A mutation validates against the state, queues the matching engine
//! command and only then updates the state. A rejected operation therefore
//! leaves both sides unchanged, and an accepted one is applied by the
//! worker at the next chunk boundary.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use basedrop::Owned;

use crate::audio::{
    AudioBackend, AudioDevice, AudioError, DeviceDirection, DeviceId, StreamSettings,
};
use crate::config::{DestinationPreset, EngineConfig, RoutingPreset};
use crate::effect::FilterBand;
use crate::engine::gc::gc_handle;
use crate::engine::{
    command_channel, max_latency_ms, CommandSender, EngineCommand, EngineWorker, MixMatrix,
    ProcessingEngine,
};
use crate::error::{RouterError, RouterResult};
use crate::types::{Bus, INPUT_CHANNELS, OUTPUT_CHANNELS};

use super::state::{LevelsUpdate, RouterSnapshot, RoutingState};

/// A running session
struct Session {
    input: DeviceId,
    sample_rate: u32,
    commands: CommandSender,
    worker: EngineWorker,
}

struct Inner {
    routing: RoutingState,
    session: Option<Session>,
    /// Input of the running session, or of the last one
    input_device: Option<DeviceId>,
}

impl Inner {
    /// Send a command to the running engine, if any
    fn send(&mut self, cmd: EngineCommand) -> RouterResult<()> {
        match self.session.as_mut() {
            Some(session) => session
                .commands
                .send(cmd)
                .map_err(|_| RouterError::CommandQueueFull),
            None => Ok(()),
        }
    }
}

/// Routes a 6-channel input to any number of stereo destinations
pub struct Router {
    backend: Arc<dyn AudioBackend>,
    config: EngineConfig,
    lifecycle: Mutex<()>,
    inner: Mutex<Inner>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Router {
    pub fn new(backend: Arc<dyn AudioBackend>, config: EngineConfig) -> Self {
        Self {
            backend,
            config,
            lifecycle: Mutex::new(()),
            inner: Mutex::new(Inner {
                routing: RoutingState::new(),
                session: None,
                input_device: None,
            }),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ─────────────────────────────────────────────────────────────
    // Devices
    // ─────────────────────────────────────────────────────────────

    /// Capture devices with at least 6 channels
    pub fn input_devices(&self) -> RouterResult<Vec<AudioDevice>> {
        filter_devices(self.backend.input_devices(), INPUT_CHANNELS)
    }

    /// Playback devices with at least 2 channels
    pub fn output_devices(&self) -> RouterResult<Vec<AudioDevice>> {
        filter_devices(self.backend.output_devices(), OUTPUT_CHANNELS)
    }

    fn require_device(
        &self,
        id: &DeviceId,
        direction: DeviceDirection,
        required: usize,
    ) -> RouterResult<AudioDevice> {
        let device = self.backend.find_device(id, direction)?;
        if (device.channels as usize) < required {
            log::warn!(
                "Rejected {}: {} channels, {} required",
                device.id,
                device.channels,
                required
            );
            return Err(RouterError::InsufficientChannels {
                device: device.id.to_string(),
                channels: device.channels,
                required: required as u16,
            });
        }
        Ok(device)
    }

    // ─────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────

    /// Open the input and every destination, then start the engine worker
    ///
    /// All streams run at the input device's native rate. If any stream
    /// fails to open, everything opened so far is closed and the router
    /// stays stopped.
    pub fn start(&self, input_id: &DeviceId) -> RouterResult<()> {
        let _lifecycle = lock(&self.lifecycle);
        if lock(&self.inner).session.is_some() {
            return Err(RouterError::AlreadyRunning);
        }

        let device = self.require_device(input_id, DeviceDirection::Input, INPUT_CHANNELS)?;
        let sample_rate = device.sample_rate;
        let chunk_frames = self.config.chunk_frames();

        let input = self
            .backend
            .open_input(&device.id, &StreamSettings::input(sample_rate, chunk_frames))?;

        // Destinations cannot be added or removed while `lifecycle` is held
        let targets: Vec<_> = lock(&self.inner)
            .routing
            .iter()
            .map(|d| (d.key, d.id.clone()))
            .collect();

        let output_settings = StreamSettings::output(sample_rate, chunk_frames);
        let mut sinks = Vec::with_capacity(targets.len());
        for (key, id) in targets {
            match self.backend.open_output(&id, &output_settings) {
                Ok(sink) => sinks.push((key, sink)),
                Err(e) => {
                    log::warn!("Start aborted, cannot open destination {}: {}", id, e);
                    return Err(e.into());
                }
            }
        }

        let mut inner = lock(&self.inner);
        let mut engine = ProcessingEngine::new(
            sample_rate,
            chunk_frames,
            inner.routing.input_meters().clone(),
            inner.routing.stats().clone(),
        );
        for (key, sink) in sinks {
            if let Some(destination) = inner.routing.by_key(key) {
                let slot = destination.build_slot(sink, sample_rate, chunk_frames);
                engine.add_destination(Owned::new(&gc_handle(), slot));
            }
        }

        let destination_count = engine.destination_count();
        let (commands, consumer) = command_channel(self.config.command_queue_capacity);
        inner.routing.stats().reset();
        let worker = EngineWorker::spawn(engine, input, consumer)?;

        inner.session = Some(Session {
            input: device.id.clone(),
            sample_rate,
            commands,
            worker,
        });
        inner.input_device = Some(device.id.clone());

        log::info!(
            "Router started: input {}, {} Hz, {} frames/chunk, {} destinations",
            device.id,
            sample_rate,
            chunk_frames,
            destination_count
        );
        Ok(())
    }

    /// Stop the engine worker and close every stream
    ///
    /// Routing is kept for the next start. Meters read zero afterwards.
    /// Does nothing while stopped.
    pub fn stop(&self) {
        let _lifecycle = lock(&self.lifecycle);
        let Some(mut session) = lock(&self.inner).session.take() else {
            return;
        };

        session.worker.stop();
        lock(&self.inner).routing.reset_meters();
        log::info!("Router stopped (input {})", session.input);
    }

    pub fn is_running(&self) -> bool {
        lock(&self.inner).session.is_some()
    }

    /// Input of the running session, or of the last session started
    pub fn input_device(&self) -> Option<DeviceId> {
        lock(&self.inner).input_device.clone()
    }

    /// Sample rate of the running session
    pub fn sample_rate(&self) -> Option<u32> {
        lock(&self.inner).session.as_ref().map(|s| s.sample_rate)
    }

    // ─────────────────────────────────────────────────────────────
    // Destinations
    // ─────────────────────────────────────────────────────────────

    /// Add an output device as a destination with an empty mix
    ///
    /// While running, its stream is opened at the session rate and the
    /// engine picks it up at the next chunk.
    pub fn add_destination(&self, id: &DeviceId) -> RouterResult<()> {
        let _lifecycle = lock(&self.lifecycle);
        let device = self.require_device(id, DeviceDirection::Output, OUTPUT_CHANNELS)?;

        let session_rate = {
            let inner = lock(&self.inner);
            if inner.routing.contains(&device.id) {
                return Err(RouterError::DestinationExists(device.id));
            }
            let limit = self.config.destination_limit();
            if inner.routing.len() >= limit {
                return Err(RouterError::TooManyDestinations(limit));
            }
            inner.session.as_ref().map(|s| s.sample_rate)
        };

        let chunk_frames = self.config.chunk_frames();
        let sink = match session_rate {
            Some(rate) => Some(
                self.backend
                    .open_output(&device.id, &StreamSettings::output(rate, chunk_frames))?,
            ),
            None => None,
        };

        let mut inner = lock(&self.inner);
        let destination = inner.routing.insert(device.id.clone(), device.name.clone())?.clone();
        if let (Some(sink), Some(rate)) = (sink, session_rate) {
            let slot = destination.build_slot(sink, rate, chunk_frames);
            let cmd = EngineCommand::AddDestination {
                slot: Owned::new(&gc_handle(), slot),
            };
            if let Err(e) = inner.send(cmd) {
                let _ = inner.routing.remove(&device.id);
                return Err(e);
            }
        }

        log::info!("Destination added: {}", device.id);
        Ok(())
    }

    /// Remove a destination and close its stream
    pub fn remove_destination(&self, id: &DeviceId) -> RouterResult<()> {
        let _lifecycle = lock(&self.lifecycle);
        let mut inner = lock(&self.inner);
        let key = inner.routing.get(id)?.key;
        inner.send(EngineCommand::RemoveDestination { key })?;
        inner.routing.remove(id)?;
        log::info!("Destination removed: {}", id);
        Ok(())
    }

    /// Validate a new matrix, queue it, then store it
    fn update_mix(
        &self,
        id: &DeviceId,
        update: impl FnOnce(&mut MixMatrix) -> RouterResult<()>,
    ) -> RouterResult<()> {
        let mut inner = lock(&self.inner);
        let destination = inner.routing.get(id)?;
        let key = destination.key;
        let mut matrix = destination.mix;
        update(&mut matrix)?;

        inner.send(EngineCommand::SetMix { key, matrix })?;
        inner.routing.get_mut(id)?.mix = matrix;
        Ok(())
    }

    /// Route `channel` to `bus` at `gain`; a gain of zero or less unroutes it
    pub fn set_gain(&self, id: &DeviceId, channel: usize, bus: Bus, gain: f32) -> RouterResult<()> {
        self.update_mix(id, |matrix| matrix.set_gain(channel, bus, gain))
            .inspect_err(|e| log::warn!("set_gain on {} rejected: {}", id, e))
    }

    /// Unroute every channel from both buses
    pub fn clear_gains(&self, id: &DeviceId) -> RouterResult<()> {
        self.update_mix(id, |matrix| {
            matrix.clear();
            Ok(())
        })
    }

    /// Largest latency accepted right now (session rate, or the fallback)
    pub fn max_latency_ms(&self) -> f32 {
        let rate = self.sample_rate().unwrap_or_else(|| self.config.fallback_rate());
        max_latency_ms(rate, self.config.chunk_frames())
    }

    /// Delay a destination's output by `ms`
    pub fn set_latency(&self, id: &DeviceId, ms: f32) -> RouterResult<()> {
        let mut inner = lock(&self.inner);
        let key = inner.routing.get(id)?.key;

        let rate = inner
            .session
            .as_ref()
            .map(|s| s.sample_rate)
            .unwrap_or_else(|| self.config.fallback_rate());
        let max_ms = max_latency_ms(rate, self.config.chunk_frames());
        if !(0.0..=max_ms).contains(&ms) {
            log::warn!("set_latency on {} rejected: {}ms (max {:.1}ms)", id, ms, max_ms);
            return Err(RouterError::LatencyOutOfRange { ms, max_ms });
        }

        inner.send(EngineCommand::SetLatency { key, latency_ms: ms })?;
        inner.routing.get_mut(id)?.latency_ms = ms;
        Ok(())
    }

    /// Band-limit a destination to `low_hz`..`high_hz`
    ///
    /// The band is clamped to the session rate when applied. Setting the
    /// same band again still resets the filter state.
    pub fn set_filter(&self, id: &DeviceId, low_hz: f32, high_hz: f32) -> RouterResult<()> {
        self.update_filter(id, Some(FilterBand::new(low_hz, high_hz)))
    }

    /// Disable a destination's filter
    pub fn clear_filter(&self, id: &DeviceId) -> RouterResult<()> {
        self.update_filter(id, None)
    }

    fn update_filter(&self, id: &DeviceId, band: Option<FilterBand>) -> RouterResult<()> {
        let mut inner = lock(&self.inner);
        let key = inner.routing.get(id)?.key;
        inner.send(EngineCommand::SetFilter { key, band })?;
        inner.routing.get_mut(id)?.filter = band;
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────
    // State
    // ─────────────────────────────────────────────────────────────

    pub fn snapshot(&self) -> RouterSnapshot {
        let inner = lock(&self.inner);
        RouterSnapshot {
            running: inner.session.is_some(),
            input_device: inner.input_device.clone(),
            sample_rate: inner.session.as_ref().map(|s| s.sample_rate),
            input_levels: inner.routing.input_meters().levels(),
            destinations: inner.routing.iter().map(|d| d.snapshot()).collect(),
            stats: inner.routing.stats().snapshot(),
        }
    }

    /// Current meter values without the rest of the state
    pub fn levels(&self) -> LevelsUpdate {
        let inner = lock(&self.inner);
        LevelsUpdate {
            input_levels: inner.routing.input_meters().levels(),
            output_levels: inner
                .routing
                .iter()
                .map(|d| (d.id.clone(), d.meters.levels()))
                .collect(),
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Presets
    // ─────────────────────────────────────────────────────────────

    /// Add and configure every destination in `preset`
    ///
    /// Destinations already present are reconfigured. A destination that
    /// cannot be applied is logged and skipped. Returns how many were
    /// applied. The preset's input device is remembered while stopped.
    pub fn apply_preset(&self, preset: &RoutingPreset) -> usize {
        let mut applied = 0;
        for destination in &preset.destinations {
            match self.apply_destination(destination) {
                Ok(()) => applied += 1,
                Err(e) => log::warn!("Skipping destination {}: {}", destination.device, e),
            }
        }

        if let Some(input) = &preset.input_device {
            let mut inner = lock(&self.inner);
            if inner.session.is_none() {
                inner.input_device = Some(input.clone());
            }
        }

        log::info!(
            "Applied {} of {} preset destinations",
            applied,
            preset.destinations.len()
        );
        applied
    }

    /// Apply one preset entry completely or not at all
    ///
    /// Everything that can be validated up front is checked before the
    /// destination is touched. If a later step still fails, a destination
    /// added here is removed again and an existing one gets its previous
    /// configuration back.
    fn apply_destination(&self, preset: &DestinationPreset) -> RouterResult<()> {
        let matrix = MixMatrix::from_maps(&preset.left, &preset.right)?;
        let max_ms = self.max_latency_ms();
        if !(0.0..=max_ms).contains(&preset.latency_ms) {
            return Err(RouterError::LatencyOutOfRange {
                ms: preset.latency_ms,
                max_ms,
            });
        }

        let id = self.backend.find_device(&preset.device, DeviceDirection::Output)?.id;
        let previous = lock(&self.inner)
            .routing
            .get(&id)
            .ok()
            .map(|d| (d.mix, d.latency_ms, d.filter));
        if previous.is_none() {
            self.add_destination(&id)?;
        }

        let result = self.configure(&id, matrix, preset.latency_ms, preset.filter);
        if let Err(e) = &result {
            let restored = match previous {
                None => self.remove_destination(&id),
                Some((mix, latency_ms, filter)) => self.configure(&id, mix, latency_ms, filter),
            };
            if let Err(restore) = restored {
                log::error!("Could not undo preset for {} ({}): {}", id, e, restore);
            }
        }
        result
    }

    fn configure(
        &self,
        id: &DeviceId,
        matrix: MixMatrix,
        latency_ms: f32,
        filter: Option<FilterBand>,
    ) -> RouterResult<()> {
        self.update_mix(id, |current| {
            *current = matrix;
            Ok(())
        })?;
        self.set_latency(id, latency_ms)?;
        self.update_filter(id, filter)
    }

    /// Export the current routing
    pub fn preset(&self) -> RoutingPreset {
        let inner = lock(&self.inner);
        RoutingPreset {
            input_device: inner.input_device.clone(),
            destinations: inner
                .routing
                .iter()
                .map(|d| DestinationPreset {
                    device: d.id.clone(),
                    left: d.mix.gains(Bus::Left),
                    right: d.mix.gains(Bus::Right),
                    latency_ms: d.latency_ms,
                    filter: d.filter,
                })
                .collect(),
        }
    }
}

impl Drop for Router {
    fn drop(&mut self) {
        self.stop();
    }
}

fn filter_devices(
    devices: Result<Vec<AudioDevice>, AudioError>,
    required: usize,
) -> RouterResult<Vec<AudioDevice>> {
    match devices {
        Ok(devices) => Ok(devices
            .into_iter()
            .filter(|d| d.channels as usize >= required)
            .collect()),
        Err(AudioError::NoDevices) => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}
