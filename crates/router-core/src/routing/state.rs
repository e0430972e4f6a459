//! Authoritative routing configuration
//!
//! The control path owns this store. It survives stop/start, and a session's
//! engine is built from it when the router starts. While a session runs each
//! mutation is mirrored into the engine through the command queue.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use crate::audio::{DeviceId, OutputSink};
use crate::effect::FilterBand;
use crate::engine::{
    DestinationKey, DestinationSlot, EngineStats, InputMeters, MixMatrix, OutputMeters,
    StatsSnapshot,
};
use crate::error::{RouterError, RouterResult};
use crate::types::{Bus, INPUT_CHANNELS, OUTPUT_CHANNELS};

/// Configuration of one destination
#[derive(Debug, Clone)]
pub struct DestinationConfig {
    pub id: DeviceId,
    /// Device name for display
    pub name: String,
    pub key: DestinationKey,
    pub mix: MixMatrix,
    pub latency_ms: f32,
    /// Requested band; the engine clamps it for the session rate
    pub filter: Option<FilterBand>,
    pub meters: Arc<OutputMeters>,
}

impl DestinationConfig {
    /// Build the engine slot for this destination
    pub fn build_slot(
        &self,
        sink: Box<dyn OutputSink>,
        sample_rate: u32,
        chunk_frames: usize,
    ) -> DestinationSlot {
        let mut slot =
            DestinationSlot::new(self.key, sink, self.meters.clone(), sample_rate, chunk_frames);
        slot.set_mix(self.mix);
        slot.set_latency(self.latency_ms);
        slot.set_filter(self.filter);
        slot
    }

    pub fn snapshot(&self) -> DestinationSnapshot {
        DestinationSnapshot {
            id: self.id.clone(),
            name: self.name.clone(),
            left: self.mix.gains(Bus::Left),
            right: self.mix.gains(Bus::Right),
            latency_ms: self.latency_ms,
            filter: self.filter,
            output_levels: self.meters.levels(),
        }
    }
}

/// Every destination plus the meters shared with the engine
#[derive(Debug, Default)]
pub struct RoutingState {
    /// Insertion order
    destinations: Vec<DestinationConfig>,
    next_key: u64,
    input_meters: Arc<InputMeters>,
    stats: Arc<EngineStats>,
}

impl RoutingState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a destination with an empty mix, no latency and no filter
    pub fn insert(&mut self, id: DeviceId, name: String) -> RouterResult<&mut DestinationConfig> {
        if self.contains(&id) {
            return Err(RouterError::DestinationExists(id));
        }
        let key = DestinationKey(self.next_key);
        self.next_key += 1;
        self.destinations.push(DestinationConfig {
            id,
            name,
            key,
            mix: MixMatrix::new(),
            latency_ms: 0.0,
            filter: None,
            meters: Arc::new(OutputMeters::new()),
        });
        let last = self.destinations.len() - 1;
        Ok(&mut self.destinations[last])
    }

    pub fn remove(&mut self, id: &DeviceId) -> RouterResult<DestinationConfig> {
        let index = self
            .destinations
            .iter()
            .position(|d| d.id == *id)
            .ok_or_else(|| RouterError::UnknownDestination(id.clone()))?;
        Ok(self.destinations.remove(index))
    }

    pub fn get(&self, id: &DeviceId) -> RouterResult<&DestinationConfig> {
        self.destinations
            .iter()
            .find(|d| d.id == *id)
            .ok_or_else(|| RouterError::UnknownDestination(id.clone()))
    }

    pub fn get_mut(&mut self, id: &DeviceId) -> RouterResult<&mut DestinationConfig> {
        self.destinations
            .iter_mut()
            .find(|d| d.id == *id)
            .ok_or_else(|| RouterError::UnknownDestination(id.clone()))
    }

    pub fn by_key(&self, key: DestinationKey) -> Option<&DestinationConfig> {
        self.destinations.iter().find(|d| d.key == key)
    }

    pub fn contains(&self, id: &DeviceId) -> bool {
        self.destinations.iter().any(|d| d.id == *id)
    }

    pub fn len(&self) -> usize {
        self.destinations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.destinations.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DestinationConfig> {
        self.destinations.iter()
    }

    pub fn input_meters(&self) -> &Arc<InputMeters> {
        &self.input_meters
    }

    pub fn stats(&self) -> &Arc<EngineStats> {
        &self.stats
    }

    /// Zero every input and output meter
    pub fn reset_meters(&self) {
        self.input_meters.reset();
        for destination in &self.destinations {
            destination.meters.reset();
        }
    }
}

/// State of one destination as reported to control surfaces
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DestinationSnapshot {
    pub id: DeviceId,
    pub name: String,
    /// Input channel → gain on the left bus
    pub left: BTreeMap<usize, f32>,
    /// Input channel → gain on the right bus
    pub right: BTreeMap<usize, f32>,
    pub latency_ms: f32,
    pub filter: Option<FilterBand>,
    /// `[left, right]` peak of the last processed chunk
    pub output_levels: [f32; OUTPUT_CHANNELS],
}

/// Full router state for polling control surfaces
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouterSnapshot {
    pub running: bool,
    pub input_device: Option<DeviceId>,
    /// Session rate while running
    pub sample_rate: Option<u32>,
    pub input_levels: [f32; INPUT_CHANNELS],
    pub destinations: Vec<DestinationSnapshot>,
    pub stats: StatsSnapshot,
}

/// Meter values pushed to level subscribers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LevelsUpdate {
    pub input_levels: [f32; INPUT_CHANNELS],
    pub output_levels: Vec<(DeviceId, [f32; OUTPUT_CHANNELS])>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_lookup() {
        let mut state = RoutingState::new();
        let a = DeviceId::new("A");
        state.insert(a.clone(), "A".to_string()).unwrap();
        state.insert(DeviceId::new("B"), "B".to_string()).unwrap();

        assert_eq!(state.len(), 2);
        assert!(state.contains(&a));
        assert!(matches!(
            state.insert(a.clone(), "A".to_string()),
            Err(RouterError::DestinationExists(_))
        ));
        let names: Vec<&str> = state.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B"]);
    }

    #[test]
    fn test_keys_are_never_reused() {
        let mut state = RoutingState::new();
        let a = DeviceId::new("A");
        let first = state.insert(a.clone(), "A".to_string()).unwrap().key;
        state.remove(&a).unwrap();
        let second = state.insert(a.clone(), "A".to_string()).unwrap().key;
        assert_ne!(first, second);
        assert!(state.by_key(first).is_none());
        assert!(state.by_key(second).is_some());
    }

    #[test]
    fn test_unknown_destination() {
        let mut state = RoutingState::new();
        let missing = DeviceId::new("missing");
        assert!(matches!(state.get(&missing), Err(RouterError::UnknownDestination(_))));
        assert!(matches!(state.remove(&missing), Err(RouterError::UnknownDestination(_))));
        assert!(state.is_empty());
    }

    #[test]
    fn test_snapshot_serializes_gain_maps() {
        let mut state = RoutingState::new();
        let dest = state.insert(DeviceId::with_host("Out", "ALSA"), "Out".to_string()).unwrap();
        dest.mix.set_gain(0, Bus::Left, 1.0).unwrap();
        dest.mix.set_gain(4, Bus::Right, 0.5).unwrap();
        dest.latency_ms = 12.5;

        let snapshot = state.get(&DeviceId::with_host("Out", "ALSA")).unwrap().snapshot();
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["left"]["0"], 1.0);
        assert_eq!(json["right"]["4"], 0.5);
        assert_eq!(json["latency_ms"], 12.5);
        assert_eq!(json["id"]["host"], "ALSA");
        assert!(json["filter"].is_null());
    }

    #[test]
    fn test_reset_meters() {
        let mut state = RoutingState::new();
        let meters = state.insert(DeviceId::new("A"), "A".to_string()).unwrap().meters.clone();
        meters.publish(0.5, 0.25);
        state.input_meters().publish(&[0.1; INPUT_CHANNELS]);

        state.reset_meters();
        assert_eq!(meters.levels(), [0.0, 0.0]);
        assert_eq!(state.input_meters().levels(), [0.0; INPUT_CHANNELS]);
    }
}
