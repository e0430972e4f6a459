//! Lock-free command queue from the control path to the engine worker
//!
//! Control operations never touch the engine directly. They push a command
//! into a fixed-size `rtrb` ring, and the worker drains the ring between
//! chunks. A command is therefore applied whole at a chunk boundary, never
//! part-way through a chunk.
//!
//! ```ignore
//! let (mut tx, mut rx) = command_channel(256);
//!
//! // Control path (non-blocking)
//! tx.send(EngineCommand::RemoveDestination { key })?;
//!
//! // Worker, before each chunk
//! engine.process_commands(&mut rx);
//! ```

use basedrop::Owned;

use crate::effect::FilterBand;

use super::engine::DestinationSlot;
use super::mixer::MixMatrix;

/// Engine-side identity of a destination
///
/// Keys are never reused, so a command for a removed destination can never
/// reach one that was added later for the same device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DestinationKey(pub u64);

/// Commands sent from the control path to the engine worker
pub enum EngineCommand {
    /// Start processing a fully built destination
    ///
    /// The slot owns its output stream and buffers. It is allocated off the
    /// real-time thread and freed on the collector thread after removal.
    AddDestination { slot: Owned<DestinationSlot> },
    /// Stop processing a destination
    RemoveDestination { key: DestinationKey },
    /// Replace a destination's whole mix matrix
    SetMix { key: DestinationKey, matrix: MixMatrix },
    /// Change latency (clears the delay line when the value changes)
    SetLatency { key: DestinationKey, latency_ms: f32 },
    /// Enable the filter with a band, or disable it with `None`
    SetFilter {
        key: DestinationKey,
        band: Option<FilterBand>,
    },
}

/// Producer half of the command queue, held by the control path
pub struct CommandSender {
    producer: rtrb::Producer<EngineCommand>,
}

impl CommandSender {
    /// Queue a command without blocking
    ///
    /// Returns the command back when the queue is full.
    pub fn send(&mut self, cmd: EngineCommand) -> Result<(), EngineCommand> {
        self.producer.push(cmd).map_err(|e| match e {
            rtrb::PushError::Full(value) => value,
        })
    }

    /// Free command slots
    pub fn capacity_left(&self) -> usize {
        self.producer.slots()
    }
}

/// Create a command queue holding up to `capacity` pending commands
pub fn command_channel(capacity: usize) -> (CommandSender, rtrb::Consumer<EngineCommand>) {
    let (producer, consumer) = rtrb::RingBuffer::new(capacity.max(1));
    (CommandSender { producer }, consumer)
}
