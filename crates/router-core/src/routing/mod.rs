//! Routing - control path, state store and level push channel
//!
//! [`Router`] is what a control surface drives. It keeps the
//! [`RoutingState`] that outlives each session and mirrors every accepted
//! change into the running engine. [`LevelBroadcaster`] pushes meter values
//! at a fixed cadence.

mod levels;
mod router;
mod state;

pub use levels::LevelBroadcaster;
pub use router::Router;
pub use state::{
    DestinationConfig, DestinationSnapshot, LevelsUpdate, RouterSnapshot, RoutingState,
};
