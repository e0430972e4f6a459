//! Surround Router Core - 5.1 input to stereo destination routing

pub mod audio;
pub mod config;
pub mod effect;
pub mod engine;
pub mod error;
pub mod routing;
pub mod types;

pub use error::{RouterError, RouterResult};
pub use routing::{LevelBroadcaster, Router, RouterSnapshot};
pub use types::*;
