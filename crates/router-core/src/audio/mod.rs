//! Audio device boundary of the router
//!
//! The engine only ever sees the traits in [`backend`]. The cpal
//! implementation bridges cpal's callbacks to chunk-wise blocking reads and
//! non-blocking writes:
//!
//! - **Input**: the capture callback fills a lock-free ring, the engine
//!   worker drains one whole chunk at a time with a bounded wait
//! - **Outputs**: the worker queues one stereo chunk per destination, each
//!   playback callback drains its own ring and plays silence on underrun
//!
//! # Example Usage
//!
//! ```ignore
//! use router_core::audio::{AudioBackend, CpalBackend};
//!
//! let backend = CpalBackend::new();
//! for device in backend.input_devices()? {
//!     println!("{}", device);
//! }
//! ```

mod backend;
mod config;
mod cpal_backend;
mod device;
mod error;

#[cfg(test)]
pub(crate) mod testing;

pub use backend::{AudioBackend, AudioDevice, DeviceDirection, InputSource, OutputSink};
pub use config::{chunk_period, DeviceId, StreamSettings, INPUT_RING_CHUNKS, OUTPUT_RING_CHUNKS};
pub use cpal_backend::CpalBackend;
pub use device::get_devices;
pub use error::{AudioError, AudioResult};
