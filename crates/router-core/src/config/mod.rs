//! Router configuration
//!
//! - Engine tuning (chunk size, queue sizes, meter cadence)
//! - A routing preset: the input device plus every destination's gains,
//!   latency and filter, so routing carries over between runs
//! - YAML load/save and the default file location
//!
//! ```ignore
//! use router_core::config::{default_config_path, load_config, save_config, RouterConfig};
//!
//! let path = default_config_path();
//! let config: RouterConfig = load_config(&path);
//! save_config(&config, &path)?;
//! ```

mod io;
mod paths;
mod router;

pub use io::{load_config, save_config};
pub use paths::{default_config_dir, default_config_path, CONFIG_FILE_NAME};
pub use router::{DestinationPreset, EngineConfig, RouterConfig, RoutingPreset};
