//! Default configuration location

use std::path::PathBuf;

/// File name of the router configuration
pub const CONFIG_FILE_NAME: &str = "router.yaml";

/// Per-user configuration directory
///
/// Returns `<config dir>/surround-router`, or `./surround-router` when the
/// platform has no configuration directory.
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("surround-router")
}

/// Returns `<config dir>/surround-router/router.yaml`
pub fn default_config_path() -> PathBuf {
    default_config_dir().join(CONFIG_FILE_NAME)
}
