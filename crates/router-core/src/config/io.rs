//! YAML configuration I/O
//!
//! Loading never fails: a missing or unreadable file yields the default
//! configuration so the router can always start.

use std::path::Path;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Load a configuration from a YAML file
///
/// Returns `T::default()` when the file is missing, and logs a warning and
/// returns the default when it cannot be read or parsed.
pub fn load_config<T>(path: &Path) -> T
where
    T: DeserializeOwned + Default,
{
    if !path.exists() {
        log::info!("No config at {:?}, using defaults", path);
        return T::default();
    }

    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) => {
            log::warn!("Failed to read config {:?}: {}, using defaults", path, e);
            return T::default();
        }
    };

    match serde_yaml::from_str::<T>(&contents) {
        Ok(config) => {
            log::info!("Loaded config from {:?}", path);
            config
        }
        Err(e) => {
            log::warn!("Failed to parse config {:?}: {}, using defaults", path, e);
            T::default()
        }
    }
}

/// Save a configuration as YAML, creating parent directories
pub fn save_config<T>(config: &T, path: &Path) -> Result<()>
where
    T: Serialize,
{
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
    }

    let yaml = serde_yaml::to_string(config).context("Failed to serialize config to YAML")?;
    std::fs::write(path, yaml)
        .with_context(|| format!("Failed to write config file: {:?}", path))?;

    log::info!("Saved config to {:?}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::DeviceId;
    use crate::config::{DestinationPreset, RouterConfig};
    use crate::effect::FilterBand;

    #[test]
    fn test_missing_file_gives_defaults() {
        let path = Path::new("/nonexistent/surround-router/router.yaml");
        let config: RouterConfig = load_config(path);
        assert_eq!(config, RouterConfig::default());
    }

    #[test]
    fn test_invalid_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("router.yaml");
        std::fs::write(&path, "engine: [not, a, mapping").unwrap();

        let config: RouterConfig = load_config(&path);
        assert_eq!(config, RouterConfig::default());
    }

    #[test]
    fn test_save_creates_directories_and_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("router.yaml");

        let mut config = RouterConfig::default();
        config.engine.chunk_size = 256;
        config.routing.input_device = Some(DeviceId::with_host("hw:1", "ALSA"));
        config.routing.destinations.push(DestinationPreset {
            device: DeviceId::new("Headphones"),
            left: [(0, 1.0), (2, 0.5)].into_iter().collect(),
            right: [(1, 1.0)].into_iter().collect(),
            latency_ms: 20.0,
            filter: Some(FilterBand::new(80.0, 12000.0)),
        });

        save_config(&config, &path).unwrap();
        let loaded: RouterConfig = load_config(&path);
        assert_eq!(loaded, config);
    }
}
