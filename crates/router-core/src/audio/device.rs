//! Audio device enumeration through cpal
//!
//! Devices are enumerated from ALL available audio hosts (JACK, ALSA,
//! PulseAudio, etc.). On Linux with JACK running, JACK typically exposes a
//! single "device" while ALSA shows each interface, and a 5.1 capture card is
//! often only reachable through one of them.

use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{Host, HostId, SupportedStreamConfigRange};

use super::backend::{AudioDevice, DeviceDirection};
use super::config::DeviceId;
use super::error::{AudioError, AudioResult};

/// Get a human-readable name for a host ID
fn host_name(host_id: HostId) -> String {
    let name = format!("{:?}", host_id);
    match name.as_str() {
        "Alsa" => "ALSA".to_string(),
        "Jack" => "JACK".to_string(),
        "Wasapi" => "WASAPI".to_string(),
        _ => name,
    }
}

/// Get a host by its name string
fn get_host_by_name(name: &str) -> Option<Host> {
    cpal::available_hosts()
        .into_iter()
        .find(|id| host_name(*id) == name)
        .and_then(|id| cpal::host_from_id(id).ok())
}

fn host_devices(host: &Host, direction: DeviceDirection) -> AudioResult<Vec<cpal::Device>> {
    let devices: Vec<cpal::Device> = match direction {
        DeviceDirection::Input => host
            .input_devices()
            .map_err(|e| AudioError::ConfigError(e.to_string()))?
            .collect(),
        DeviceDirection::Output => host
            .output_devices()
            .map_err(|e| AudioError::ConfigError(e.to_string()))?
            .collect(),
    };
    Ok(devices)
}

/// Supported configurations of a device in one direction
pub(crate) fn supported_configs(
    device: &cpal::Device,
    direction: DeviceDirection,
) -> AudioResult<Vec<SupportedStreamConfigRange>> {
    let configs: Vec<SupportedStreamConfigRange> = match direction {
        DeviceDirection::Input => device
            .supported_input_configs()
            .map_err(|e| AudioError::ConfigError(e.to_string()))?
            .collect(),
        DeviceDirection::Output => device
            .supported_output_configs()
            .map_err(|e| AudioError::ConfigError(e.to_string()))?
            .collect(),
    };
    Ok(configs)
}

fn native_sample_rate(device: &cpal::Device, direction: DeviceDirection) -> Option<u32> {
    let config = match direction {
        DeviceDirection::Input => device.default_input_config(),
        DeviceDirection::Output => device.default_output_config(),
    };
    config.ok().map(|c| c.sample_rate().0)
}

/// Enumerate every device of one direction across all hosts
///
/// Sorted with default devices first, then by host, then by name.
pub fn get_devices(direction: DeviceDirection) -> AudioResult<Vec<AudioDevice>> {
    let mut all_devices: Vec<AudioDevice> = Vec::new();

    for host_id in cpal::available_hosts() {
        let host = match cpal::host_from_id(host_id) {
            Ok(h) => h,
            Err(e) => {
                log::debug!("Could not initialize host {:?}: {}", host_id, e);
                continue;
            }
        };

        let host_name_str = host_name(host_id);

        let default_device = match direction {
            DeviceDirection::Input => host.default_input_device(),
            DeviceDirection::Output => host.default_output_device(),
        };
        let default_device_name = default_device.and_then(|d: cpal::Device| d.name().ok());

        let devices = match host_devices(&host, direction) {
            Ok(d) => d,
            Err(e) => {
                log::debug!("Could not enumerate devices for {:?}: {}", host_id, e);
                continue;
            }
        };

        for device in devices {
            let name = match device.name() {
                Ok(n) => n,
                Err(_) => continue,
            };

            let configs = match supported_configs(&device, direction) {
                Ok(c) if !c.is_empty() => c,
                _ => continue,
            };

            let channels = configs.iter().map(|c| c.channels()).max().unwrap_or(0);
            let sample_rate = native_sample_rate(&device, direction)
                .unwrap_or_else(|| configs[0].max_sample_rate().0);

            all_devices.push(AudioDevice {
                id: DeviceId::with_host(&name, &host_name_str),
                is_default: default_device_name.as_ref() == Some(&name),
                name,
                host: host_name_str.clone(),
                channels,
                sample_rate,
            });
        }
    }

    if all_devices.is_empty() {
        return Err(AudioError::NoDevices);
    }

    all_devices.sort_by(|a, b| {
        b.is_default
            .cmp(&a.is_default)
            .then_with(|| a.host.cmp(&b.host))
            .then_with(|| a.name.cmp(&b.name))
    });

    log::info!(
        "Enumerated {} {:?} devices from {} hosts",
        all_devices.len(),
        direction,
        cpal::available_hosts().len()
    );

    Ok(all_devices)
}

/// Find a cpal device by its ID
///
/// Uses the host specified in the DeviceId if available, otherwise
/// searches all available hosts by name.
pub(crate) fn find_cpal_device(
    id: &DeviceId,
    direction: DeviceDirection,
) -> AudioResult<cpal::Device> {
    let matches = |d: &cpal::Device| d.name().ok().as_deref() == Some(id.name.as_str());

    if let Some(host) = id.host.as_deref().and_then(get_host_by_name) {
        return host_devices(&host, direction)?
            .into_iter()
            .find(matches)
            .ok_or_else(|| AudioError::DeviceNotFound(id.to_string()));
    }

    for host_id in cpal::available_hosts() {
        let Ok(host) = cpal::host_from_id(host_id) else {
            continue;
        };
        if let Ok(devices) = host_devices(&host, direction) {
            if let Some(device) = devices.into_iter().find(matches) {
                return Ok(device);
            }
        }
    }

    Err(AudioError::DeviceNotFound(id.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_enumeration() {
        // Tolerates machines without audio hardware
        for direction in [DeviceDirection::Input, DeviceDirection::Output] {
            match get_devices(direction) {
                Ok(devices) => {
                    println!("Found {} {:?} devices:", devices.len(), direction);
                    for device in &devices {
                        assert!(device.channels > 0);
                        println!("  - {}", device);
                    }
                }
                Err(AudioError::NoDevices) => {
                    println!("No {:?} devices available (expected in CI)", direction);
                }
                Err(e) => {
                    println!("Error enumerating devices: {}", e);
                }
            }
        }
    }

    #[test]
    fn test_unknown_device_not_found() {
        let id = DeviceId::new("surround-router-test-device-that-does-not-exist");
        assert!(find_cpal_device(&id, DeviceDirection::Output).is_err());
    }
}
