//! Output device enumeration
//!
//! Devices are listed from every available cpal host, so on Linux both the
//! JACK server and the individual ALSA devices show up.

use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{Host, HostId};

use crate::config::DeviceId;
use crate::error::{AudioError, AudioResult};

/// Display name for a host ("ALSA", "JACK", "CoreAudio", …)
fn host_name(host_id: HostId) -> String {
    let name = format!("{:?}", host_id);
    match name.as_str() {
        "Alsa" => "ALSA".to_string(),
        "Jack" => "JACK".to_string(),
        "Wasapi" => "WASAPI".to_string(),
        _ => name,
    }
}

fn host_by_name(name: &str) -> Option<Host> {
    cpal::available_hosts()
        .into_iter()
        .find(|&id| host_name(id) == name)
        .and_then(|id| cpal::host_from_id(id).ok())
}

/// An output device as seen by the player
#[derive(Debug, Clone)]
pub struct OutputDevice {
    /// Identifier to put in the configuration
    pub id: DeviceId,
    pub name: String,
    pub host: String,
    /// System default for its host
    pub is_default: bool,
    /// Common sample rates the device accepts
    pub sample_rates: Vec<u32>,
    pub max_channels: u16,
}

impl std::fmt::Display for OutputDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.host, self.name)
    }
}

/// List output devices from every host, defaults first
pub fn get_output_devices() -> AudioResult<Vec<OutputDevice>> {
    let mut devices = Vec::new();

    for host_id in cpal::available_hosts() {
        let host = match cpal::host_from_id(host_id) {
            Ok(host) => host,
            Err(e) => {
                log::debug!("Could not initialize host {:?}: {}", host_id, e);
                continue;
            }
        };
        let host_label = host_name(host_id);
        let default_name = host.default_output_device().and_then(|d| d.name().ok());

        let outputs = match host.output_devices() {
            Ok(outputs) => outputs,
            Err(e) => {
                log::debug!("Could not enumerate devices for {:?}: {}", host_id, e);
                continue;
            }
        };

        for device in outputs {
            let Ok(name) = device.name() else { continue };
            let Ok(configs) = device.supported_output_configs() else { continue };

            let mut sample_rates = Vec::new();
            let mut max_channels = 0u16;
            for config in configs {
                max_channels = max_channels.max(config.channels());
                for rate in [22050, 44100, 48000, 88200, 96000, 192000] {
                    if (config.min_sample_rate().0..=config.max_sample_rate().0).contains(&rate)
                        && !sample_rates.contains(&rate)
                    {
                        sample_rates.push(rate);
                    }
                }
            }
            if max_channels == 0 {
                continue;
            }
            sample_rates.sort_unstable();

            devices.push(OutputDevice {
                id: DeviceId::with_host(&name, &host_label),
                is_default: default_name.as_deref() == Some(name.as_str()),
                name,
                host: host_label.clone(),
                sample_rates,
                max_channels,
            });
        }
    }

    if devices.is_empty() {
        return Err(AudioError::DeviceError("no output devices available".into()));
    }

    devices.sort_by(|a, b| {
        b.is_default
            .cmp(&a.is_default)
            .then_with(|| a.host.cmp(&b.host))
            .then_with(|| a.name.cmp(&b.name))
    });
    log::info!("Enumerated {} output devices", devices.len());
    Ok(devices)
}

/// Resolve a configured device, or the default output of the default host
pub(crate) fn find_output_device(id: Option<&DeviceId>) -> AudioResult<cpal::Device> {
    let Some(id) = id else {
        return cpal::default_host()
            .default_output_device()
            .ok_or_else(|| AudioError::DeviceError("no default output device".into()));
    };

    let matches = |d: &cpal::Device| d.name().ok().as_deref() == Some(id.name.as_str());

    if let Some(host) = id.host.as_deref().and_then(host_by_name) {
        return host
            .output_devices()
            .map_err(|e| AudioError::DeviceError(e.to_string()))?
            .find(matches)
            .ok_or_else(|| AudioError::DeviceError(format!("device not found: {}", id.display_label())));
    }

    cpal::available_hosts()
        .into_iter()
        .filter_map(|host_id| cpal::host_from_id(host_id).ok())
        .filter_map(|host| host.output_devices().ok())
        .flatten()
        .find(matches)
        .ok_or_else(|| AudioError::DeviceError(format!("device not found: {}", id.display_label())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_enumeration() {
        // No devices is the normal case on CI
        match get_output_devices() {
            Ok(devices) => {
                for device in &devices {
                    println!("  - {} (default: {}, rates: {:?})", device, device.is_default, device.sample_rates);
                }
                assert!(devices.iter().all(|d| d.max_channels > 0));
            }
            Err(e) => println!("No audio devices: {}", e),
        }
    }

    #[test]
    fn test_unknown_device_is_device_error() {
        let id = DeviceId::new("definitely-not-a-real-device-name");
        assert!(matches!(find_output_device(Some(&id)), Err(AudioError::DeviceError(_))));
    }
}
