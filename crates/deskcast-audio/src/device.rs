use anyhow::Result;
use cpal::traits::{DeviceTrait, HostTrait};

/// Find the default audio sink's monitor source -- the input device most
/// PulseAudio/PipeWire hosts expose as `<sink-name>.monitor`, which carries
/// whatever the desktop is currently playing rather than a microphone.
///
/// Falls back to the host's default input device if no such name is found,
/// since not every host exposes a monitor source under cpal (e.g. a plain
/// ALSA host, or a machine with no sink configured yet).
pub fn get_monitor_device() -> Result<cpal::Device> {
    let host = cpal::default_host();

    for device in host.input_devices()? {
        if let Ok(name) = device.name() {
            if name.to_lowercase().contains("monitor") {
                return Ok(device);
            }
        }
    }

    host.default_input_device()
        .ok_or_else(|| anyhow::anyhow!("no audio input device available (monitor source or otherwise)"))
}
