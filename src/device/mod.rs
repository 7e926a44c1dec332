pub mod errors;
pub mod raw;
pub mod tcp;

use crate::config::{DeviceConfig, TpmConfig};

// open returns the device described by the configuration. Nothing is
// opened or connected until the first command is sent.
pub fn open(config: &TpmConfig) -> Box<dyn raw::TpmDeviceOps> {
    match &config.device {
        DeviceConfig::Device { path } => Box::new(raw::TpmDevice {
            rw: raw::TpmRawIO::new(path.clone()),
        }),
        DeviceConfig::Tcp {
            host,
            port,
            protocol,
        } => Box::new(tcp::TpmSwtpmIO::new(
            host.clone(),
            *port,
            *protocol,
            config.locality,
            config.timeout,
        )),
    }
}
