use crate::device::tcp::TcpProtocol;
use std::env;
use std::path::PathBuf;
use std::result;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_DEVICE_PATH: &str = "/dev/tpmrm0";
pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 2321;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

// Environment variables consulted, in order, when no TCTI string is given
pub const TCTI_ENV_VARS: [&str; 2] = ["TPM2TOOLS_TCTI", "TCTI"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("ConfigError: unknown TCTI `{0}`, expected device, mssim or swtpm")]
    UnknownTcti(String),
    #[error("ConfigError: malformed option `{0}`, expected key=value")]
    MalformedOption(String),
    #[error("ConfigError: unknown option `{key}` for {tcti}")]
    UnknownOption { tcti: String, key: String },
    #[error("ConfigError: invalid value `{value}` for `{key}`")]
    InvalidValue { key: String, value: String },
}

// DeviceConfig selects the transport used to reach the TPM
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceConfig {
    Device {
        path: PathBuf,
    },
    Tcp {
        host: String,
        port: u16,
        protocol: TcpProtocol,
    },
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig::Device {
            path: PathBuf::from(DEFAULT_DEVICE_PATH),
        }
    }
}

fn parse_tcp_options(
    tcti: &str,
    options: &str,
    protocol: TcpProtocol,
) -> result::Result<DeviceConfig, ConfigError> {
    let mut host = String::from(DEFAULT_HOST);
    let mut port = DEFAULT_PORT;
    for option in options.split(',').filter(|o| !o.is_empty()) {
        let (key, value) = match option.split_once('=') {
            Some(kv) => kv,
            None => return Err(ConfigError::MalformedOption(option.to_string())),
        };
        match key {
            "host" => host = value.to_string(),
            "port" => {
                port = value.parse().map_err(|_| ConfigError::InvalidValue {
                    key: key.to_string(),
                    value: value.to_string(),
                })?
            }
            _ => {
                return Err(ConfigError::UnknownOption {
                    tcti: tcti.to_string(),
                    key: key.to_string(),
                })
            }
        }
    }
    if host.is_empty() {
        return Err(ConfigError::InvalidValue {
            key: String::from("host"),
            value: host,
        });
    }
    Ok(DeviceConfig::Tcp {
        host,
        port,
        protocol,
    })
}

// Parses TCTI strings such as `device:/dev/tpm0`, `mssim:host=localhost,port=2321`
// or `swtpm:port=2321`. Options left out fall back to their defaults.
impl FromStr for DeviceConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> result::Result<Self, Self::Err> {
        let (tcti, options) = match s.split_once(':') {
            Some((tcti, options)) => (tcti, options),
            None => (s, ""),
        };
        match tcti {
            "device" if options.is_empty() => Ok(DeviceConfig::default()),
            "device" => Ok(DeviceConfig::Device {
                path: PathBuf::from(options),
            }),
            "mssim" => parse_tcp_options(tcti, options, TcpProtocol::Mssim),
            "swtpm" => parse_tcp_options(tcti, options, TcpProtocol::Raw),
            _ => Err(ConfigError::UnknownTcti(tcti.to_string())),
        }
    }
}

// TpmConfig is everything needed to open a TPM
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpmConfig {
    pub device: DeviceConfig,
    pub locality: u8,
    pub timeout: Option<Duration>,
}

impl Default for TpmConfig {
    fn default() -> Self {
        TpmConfig {
            device: DeviceConfig::default(),
            locality: 0,
            timeout: Some(DEFAULT_TIMEOUT),
        }
    }
}

impl TpmConfig {
    pub fn from_tcti(tcti: &str) -> result::Result<Self, ConfigError> {
        Ok(TpmConfig {
            device: tcti.parse()?,
            ..TpmConfig::default()
        })
    }

    // from_env uses the first TCTI variable that is set, or the default
    // device when none is
    pub fn from_env() -> result::Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup<F: Fn(&str) -> Option<String>>(
        lookup: F,
    ) -> result::Result<Self, ConfigError> {
        match TCTI_ENV_VARS.iter().find_map(|name| lookup(name)) {
            Some(tcti) => Self::from_tcti(&tcti),
            None => Ok(TpmConfig::default()),
        }
    }

    pub fn with_locality(mut self, locality: u8) -> Self {
        self.locality = locality;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_tcti() {
        assert_eq!(
            "device:/dev/tpm0".parse::<DeviceConfig>().unwrap(),
            DeviceConfig::Device {
                path: PathBuf::from("/dev/tpm0")
            }
        );
        assert_eq!(
            "device".parse::<DeviceConfig>().unwrap(),
            DeviceConfig::default()
        );
    }

    #[test]
    fn test_tcp_tcti() {
        assert_eq!(
            "mssim:host=127.0.0.1,port=2331".parse::<DeviceConfig>().unwrap(),
            DeviceConfig::Tcp {
                host: String::from("127.0.0.1"),
                port: 2331,
                protocol: TcpProtocol::Mssim,
            }
        );
        assert_eq!(
            "swtpm".parse::<DeviceConfig>().unwrap(),
            DeviceConfig::Tcp {
                host: String::from(DEFAULT_HOST),
                port: DEFAULT_PORT,
                protocol: TcpProtocol::Raw,
            }
        );
    }

    #[test]
    fn test_bad_tcti() {
        assert_eq!(
            "tabrmd".parse::<DeviceConfig>().unwrap_err(),
            ConfigError::UnknownTcti(String::from("tabrmd"))
        );
        assert_eq!(
            "mssim:port=99999".parse::<DeviceConfig>().unwrap_err(),
            ConfigError::InvalidValue {
                key: String::from("port"),
                value: String::from("99999")
            }
        );
        assert!(matches!(
            "swtpm:path=/tmp/sock".parse::<DeviceConfig>(),
            Err(ConfigError::UnknownOption { .. })
        ));
        assert!(matches!(
            "swtpm:port".parse::<DeviceConfig>(),
            Err(ConfigError::MalformedOption(_))
        ));
    }

    #[test]
    fn test_env_lookup_order() {
        let config = TpmConfig::from_lookup(|name| match name {
            "TPM2TOOLS_TCTI" => Some(String::from("swtpm:port=2400")),
            "TCTI" => Some(String::from("device:/dev/tpm1")),
            _ => None,
        })
        .unwrap();
        assert_eq!(
            config.device,
            DeviceConfig::Tcp {
                host: String::from(DEFAULT_HOST),
                port: 2400,
                protocol: TcpProtocol::Raw,
            }
        );

        let config = TpmConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, TpmConfig::default());
    }

    #[test]
    fn test_builders() {
        let config = TpmConfig::default()
            .with_locality(3)
            .with_timeout(None);
        assert_eq!(config.locality, 3);
        assert_eq!(config.timeout, None);
    }
}
