use std::io;
use thiserror::Error;

// DeviceIoError is an error encountered while talking to the TPM. What went
// wrong is opaque to the command layer.
#[derive(Debug, Error)]
#[error("DeviceIoError: {msg}")]
pub struct DeviceIoError {
    pub msg: String,
}

impl From<io::Error> for DeviceIoError {
    fn from(e: io::Error) -> Self {
        Self { msg: e.to_string() }
    }
}
