use crate::device::errors::DeviceIoError;
use crate::tpm2::serialization::inout::MAX_RESPONSE_SIZE;
use log::debug;
use std::fs::File;
use std::fs::OpenOptions;
use std::io;
use std::io::{Error, ErrorKind};
use std::path::PathBuf;
use std::result;

// Define a combined ReadWrite trait.
pub trait ReadWrite: io::Read + io::Write {}
impl<T: io::Read + io::Write> ReadWrite for T {}

// TpmDeviceOps is a trait defining operations supported by TPM devices. One
// command is outstanding at a time, the call blocks until the whole response
// has been read back.
pub trait TpmDeviceOps {
    fn send_recv(&mut self, command: &[u8]) -> result::Result<Vec<u8>, DeviceIoError>;
}

impl<T: TpmDeviceOps + ?Sized> TpmDeviceOps for Box<T> {
    fn send_recv(&mut self, command: &[u8]) -> result::Result<Vec<u8>, DeviceIoError> {
        (**self).send_recv(command)
    }
}

// TpmRawIO implements communication with the TPM via /dev/tpm* device file
pub struct TpmRawIO {
    path: PathBuf,
    device_file: Option<File>,
}

impl TpmRawIO {
    pub fn new(path: PathBuf) -> Self {
        TpmRawIO {
            path,
            device_file: None,
        }
    }

    fn device_file(&mut self) -> io::Result<&mut File> {
        if self.device_file.is_none() {
            let f = OpenOptions::new()
                .read(true)
                .write(true)
                .open(&self.path)
                .map_err(|err| {
                    Error::new(
                        err.kind(),
                        format!("could not open {}: {}", self.path.display(), err),
                    )
                })?;
            debug!("opened TPM device {}", self.path.display());
            self.device_file = Some(f);
        }
        match &mut self.device_file {
            Some(f) => Ok(f),
            None => Err(Error::new(ErrorKind::Other, "device file is not set")),
        }
    }
}

// Implementation of ReadWrite trait for TpmRawIO
impl io::Read for TpmRawIO {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.device_file {
            None => Err(Error::new(
                ErrorKind::NotConnected,
                "device file not open for reading",
            )),
            Some(f) => io::Read::read(f, buf),
        }
    }
}

impl io::Write for TpmRawIO {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let f = self.device_file()?;
        io::Write::write_all(f, buf).map_err(|err| {
            Error::new(
                err.kind(),
                format!("could not write buffer to TPM device: {}", err),
            )
        })?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

// TpmDevice represents a TPM device implementing I/O operation
// via internal rw object. Every read on rw is expected to return one whole
// response, which is how the kernel TPM character devices behave.
pub struct TpmDevice<RW: ReadWrite> {
    pub rw: RW,
}

impl<RW: ReadWrite> TpmDeviceOps for TpmDevice<RW> {
    fn send_recv(&mut self, command: &[u8]) -> result::Result<Vec<u8>, DeviceIoError> {
        self.rw.write_all(command).map_err(|err| DeviceIoError {
            msg: format!("could not write command to TPM: {}", err),
        })?;

        let mut buff_in = vec![0u8; MAX_RESPONSE_SIZE];
        let n = self.rw.read(&mut buff_in).map_err(|err| DeviceIoError {
            msg: format!("could not read answer from TPM: {}", err),
        })?;
        if n == 0 {
            return Err(DeviceIoError {
                msg: String::from("TPM closed the connection without answering"),
            });
        }
        buff_in.truncate(n);
        Ok(buff_in)
    }
}
