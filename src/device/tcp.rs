use crate::device::errors::DeviceIoError;
use crate::device::raw::TpmDeviceOps;
use crate::tpm2::commands::commands::TPM_HEADER_SIZE;
use crate::tpm2::serialization::inout::MAX_RESPONSE_SIZE;
use bytebuffer::ByteBuffer;
use log::{debug, trace};
use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::result;
use std::time::Duration;

// Command of the TCG simulator protocol carrying a TPM command
const TPM_SEND_COMMAND: u32 = 8;

// TcpProtocol selects how TPM commands are framed on the socket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TcpProtocol {
    // Bare TPM commands and responses, as swtpm speaks them
    Raw,
    // TCG reference simulator framing (TPM_SEND_COMMAND, locality, length)
    Mssim,
}

// TpmSwtpmIO implements communication with a software TPM via socket
pub struct TpmSwtpmIO {
    host: String,
    port: u16,
    protocol: TcpProtocol,
    locality: u8,
    timeout: Option<Duration>,
    stream: Option<TcpStream>,
}

impl TpmSwtpmIO {
    pub fn new(
        host: String,
        port: u16,
        protocol: TcpProtocol,
        locality: u8,
        timeout: Option<Duration>,
    ) -> Self {
        TpmSwtpmIO {
            host,
            port,
            protocol,
            locality,
            timeout,
            stream: None,
        }
    }

    fn connect(&self) -> result::Result<TcpStream, DeviceIoError> {
        let stream = match self.timeout {
            None => TcpStream::connect((self.host.as_str(), self.port))?,
            Some(timeout) => {
                let mut last_err = None;
                let mut connected = None;
                for addr in (self.host.as_str(), self.port).to_socket_addrs()? {
                    match TcpStream::connect_timeout(&addr, timeout) {
                        Ok(s) => {
                            connected = Some(s);
                            break;
                        }
                        Err(err) => last_err = Some(err),
                    }
                }
                match (connected, last_err) {
                    (Some(s), _) => s,
                    (None, Some(err)) => return Err(err.into()),
                    (None, None) => {
                        return Err(DeviceIoError {
                            msg: format!("{} does not resolve to any address", self.host),
                        })
                    }
                }
            }
        };
        stream.set_read_timeout(self.timeout)?;
        stream.set_write_timeout(self.timeout)?;
        stream.set_nodelay(true)?;
        debug!("connected to TPM at {}:{}", self.host, self.port);
        Ok(stream)
    }

    fn exchange(&mut self, command: &[u8]) -> result::Result<Vec<u8>, DeviceIoError> {
        if self.stream.is_none() {
            let stream = self.connect().map_err(|err| DeviceIoError {
                msg: format!(
                    "could not open TPM stream connection to {}:{}: {}",
                    self.host, self.port, err.msg
                ),
            })?;
            self.stream = Some(stream);
        }
        let protocol = self.protocol;
        let locality = self.locality;
        match &mut self.stream {
            None => Err(DeviceIoError {
                msg: String::from("stream is not configured for writing"),
            }),
            Some(s) => match protocol {
                TcpProtocol::Raw => exchange_raw(s, command),
                TcpProtocol::Mssim => exchange_mssim(s, locality, command),
            },
        }
    }
}

impl TpmDeviceOps for TpmSwtpmIO {
    fn send_recv(&mut self, command: &[u8]) -> result::Result<Vec<u8>, DeviceIoError> {
        let result = self.exchange(command);
        if result.is_err() {
            // the stream may be out of sync, start over on the next command
            self.stream = None;
        }
        result
    }
}

fn check_response_size(size: usize) -> result::Result<(), DeviceIoError> {
    if size < TPM_HEADER_SIZE || size > MAX_RESPONSE_SIZE {
        return Err(DeviceIoError {
            msg: format!(
                "TPM announced a response of {} bytes, expected {}..={}",
                size, TPM_HEADER_SIZE, MAX_RESPONSE_SIZE
            ),
        });
    }
    Ok(())
}

fn exchange_raw<S: Read + Write>(
    stream: &mut S,
    command: &[u8],
) -> result::Result<Vec<u8>, DeviceIoError> {
    stream.write_all(command)?;

    let mut header = [0u8; TPM_HEADER_SIZE];
    stream.read_exact(&mut header)?;
    let mut header_buff = ByteBuffer::from_bytes(&header);
    let _tag = header_buff.read_u16()?;
    let size = header_buff.read_u32()? as usize;
    check_response_size(size)?;

    let mut response = vec![0u8; size];
    response[..TPM_HEADER_SIZE].copy_from_slice(&header);
    stream.read_exact(&mut response[TPM_HEADER_SIZE..])?;
    Ok(response)
}

fn exchange_mssim<S: Read + Write>(
    stream: &mut S,
    locality: u8,
    command: &[u8],
) -> result::Result<Vec<u8>, DeviceIoError> {
    let mut frame = ByteBuffer::new();
    frame.write_u32(TPM_SEND_COMMAND);
    frame.write_u8(locality);
    frame.write_u32(command.len() as u32);
    frame.write_bytes(command);
    trace!("mssim frame: {}", hex::encode(frame.as_bytes()));
    stream.write_all(frame.as_bytes())?;

    let mut size_field = [0u8; 4];
    stream.read_exact(&mut size_field)?;
    let size = ByteBuffer::from_bytes(&size_field).read_u32()? as usize;
    check_response_size(size)?;

    let mut response = vec![0u8; size];
    stream.read_exact(&mut response)?;

    let mut ack_field = [0u8; 4];
    stream.read_exact(&mut ack_field)?;
    let ack = ByteBuffer::from_bytes(&ack_field).read_u32()?;
    if ack != 0 {
        return Err(DeviceIoError {
            msg: format!("simulator did not acknowledge the command: {:#x}", ack),
        });
    }
    Ok(response)
}
