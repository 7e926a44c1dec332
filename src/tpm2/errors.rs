use crate::device::errors::DeviceIoError;
use crate::tpm2::rc::TpmRc;
use thiserror::Error;

// EncodeError is an error encountered while serializing a TPM command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EncodeError {
    #[error("buffer full: {needed} bytes needed, {remaining} remaining")]
    BufferFull { needed: usize, remaining: usize },

    #[error("value of {size} bytes does not fit a field of at most {max} bytes")]
    Oversized { size: usize, max: usize },

    #[error("no size field reserved at offset {offset}")]
    Unreserved { offset: usize },
}

// DecodeError is an error encountered while deserializing a TPM response
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("truncated input: {needed} bytes needed, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },

    #[error("malformed response: {msg}")]
    MalformedResponse { msg: String },

    #[error("size mismatch: {declared} bytes declared, {consumed} consumed")]
    SizeMismatch { declared: usize, consumed: usize },

    #[error("size {size} exceeds limit of {limit} bytes")]
    Oversized { size: usize, limit: usize },
}

// LocalError is a failure which originated on this side of the transport.
// It is never transient.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocalError {
    #[error("SerializationError: {0}")]
    Encode(#[from] EncodeError),

    #[error("DeserializationError: {0}")]
    Decode(#[from] DecodeError),
}

// TpmCommandError wraps a response code reported by the TPM
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("TpmCommandError: {rc}")]
pub struct TpmCommandError {
    pub rc: TpmRc,
}

// ErrorClass tells apart the three disjoint sources of failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Local,
    Transport,
    Device,
}

// CommandError is an error raised while running a command towards the TPM
#[derive(Debug, Error)]
pub enum CommandError {
    #[error(transparent)]
    Local(#[from] LocalError),

    #[error(transparent)]
    Transport(#[from] DeviceIoError),

    #[error(transparent)]
    Device(#[from] TpmCommandError),
}

impl From<EncodeError> for CommandError {
    fn from(err: EncodeError) -> Self {
        CommandError::Local(LocalError::Encode(err))
    }
}

impl From<DecodeError> for CommandError {
    fn from(err: DecodeError) -> Self {
        CommandError::Local(LocalError::Decode(err))
    }
}

impl CommandError {
    pub fn class(&self) -> ErrorClass {
        match self {
            CommandError::Local(_) => ErrorClass::Local,
            CommandError::Transport(_) => ErrorClass::Transport,
            CommandError::Device(_) => ErrorClass::Device,
        }
    }

    // response_code returns the raw code reported by the TPM, if any
    pub fn response_code(&self) -> Option<TpmRc> {
        match self {
            CommandError::Device(err) => Some(err.rc),
            _ => None,
        }
    }

    // is_transient reports whether issuing the same command again could
    // succeed. Only transport failures qualify, device codes are left to
    // the caller.
    pub fn is_transient(&self) -> bool {
        self.class() == ErrorClass::Transport
    }
}
