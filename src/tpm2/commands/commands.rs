use crate::tpm2::errors::{DecodeError, EncodeError};
use crate::tpm2::rc::TpmRc;
use crate::tpm2::serialization::inout;
use crate::tpm2::serialization::inout::{
    ReadCursor, Tpm2StructOut, WriteCursor, MAX_COMMAND_SIZE,
};
use crate::tpm2::types::tcg;
use std::convert::TryFrom;
use std::result;

// Size of tag, size and command/response code
pub const TPM_HEADER_SIZE: usize = 10;

#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandHeader {
    pub tag: tcg::TpmiStCommandTag,
    pub command_size: u32,
    pub command_code: tcg::TpmCc,
}

impl inout::Tpm2StructOut for CommandHeader {
    fn pack(&self, buff: &mut WriteCursor<'_>) -> result::Result<(), EncodeError> {
        self.tag.pack(buff)?;
        self.command_size.pack(buff)?;
        self.command_code.pack(buff)
    }
}

impl inout::Tpm2StructIn for CommandHeader {
    fn unpack(&mut self, buff: &mut ReadCursor<'_>) -> result::Result<(), DecodeError> {
        inout::Tpm2StructIn::unpack(&mut self.tag, buff)?;
        inout::Tpm2StructIn::unpack(&mut self.command_size, buff)?;
        inout::Tpm2StructIn::unpack(&mut self.command_code, buff)
    }
}

#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseHeader {
    pub tag: tcg::TpmSt,
    pub response_size: u32,
    pub response_code: TpmRc,
}

impl inout::Tpm2StructOut for ResponseHeader {
    fn pack(&self, buff: &mut WriteCursor<'_>) -> result::Result<(), EncodeError> {
        self.tag.pack(buff)?;
        self.response_size.pack(buff)?;
        self.response_code.pack(buff)
    }
}

impl inout::Tpm2StructIn for ResponseHeader {
    fn unpack(&mut self, buff: &mut ReadCursor<'_>) -> result::Result<(), DecodeError> {
        inout::Tpm2StructIn::unpack(&mut self.tag, buff)?;
        inout::Tpm2StructIn::unpack(&mut self.response_size, buff)?;
        inout::Tpm2StructIn::unpack(&mut self.response_code, buff)
    }
}

fn size_field(size: usize) -> result::Result<u32, EncodeError> {
    u32::try_from(size).map_err(|_| EncodeError::Oversized {
        size,
        max: u32::MAX as usize,
    })
}

// encode_command lays out the whole command frame. Both size fields are
// written as placeholders and patched once their content is in place.
fn encode_command(
    buff: &mut WriteCursor<'_>,
    command_code: tcg::TpmCc,
    handles: &[tcg::Handle],
    auths: &[tcg::TpmsAuthCommand],
    params: &[&dyn Tpm2StructOut],
) -> result::Result<(), EncodeError> {
    let tag = if auths.is_empty() {
        tcg::TPM_ST_NO_SESSIONS
    } else {
        tcg::TPM_ST_SESSIONS
    };
    tag.pack(buff)?;
    let command_size = buff.reserve_u32()?;
    command_code.pack(buff)?;

    for handle in handles.iter() {
        handle.pack(buff)?;
    }

    if !auths.is_empty() {
        let auth_size = buff.reserve_u32()?;
        for auth in auths.iter() {
            auth.pack(buff)?;
        }
        let size = size_field(buff.written_since(auth_size))?;
        buff.patch_u32(auth_size, size)?;
    }

    inout::pack(params, buff)?;

    let size = size_field(buff.len())?;
    buff.patch_u32(command_size, size)
}

// build_command_into serializes a command into a caller provided buffer and
// returns the number of bytes used. On failure the buffer is left zeroed.
pub fn build_command_into(
    buffer: &mut [u8],
    command_code: tcg::TpmCc,
    handles: &[tcg::Handle],
    auths: &[tcg::TpmsAuthCommand],
    params: &[&dyn Tpm2StructOut],
) -> result::Result<usize, EncodeError> {
    let mut buff = WriteCursor::new(buffer);
    match encode_command(&mut buff, command_code, handles, auths, params) {
        Ok(()) => Ok(buff.len()),
        Err(err) => {
            buff.scrub();
            Err(err)
        }
    }
}

// build_command serializes a command into a MAX_COMMAND_SIZE scratch buffer
pub fn build_command(
    command_code: tcg::TpmCc,
    handles: &[tcg::Handle],
    auths: &[tcg::TpmsAuthCommand],
    params: &[&dyn Tpm2StructOut],
) -> result::Result<Vec<u8>, EncodeError> {
    let mut buffer = [0u8; MAX_COMMAND_SIZE];
    let size = build_command_into(&mut buffer, command_code, handles, auths, params)?;
    Ok(buffer[..size].to_vec())
}
