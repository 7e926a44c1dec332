use crate::tpm2::commands::commands::ResponseHeader;
use crate::tpm2::errors::{CommandError, DecodeError, TpmCommandError};
use crate::tpm2::rc::TpmRc;
use crate::tpm2::serialization::inout::{ReadCursor, Tpm2StructIn, MAX_RESPONSE_SIZE};
use crate::tpm2::types::tcg;
use std::result;

// ResponseFrame is a validated response whose parameter area has not been
// interpreted yet. It borrows the raw response bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseFrame<'a> {
    pub tag: tcg::TpmSt,
    pub response_size: u32,
    pub response_code: TpmRc,
    pub handles: Vec<tcg::Handle>,
    pub parameters: &'a [u8],
    pub sessions: Vec<tcg::TpmsAuthResponse>,
}

// parse_response validates a response for a command without response handles
pub fn parse_response(
    raw: &[u8],
    expects_sessions: bool,
) -> result::Result<ResponseFrame<'_>, CommandError> {
    parse_response_with_handles(raw, expects_sessions, 0)
}

// parse_response_with_handles validates the response header, stops at a
// non-success response code and otherwise splits the rest of the response
// into handles, parameter area and session area
pub fn parse_response_with_handles(
    raw: &[u8],
    expects_sessions: bool,
    handle_count: usize,
) -> result::Result<ResponseFrame<'_>, CommandError> {
    if raw.len() > MAX_RESPONSE_SIZE {
        return Err(DecodeError::Oversized {
            size: raw.len(),
            limit: MAX_RESPONSE_SIZE,
        }
        .into());
    }

    let mut buff = ReadCursor::new(raw);
    let mut header = ResponseHeader::default();
    header.unpack(&mut buff)?;

    if header.response_size as usize != raw.len() {
        return Err(DecodeError::MalformedResponse {
            msg: format!(
                "response declares {} bytes, {} received",
                header.response_size,
                raw.len()
            ),
        }
        .into());
    }

    // Nothing is guaranteed to follow a failing response code
    if !header.response_code.is_success() {
        return Err(TpmCommandError {
            rc: header.response_code,
        }
        .into());
    }

    let expected_tag = if expects_sessions {
        tcg::TPM_ST_SESSIONS
    } else {
        tcg::TPM_ST_NO_SESSIONS
    };
    if header.tag != expected_tag {
        return Err(DecodeError::MalformedResponse {
            msg: format!(
                "unexpected tag {:#06x}, expected {:#06x}",
                header.tag, expected_tag
            ),
        }
        .into());
    }

    let mut handles = Vec::with_capacity(handle_count);
    for _ in 0..handle_count {
        let mut handle: tcg::Handle = 0;
        handle.unpack(&mut buff)?;
        handles.push(handle);
    }

    if !expects_sessions {
        return Ok(ResponseFrame {
            tag: header.tag,
            response_size: header.response_size,
            response_code: header.response_code,
            handles,
            parameters: buff.read_rest(),
            sessions: Vec::new(),
        });
    }

    let mut parameter_size: u32 = 0;
    parameter_size.unpack(&mut buff)?;
    let parameters = buff.read_bytes(parameter_size as usize)?;

    let mut sessions = Vec::new();
    while !buff.is_empty() {
        let mut session = tcg::TpmsAuthResponse::default();
        session.unpack(&mut buff)?;
        sessions.push(session);
    }

    Ok(ResponseFrame {
        tag: header.tag,
        response_size: header.response_size,
        response_code: header.response_code,
        handles,
        parameters,
        sessions,
    })
}
