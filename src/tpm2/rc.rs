use crate::tpm2::errors::{DecodeError, EncodeError};
use crate::tpm2::serialization::inout::{ReadCursor, Tpm2StructIn, Tpm2StructOut, WriteCursor};
use std::fmt;
use std::result;

const RC_VER1: u32 = 0x100;
const RC_FMT1: u32 = 0x080;
const RC_WARN: u32 = 0x900;

const RC_FMT1_ERROR_MASK: u32 = 0x03F;
const RC_FMT0_MASK: u32 = 0xFFF;
const RC_P: u32 = 0x040;
const RC_S: u32 = 0x800;
const RC_N_SHIFT: u32 = 8;
const RC_N_MASK: u32 = 0xF;
const RC_VENDOR: u32 = 0x400;

// TpmRc is a TPM response code. Format-one codes also point at the handle,
// session or parameter that caused the failure.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TpmRc(pub u32);

impl TpmRc {
    pub const SUCCESS: TpmRc = TpmRc(0x000);
    pub const BAD_TAG: TpmRc = TpmRc(0x01E);

    // format-zero errors
    pub const INITIALIZE: TpmRc = TpmRc(RC_VER1);
    pub const FAILURE: TpmRc = TpmRc(RC_VER1 + 0x001);
    pub const SEQUENCE: TpmRc = TpmRc(RC_VER1 + 0x003);
    pub const DISABLED: TpmRc = TpmRc(RC_VER1 + 0x020);
    pub const AUTH_TYPE: TpmRc = TpmRc(RC_VER1 + 0x024);
    pub const AUTH_MISSING: TpmRc = TpmRc(RC_VER1 + 0x025);
    pub const POLICY: TpmRc = TpmRc(RC_VER1 + 0x026);
    pub const PCR_CHANGED: TpmRc = TpmRc(RC_VER1 + 0x028);
    pub const COMMAND_SIZE: TpmRc = TpmRc(RC_VER1 + 0x042);
    pub const COMMAND_CODE: TpmRc = TpmRc(RC_VER1 + 0x043);
    pub const AUTHSIZE: TpmRc = TpmRc(RC_VER1 + 0x044);
    pub const AUTH_CONTEXT: TpmRc = TpmRc(RC_VER1 + 0x045);
    pub const CPHASH: TpmRc = TpmRc(RC_VER1 + 0x051);

    // format-one errors
    pub const VALUE: TpmRc = TpmRc(RC_FMT1 + 0x004);
    pub const HIERARCHY: TpmRc = TpmRc(RC_FMT1 + 0x005);
    pub const HANDLE: TpmRc = TpmRc(RC_FMT1 + 0x00B);
    pub const AUTH_FAIL: TpmRc = TpmRc(RC_FMT1 + 0x00E);
    pub const NONCE: TpmRc = TpmRc(RC_FMT1 + 0x00F);
    pub const SIZE: TpmRc = TpmRc(RC_FMT1 + 0x015);
    pub const TAG: TpmRc = TpmRc(RC_FMT1 + 0x017);
    pub const POLICY_FAIL: TpmRc = TpmRc(RC_FMT1 + 0x01D);
    pub const BAD_AUTH: TpmRc = TpmRc(RC_FMT1 + 0x022);
    pub const EXPIRED: TpmRc = TpmRc(RC_FMT1 + 0x023);
    pub const POLICY_CC: TpmRc = TpmRc(RC_FMT1 + 0x024);

    // warnings
    pub const CONTEXT_GAP: TpmRc = TpmRc(RC_WARN + 0x001);
    pub const OBJECT_MEMORY: TpmRc = TpmRc(RC_WARN + 0x002);
    pub const SESSION_MEMORY: TpmRc = TpmRc(RC_WARN + 0x003);
    pub const MEMORY: TpmRc = TpmRc(RC_WARN + 0x004);
    pub const YIELDED: TpmRc = TpmRc(RC_WARN + 0x008);
    pub const CANCELED: TpmRc = TpmRc(RC_WARN + 0x009);
    pub const TESTING: TpmRc = TpmRc(RC_WARN + 0x00A);
    pub const LOCKOUT: TpmRc = TpmRc(RC_WARN + 0x021);
    pub const RETRY: TpmRc = TpmRc(RC_WARN + 0x022);

    pub fn is_success(self) -> bool {
        self == TpmRc::SUCCESS
    }

    pub fn is_format_one(self) -> bool {
        self.0 & RC_FMT1 != 0
    }

    pub fn is_warning(self) -> bool {
        !self.is_format_one() && self.0 & RC_WARN == RC_WARN
    }

    pub fn is_vendor(self) -> bool {
        !self.is_format_one() && self.0 & RC_VENDOR != 0
    }

    // base strips the handle, session and parameter number of format-one
    // codes so that it can be compared against the constants above
    pub fn base(self) -> TpmRc {
        if self.is_format_one() {
            TpmRc(RC_FMT1 | (self.0 & RC_FMT1_ERROR_MASK))
        } else {
            TpmRc(self.0 & RC_FMT0_MASK)
        }
    }

    fn number(self) -> u8 {
        ((self.0 >> RC_N_SHIFT) & RC_N_MASK) as u8
    }

    // parameter returns the 1-based index of the offending parameter
    pub fn parameter(self) -> Option<u8> {
        if self.is_format_one() && self.0 & RC_P != 0 {
            Some(self.number())
        } else {
            None
        }
    }

    // handle returns the 1-based index of the offending handle
    pub fn handle(self) -> Option<u8> {
        if self.is_format_one() && self.0 & (RC_P | RC_S) == 0 && self.number() != 0 {
            Some(self.number())
        } else {
            None
        }
    }

    // session returns the 1-based index of the offending session
    pub fn session(self) -> Option<u8> {
        if self.is_format_one() && self.0 & RC_P == 0 && self.0 & RC_S != 0 {
            Some(self.number() & 0x7)
        } else {
            None
        }
    }

    pub fn name(self) -> Option<&'static str> {
        let name = match self.base() {
            TpmRc::SUCCESS => "TPM_RC_SUCCESS",
            TpmRc::BAD_TAG => "TPM_RC_BAD_TAG",
            TpmRc::INITIALIZE => "TPM_RC_INITIALIZE",
            TpmRc::FAILURE => "TPM_RC_FAILURE",
            TpmRc::SEQUENCE => "TPM_RC_SEQUENCE",
            TpmRc::DISABLED => "TPM_RC_DISABLED",
            TpmRc::AUTH_TYPE => "TPM_RC_AUTH_TYPE",
            TpmRc::AUTH_MISSING => "TPM_RC_AUTH_MISSING",
            TpmRc::POLICY => "TPM_RC_POLICY",
            TpmRc::PCR_CHANGED => "TPM_RC_PCR_CHANGED",
            TpmRc::COMMAND_SIZE => "TPM_RC_COMMAND_SIZE",
            TpmRc::COMMAND_CODE => "TPM_RC_COMMAND_CODE",
            TpmRc::AUTHSIZE => "TPM_RC_AUTHSIZE",
            TpmRc::AUTH_CONTEXT => "TPM_RC_AUTH_CONTEXT",
            TpmRc::CPHASH => "TPM_RC_CPHASH",
            TpmRc::VALUE => "TPM_RC_VALUE",
            TpmRc::HIERARCHY => "TPM_RC_HIERARCHY",
            TpmRc::HANDLE => "TPM_RC_HANDLE",
            TpmRc::AUTH_FAIL => "TPM_RC_AUTH_FAIL",
            TpmRc::NONCE => "TPM_RC_NONCE",
            TpmRc::SIZE => "TPM_RC_SIZE",
            TpmRc::TAG => "TPM_RC_TAG",
            TpmRc::POLICY_FAIL => "TPM_RC_POLICY_FAIL",
            TpmRc::BAD_AUTH => "TPM_RC_BAD_AUTH",
            TpmRc::EXPIRED => "TPM_RC_EXPIRED",
            TpmRc::POLICY_CC => "TPM_RC_POLICY_CC",
            TpmRc::CONTEXT_GAP => "TPM_RC_CONTEXT_GAP",
            TpmRc::OBJECT_MEMORY => "TPM_RC_OBJECT_MEMORY",
            TpmRc::SESSION_MEMORY => "TPM_RC_SESSION_MEMORY",
            TpmRc::MEMORY => "TPM_RC_MEMORY",
            TpmRc::YIELDED => "TPM_RC_YIELDED",
            TpmRc::CANCELED => "TPM_RC_CANCELED",
            TpmRc::TESTING => "TPM_RC_TESTING",
            TpmRc::LOCKOUT => "TPM_RC_LOCKOUT",
            TpmRc::RETRY => "TPM_RC_RETRY",
            _ => return None,
        };
        Some(name)
    }
}

impl fmt::Display for TpmRc {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{} ({:#010x})", name, self.0)?,
            None => write!(f, "unknown response code ({:#010x})", self.0)?,
        }
        if let Some(n) = self.parameter() {
            write!(f, ", parameter {}", n)?;
        } else if let Some(n) = self.session() {
            write!(f, ", session {}", n)?;
        } else if let Some(n) = self.handle() {
            write!(f, ", handle {}", n)?;
        }
        Ok(())
    }
}

impl From<u32> for TpmRc {
    fn from(code: u32) -> Self {
        TpmRc(code)
    }
}

impl Tpm2StructOut for TpmRc {
    fn pack(&self, buff: &mut WriteCursor<'_>) -> result::Result<(), EncodeError> {
        self.0.pack(buff)
    }
}

impl Tpm2StructIn for TpmRc {
    fn unpack(&mut self, buff: &mut ReadCursor<'_>) -> result::Result<(), DecodeError> {
        self.0.unpack(buff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_one_parameter() {
        // TPM_RC_SIZE on the second parameter
        let rc = TpmRc(0x2D5);
        assert!(rc.is_format_one());
        assert_eq!(rc.base(), TpmRc::SIZE);
        assert_eq!(rc.parameter(), Some(2));
        assert_eq!(rc.session(), None);
        assert_eq!(rc.handle(), None);
        assert_eq!(rc.to_string(), "TPM_RC_SIZE (0x000002d5), parameter 2");
    }

    #[test]
    fn test_format_one_session() {
        // TPM_RC_NONCE on the first session
        let rc = TpmRc(0x98F);
        assert_eq!(rc.base(), TpmRc::NONCE);
        assert_eq!(rc.session(), Some(1));
        assert_eq!(rc.parameter(), None);
        assert!(!rc.is_warning());
    }

    #[test]
    fn test_format_one_handle() {
        // TPM_RC_HANDLE on the first handle
        let rc = TpmRc(0x18B);
        assert_eq!(rc.base(), TpmRc::HANDLE);
        assert_eq!(rc.handle(), Some(1));
        assert_eq!(rc.to_string(), "TPM_RC_HANDLE (0x0000018b), handle 1");
    }

    #[test]
    fn test_expired_is_distinct_from_nonce() {
        assert_ne!(TpmRc(0x9A3).base(), TpmRc(0x98F).base());
        assert_eq!(TpmRc(0x9A3).base(), TpmRc::EXPIRED);
    }

    #[test]
    fn test_format_zero() {
        assert_eq!(TpmRc::CPHASH.0, 0x151);
        assert!(!TpmRc::CPHASH.is_format_one());
        assert_eq!(TpmRc::CPHASH.base(), TpmRc::CPHASH);
        assert_eq!(TpmRc::INITIALIZE.name(), Some("TPM_RC_INITIALIZE"));
    }

    #[test]
    fn test_warning() {
        assert!(TpmRc::RETRY.is_warning());
        assert!(TpmRc::TESTING.is_warning());
        assert!(!TpmRc::FAILURE.is_warning());
    }

    #[test]
    fn test_unknown_code() {
        let rc = TpmRc(0x17F);
        assert_eq!(rc.name(), None);
        assert_eq!(rc.to_string(), "unknown response code (0x0000017f)");
    }
}
