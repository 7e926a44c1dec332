use crate::tpm2::errors::{DecodeError, EncodeError};
use crate::tpm2::serialization::inout::{ReadCursor, Tpm2StructIn, Tpm2StructOut, WriteCursor};
use std::result;

// Types
pub type TpmiStCommandTag = u16;
pub type TpmSt = u16;
pub type TpmCc = u32;
pub type TpmAlgId = u16;
pub type TpmSu = u16;
pub type TpmSe = u8;
pub type TpmaSession = u8;
pub type Handle = u32;
pub type TpmiDhEntity = Handle;
pub type TpmiDhContext = Handle;
pub type TpmiDhObject = Handle;
pub type TpmiShAuthSession = Handle;
pub type TpmiShPolicy = Handle;
pub type TpmiAlgHash = TpmAlgId;

// TPM2 command codes
pub const TPM_CC_STARTUP: TpmCc = 0x00000144;
pub const TPM_CC_POLICY_SECRET: TpmCc = 0x00000151;
pub const TPM_CC_FLUSH_CONTEXT: TpmCc = 0x00000165;
pub const TPM_CC_START_AUTH_SESSION: TpmCc = 0x00000176;
pub const TPM_CC_GET_RANDOM: TpmCc = 0x0000017B;

// Structure tags
pub const TPM_ST_RSP_COMMAND: TpmSt = 0x00C4;
pub const TPM_ST_NO_SESSIONS: TpmiStCommandTag = 0x8001;
pub const TPM_ST_SESSIONS: TpmiStCommandTag = 0x8002;
pub const TPM_ST_AUTH_SECRET: TpmSt = 0x8023;

// Startup types
pub const TPM_SU_CLEAR: TpmSu = 0x0000;
pub const TPM_SU_STATE: TpmSu = 0x0001;

// Session types
pub const TPM_SE_HMAC: TpmSe = 0x00;
pub const TPM_SE_POLICY: TpmSe = 0x01;
pub const TPM_SE_TRIAL: TpmSe = 0x03;

// Algorithms
pub const TPM_ALG_AES: TpmAlgId = 0x0006;
pub const TPM_ALG_SHA256: TpmAlgId = 0x000B;
pub const TPM_ALG_NULL: TpmAlgId = 0x0010;
pub const TPM_ALG_CFB: TpmAlgId = 0x0043;

// Permanent handles
pub const TPM_RH_OWNER: Handle = 0x40000001;
pub const TPM_RH_NULL: Handle = 0x40000007;
pub const TPM_RS_PW: Handle = 0x40000009;
pub const TPM_RH_LOCKOUT: Handle = 0x4000000A;
pub const TPM_RH_ENDORSEMENT: Handle = 0x4000000B;
pub const TPM_RH_PLATFORM: Handle = 0x4000000C;

// Session attributes
pub const TPMA_SESSION_CONTINUE_SESSION: TpmaSession = 0x01;
pub const TPMA_SESSION_AUDIT_EXCLUSIVE: TpmaSession = 0x02;
pub const TPMA_SESSION_AUDIT_RESET: TpmaSession = 0x04;
pub const TPMA_SESSION_DECRYPT: TpmaSession = 0x20;
pub const TPMA_SESSION_ENCRYPT: TpmaSession = 0x40;
pub const TPMA_SESSION_AUDIT: TpmaSession = 0x80;

// Size limits of the variable length buffers
pub const MAX_HASH_SIZE: usize = 64;
pub const MAX_TIMEOUT_SIZE: usize = 8;
pub const MAX_ENCRYPTED_SECRET_SIZE: usize = 512;

// tpm2b defines a size-prefixed byte buffer (TPM2B_*). The content length is
// bounded by $max both when building the value and when decoding it.
macro_rules! tpm2b {
    ($name: ident, $max: expr) => {
        #[derive(Default, Debug, Clone, PartialEq, Eq)]
        pub struct $name {
            buffer: Vec<u8>,
        }

        impl $name {
            pub const MAX_SIZE: usize = $max;

            pub fn new() -> Self {
                Default::default()
            }

            pub fn from_slice(bytes: &[u8]) -> result::Result<Self, EncodeError> {
                if bytes.len() > Self::MAX_SIZE {
                    return Err(EncodeError::Oversized {
                        size: bytes.len(),
                        max: Self::MAX_SIZE,
                    });
                }
                Ok($name {
                    buffer: bytes.to_vec(),
                })
            }

            pub fn as_bytes(&self) -> &[u8] {
                &self.buffer
            }

            pub fn len(&self) -> usize {
                self.buffer.len()
            }

            pub fn is_empty(&self) -> bool {
                self.buffer.is_empty()
            }
        }

        impl Tpm2StructOut for $name {
            fn pack(&self, buff: &mut WriteCursor<'_>) -> result::Result<(), EncodeError> {
                // from_slice keeps the length within MAX_SIZE, far below u16::MAX
                (self.buffer.len() as u16).pack(buff)?;
                buff.write_bytes(&self.buffer)
            }
        }

        impl Tpm2StructIn for $name {
            fn unpack(&mut self, buff: &mut ReadCursor<'_>) -> result::Result<(), DecodeError> {
                let mut size: u16 = 0;
                size.unpack(buff)?;
                if size as usize > Self::MAX_SIZE {
                    return Err(DecodeError::Oversized {
                        size: size as usize,
                        limit: Self::MAX_SIZE,
                    });
                }
                self.buffer = buff.read_bytes(size as usize)?.to_vec();
                Ok(())
            }
        }
    };
}

tpm2b! { Tpm2bDigest, MAX_HASH_SIZE }
tpm2b! { Tpm2bNonce, MAX_HASH_SIZE }
tpm2b! { Tpm2bAuth, MAX_HASH_SIZE }
tpm2b! { Tpm2bTimeout, MAX_TIMEOUT_SIZE }
tpm2b! { Tpm2bEncryptedSecret, MAX_ENCRYPTED_SECRET_SIZE }

// TPMS_AUTH_COMMAND, one entry of the command authorization area
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct TpmsAuthCommand {
    pub session_handle: TpmiShAuthSession,
    pub nonce: Tpm2bNonce,
    pub session_attributes: TpmaSession,
    pub hmac: Tpm2bAuth,
}

impl TpmsAuthCommand {
    // password builds a password authorization (TPM_RS_PW) carrying the
    // plain text authorization value of the entity
    pub fn password(auth: &[u8]) -> result::Result<Self, EncodeError> {
        Ok(TpmsAuthCommand {
            session_handle: TPM_RS_PW,
            nonce: Tpm2bNonce::new(),
            session_attributes: TPMA_SESSION_CONTINUE_SESSION,
            hmac: Tpm2bAuth::from_slice(auth)?,
        })
    }
}

impl Tpm2StructOut for TpmsAuthCommand {
    fn pack(&self, buff: &mut WriteCursor<'_>) -> result::Result<(), EncodeError> {
        self.session_handle.pack(buff)?;
        self.nonce.pack(buff)?;
        self.session_attributes.pack(buff)?;
        self.hmac.pack(buff)
    }
}

impl Tpm2StructIn for TpmsAuthCommand {
    fn unpack(&mut self, buff: &mut ReadCursor<'_>) -> result::Result<(), DecodeError> {
        self.session_handle.unpack(buff)?;
        self.nonce.unpack(buff)?;
        self.session_attributes.unpack(buff)?;
        self.hmac.unpack(buff)
    }
}

// TPMS_AUTH_RESPONSE, one entry of the response authorization area
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct TpmsAuthResponse {
    pub nonce: Tpm2bNonce,
    pub session_attributes: TpmaSession,
    pub hmac: Tpm2bAuth,
}

impl Tpm2StructOut for TpmsAuthResponse {
    fn pack(&self, buff: &mut WriteCursor<'_>) -> result::Result<(), EncodeError> {
        self.nonce.pack(buff)?;
        self.session_attributes.pack(buff)?;
        self.hmac.pack(buff)
    }
}

impl Tpm2StructIn for TpmsAuthResponse {
    fn unpack(&mut self, buff: &mut ReadCursor<'_>) -> result::Result<(), DecodeError> {
        self.nonce.unpack(buff)?;
        self.session_attributes.unpack(buff)?;
        self.hmac.unpack(buff)
    }
}

// TPMT_TK_AUTH
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct TpmtTkAuth {
    pub tag: TpmSt,
    pub hierarchy: Handle,
    pub digest: Tpm2bDigest,
}

impl Tpm2StructOut for TpmtTkAuth {
    fn pack(&self, buff: &mut WriteCursor<'_>) -> result::Result<(), EncodeError> {
        self.tag.pack(buff)?;
        self.hierarchy.pack(buff)?;
        self.digest.pack(buff)
    }
}

impl Tpm2StructIn for TpmtTkAuth {
    fn unpack(&mut self, buff: &mut ReadCursor<'_>) -> result::Result<(), DecodeError> {
        self.tag.unpack(buff)?;
        self.hierarchy.unpack(buff)?;
        self.digest.unpack(buff)
    }
}

// TPMT_SYM_DEF. key_bits and mode are only present on the wire when the
// algorithm is not TPM_ALG_NULL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TpmtSymDef {
    pub algorithm: TpmAlgId,
    pub key_bits: u16,
    pub mode: TpmAlgId,
}

impl Default for TpmtSymDef {
    fn default() -> Self {
        TpmtSymDef::new_null()
    }
}

impl TpmtSymDef {
    pub fn new_null() -> Self {
        TpmtSymDef {
            algorithm: TPM_ALG_NULL,
            key_bits: 0,
            mode: TPM_ALG_NULL,
        }
    }

    pub fn aes_128_cfb() -> Self {
        TpmtSymDef {
            algorithm: TPM_ALG_AES,
            key_bits: 128,
            mode: TPM_ALG_CFB,
        }
    }
}

impl Tpm2StructOut for TpmtSymDef {
    fn pack(&self, buff: &mut WriteCursor<'_>) -> result::Result<(), EncodeError> {
        self.algorithm.pack(buff)?;
        if self.algorithm != TPM_ALG_NULL {
            self.key_bits.pack(buff)?;
            self.mode.pack(buff)?;
        }
        Ok(())
    }
}

impl Tpm2StructIn for TpmtSymDef {
    fn unpack(&mut self, buff: &mut ReadCursor<'_>) -> result::Result<(), DecodeError> {
        self.algorithm.unpack(buff)?;
        if self.algorithm == TPM_ALG_NULL {
            self.key_bits = 0;
            self.mode = TPM_ALG_NULL;
        } else {
            self.key_bits.unpack(buff)?;
            self.mode.unpack(buff)?;
        }
        Ok(())
    }
}
