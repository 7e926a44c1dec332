use crate::device::raw::TpmDeviceOps;
use crate::tpm2::commands::run;
use crate::tpm2::commands::run::TpmCommand;
use crate::tpm2::errors::{CommandError, DecodeError};
use crate::tpm2::serialization::inout;
use crate::tpm2::serialization::inout::Tpm2StructOut;
use crate::tpm2::types::tcg;
use log::debug;
use std::result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartAuthSessionCommand {
    // determines how the value of encryptedSalt is encrypted. The decrypted secret value
    // is used to compute the session key. tpmKey could be TPM_RH_NULL and encryptedSalt
    // could be Empty Buffer
    pub tpm_key: tcg::TpmiDhObject,
    pub bind: tcg::TpmiDhEntity,
    pub nonce_caller: tcg::Tpm2bNonce,
    pub encrypted_salt: tcg::Tpm2bEncryptedSecret,
    pub session_type: tcg::TpmSe,
    pub symmetric: tcg::TpmtSymDef,
    pub auth_hash: tcg::TpmiAlgHash,
}

impl StartAuthSessionCommand {
    // unbound_unsalted describes the most typical session: tpmKey and bind both
    // set to TPM_RH_NULL, no salt and no parameter encryption
    pub fn unbound_unsalted(
        session_type: tcg::TpmSe,
        nonce_caller: tcg::Tpm2bNonce,
        auth_hash: tcg::TpmiAlgHash,
    ) -> Self {
        StartAuthSessionCommand {
            tpm_key: tcg::TPM_RH_NULL,
            bind: tcg::TPM_RH_NULL,
            nonce_caller,
            encrypted_salt: tcg::Tpm2bEncryptedSecret::new(),
            session_type,
            symmetric: tcg::TpmtSymDef::new_null(),
            auth_hash,
        }
    }
}

#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct StartAuthSessionResponse {
    pub nonce_tpm: tcg::Tpm2bNonce,
}

impl inout::Tpm2StructIn for StartAuthSessionResponse {
    fn unpack(&mut self, buff: &mut inout::ReadCursor<'_>) -> result::Result<(), DecodeError> {
        self.nonce_tpm.unpack(buff)
    }
}

impl TpmCommand for StartAuthSessionCommand {
    const COMMAND_CODE: tcg::TpmCc = tcg::TPM_CC_START_AUTH_SESSION;
    const RESPONSE_HANDLES: usize = 1;
    type Response = StartAuthSessionResponse;

    fn handles(&self) -> Vec<tcg::Handle> {
        vec![self.tpm_key, self.bind]
    }

    fn parameters(&self) -> Vec<&dyn Tpm2StructOut> {
        let params: [&dyn Tpm2StructOut; 5] = [
            &self.nonce_caller,
            &self.encrypted_salt,
            &self.session_type,
            &self.symmetric,
            &self.auth_hash,
        ];
        params.to_vec()
    }
}

// AuthSession is a session started on the TPM
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSession {
    pub handle: tcg::TpmiShAuthSession,
    pub nonce_tpm: tcg::Tpm2bNonce,
}

impl AuthSession {
    // auth_command returns a TPMS_AUTH_COMMAND referencing this session with
    // empty nonce and hmac, which is what a policy session without bind or
    // salt needs
    pub fn auth_command(&self, attributes: tcg::TpmaSession) -> tcg::TpmsAuthCommand {
        tcg::TpmsAuthCommand {
            session_handle: self.handle,
            nonce: tcg::Tpm2bNonce::new(),
            session_attributes: attributes,
            hmac: tcg::Tpm2bAuth::new(),
        }
    }
}

// tpm2_start_auth_session starts an unbound, unsalted session of the given type
pub fn tpm2_start_auth_session(
    tpm: &mut dyn TpmDeviceOps,
    session_type: tcg::TpmSe,
    nonce_caller: &[u8],
) -> result::Result<AuthSession, CommandError> {
    let command = StartAuthSessionCommand::unbound_unsalted(
        session_type,
        tcg::Tpm2bNonce::from_slice(nonce_caller)?,
        tcg::TPM_ALG_SHA256,
    );
    let resp = run::run(tpm, &command, &[])?;
    let handle = match resp.handles.first() {
        Some(handle) => *handle,
        None => {
            return Err(DecodeError::Truncated {
                needed: size_of!(tcg::Handle),
                remaining: 0,
            }
            .into())
        }
    };
    debug!("started session {:#010x}", handle);
    Ok(AuthSession {
        handle,
        nonce_tpm: resp.params.nonce_tpm,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::errors::DeviceIoError;

    struct FixedTpm {
        answer: Vec<u8>,
        command: Vec<u8>,
    }

    impl TpmDeviceOps for FixedTpm {
        fn send_recv(&mut self, command: &[u8]) -> result::Result<Vec<u8>, DeviceIoError> {
            self.command = command.to_vec();
            Ok(self.answer.clone())
        }
    }

    #[test]
    fn test_start_policy_session() {
        let mut tpm = FixedTpm {
            answer: hex::decode("8001000000140000000003000000000411223344").unwrap(),
            command: Vec::new(),
        };
        let session = tpm2_start_auth_session(&mut tpm, tcg::TPM_SE_POLICY, &[0xA5; 16]).unwrap();
        assert_eq!(session.handle, 0x03000000);
        assert_eq!(session.nonce_tpm.as_bytes(), &[0x11, 0x22, 0x33, 0x44]);

        let mut expected = hex::decode("80010000002b0000017640000007400000070010").unwrap();
        expected.extend_from_slice(&[0xA5; 16]);
        expected.extend_from_slice(&hex::decode("000001 0010 000b".replace(' ', "")).unwrap());
        assert_eq!(tpm.command, expected);

        let auth = session.auth_command(tcg::TPMA_SESSION_CONTINUE_SESSION);
        assert_eq!(auth.session_handle, 0x03000000);
        assert!(auth.nonce.is_empty());
    }

    #[test]
    fn test_missing_session_handle() {
        let mut tpm = FixedTpm {
            answer: hex::decode("80010000000c000000000300").unwrap(),
            command: Vec::new(),
        };
        let err = tpm2_start_auth_session(&mut tpm, tcg::TPM_SE_HMAC, &[]).unwrap_err();
        assert!(matches!(
            err,
            CommandError::Local(crate::tpm2::errors::LocalError::Decode(
                DecodeError::Truncated { .. }
            ))
        ));
    }
}
