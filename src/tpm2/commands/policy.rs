use crate::device::raw::TpmDeviceOps;
use crate::tpm2::commands::run;
use crate::tpm2::commands::run::{CommandResponse, TpmCommand};
use crate::tpm2::errors::{CommandError, DecodeError};
use crate::tpm2::serialization::inout;
use crate::tpm2::serialization::inout::Tpm2StructOut;
use crate::tpm2::types::tcg;
use std::result;

// TPM2_PolicySecret command. The authorization of auth_handle must be
// satisfied by the session passed along with it.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct PolicySecretCommand {
    pub auth_handle: tcg::TpmiDhEntity,
    pub policy_session: tcg::TpmiShPolicy,
    pub nonce_tpm: tcg::Tpm2bNonce,
    pub cp_hash_a: tcg::Tpm2bDigest,
    pub policy_ref: tcg::Tpm2bNonce,
    pub expiration: i32,
}

// TPM2_PolicySecret response
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct PolicySecretResponse {
    pub timeout: tcg::Tpm2bTimeout,
    pub policy_ticket: tcg::TpmtTkAuth,
}

impl inout::Tpm2StructIn for PolicySecretResponse {
    fn unpack(&mut self, buff: &mut inout::ReadCursor<'_>) -> result::Result<(), DecodeError> {
        self.timeout.unpack(buff)?;
        self.policy_ticket.unpack(buff)
    }
}

impl TpmCommand for PolicySecretCommand {
    const COMMAND_CODE: tcg::TpmCc = tcg::TPM_CC_POLICY_SECRET;
    type Response = PolicySecretResponse;

    fn handles(&self) -> Vec<tcg::Handle> {
        vec![self.auth_handle, self.policy_session]
    }

    fn parameters(&self) -> Vec<&dyn Tpm2StructOut> {
        let params: [&dyn Tpm2StructOut; 4] = [
            &self.nonce_tpm,
            &self.cp_hash_a,
            &self.policy_ref,
            &self.expiration,
        ];
        params.to_vec()
    }
}

// tpm2_policy_secret issues TPM2_PolicySecret, authorizing auth_handle with
// the given session. The session acknowledgment is returned along with the
// timeout and ticket.
pub fn tpm2_policy_secret(
    tpm: &mut dyn TpmDeviceOps,
    command: &PolicySecretCommand,
    auth: tcg::TpmsAuthCommand,
) -> result::Result<CommandResponse<PolicySecretResponse>, CommandError> {
    let auths: [tcg::TpmsAuthCommand; 1] = [auth];
    run::run(tpm, command, &auths)
}
