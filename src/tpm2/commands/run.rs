use crate::device::raw::TpmDeviceOps;
use crate::tpm2::commands::commands::build_command;
use crate::tpm2::commands::response::parse_response_with_handles;
use crate::tpm2::errors::CommandError;
use crate::tpm2::serialization::inout;
use crate::tpm2::serialization::inout::{Tpm2StructIn, Tpm2StructOut};
use crate::tpm2::types::tcg;
use log::{debug, warn};
use std::result;

// TpmCommand describes a TPM command declaratively: which handles go into the
// handle area, which fields make up the parameter area and what the response
// carries. run turns such a description into a full exchange.
pub trait TpmCommand {
    const COMMAND_CODE: tcg::TpmCc;

    // Number of handles the TPM returns ahead of the parameter area
    const RESPONSE_HANDLES: usize = 0;

    type Response: Tpm2StructIn + Default;

    fn handles(&self) -> Vec<tcg::Handle>;

    fn parameters(&self) -> Vec<&dyn Tpm2StructOut>;
}

// CommandResponse holds everything a successful command returns
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResponse<R> {
    pub handles: Vec<tcg::Handle>,
    pub params: R,
    pub sessions: Vec<tcg::TpmsAuthResponse>,
}

// run_command serializes a command, sends it to the TPM and returns the raw
// response bytes
pub fn run_command(
    tpm: &mut dyn TpmDeviceOps,
    command_code: tcg::TpmCc,
    handles: &[tcg::Handle],
    auths: &[tcg::TpmsAuthCommand],
    params: &[&dyn Tpm2StructOut],
) -> result::Result<Vec<u8>, CommandError> {
    let command = build_command(command_code, handles, auths, params)?;
    debug!(
        "command serialization for {:#010x}: {}",
        command_code,
        hex::encode(&command)
    );

    let response = tpm.send_recv(&command)?;
    debug!(
        "response for {:#010x}: {}",
        command_code,
        hex::encode(&response)
    );
    Ok(response)
}

// run executes a TpmCommand with the given authorization sessions and
// decodes its response
pub fn run<C: TpmCommand>(
    tpm: &mut dyn TpmDeviceOps,
    command: &C,
    auths: &[tcg::TpmsAuthCommand],
) -> result::Result<CommandResponse<C::Response>, CommandError> {
    let handles = command.handles();
    let params = command.parameters();
    let raw = run_command(tpm, C::COMMAND_CODE, &handles, auths, &params)?;

    let frame = match parse_response_with_handles(&raw, !auths.is_empty(), C::RESPONSE_HANDLES) {
        Ok(frame) => frame,
        Err(err) => {
            if let Some(rc) = err.response_code() {
                warn!("command {:#010x} failed: {}", C::COMMAND_CODE, rc);
            }
            return Err(err);
        }
    };

    let params = inout::unpack_exact::<C::Response>(frame.parameters)?;
    Ok(CommandResponse {
        handles: frame.handles,
        params,
        sessions: frame.sessions,
    })
}
