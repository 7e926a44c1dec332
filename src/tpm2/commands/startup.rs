use crate::device::raw::TpmDeviceOps;
use crate::tpm2::commands::run;
use crate::tpm2::commands::run::TpmCommand;
use crate::tpm2::errors::CommandError;
use crate::tpm2::serialization::inout::Tpm2StructOut;
use crate::tpm2::types::tcg;
use std::result;

// TPM2_Startup command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartupCommand {
    pub startup_type: tcg::TpmSu,
}

impl TpmCommand for StartupCommand {
    const COMMAND_CODE: tcg::TpmCc = tcg::TPM_CC_STARTUP;
    type Response = ();

    fn handles(&self) -> Vec<tcg::Handle> {
        Vec::new()
    }

    fn parameters(&self) -> Vec<&dyn Tpm2StructOut> {
        let params: [&dyn Tpm2StructOut; 1] = [&self.startup_type];
        params.to_vec()
    }
}

pub fn tpm2_startup(
    tpm: &mut dyn TpmDeviceOps,
    startup_type: tcg::TpmSu,
) -> result::Result<(), CommandError> {
    run::run(tpm, &StartupCommand { startup_type }, &[])?;
    Ok(())
}
