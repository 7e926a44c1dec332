use crate::device::raw::TpmDeviceOps;
use crate::tpm2::commands::run;
use crate::tpm2::commands::run::TpmCommand;
use crate::tpm2::errors::CommandError;
use crate::tpm2::serialization::inout::Tpm2StructOut;
use crate::tpm2::types::tcg;
use std::result;

// TPM2_FlushContext. The handle to flush travels in the parameter area,
// the handle area is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushContextCommand {
    pub flush_handle: tcg::TpmiDhContext,
}

impl TpmCommand for FlushContextCommand {
    const COMMAND_CODE: tcg::TpmCc = tcg::TPM_CC_FLUSH_CONTEXT;
    type Response = ();

    fn handles(&self) -> Vec<tcg::Handle> {
        Vec::new()
    }

    fn parameters(&self) -> Vec<&dyn Tpm2StructOut> {
        let params: [&dyn Tpm2StructOut; 1] = [&self.flush_handle];
        params.to_vec()
    }
}

pub fn tpm2_flush_context(
    tpm: &mut dyn TpmDeviceOps,
    flush_handle: tcg::TpmiDhContext,
) -> result::Result<(), CommandError> {
    run::run(tpm, &FlushContextCommand { flush_handle }, &[])?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::errors::DeviceIoError;
    use crate::tpm2::rc::TpmRc;

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
    fn test_flush_context() {
        let mut tpm = FixedTpm {
            answer: hex::decode("80010000000a00000000").unwrap(),
            command: Vec::new(),
        };
        tpm2_flush_context(&mut tpm, 0x03000001).unwrap();
        assert_eq!(
            tpm.command,
            hex::decode("80010000000e0000016503000001").unwrap()
        );
    }

    #[test]
    fn test_flush_unknown_handle() {
        // TPM_RC_HANDLE on the first parameter
        let mut tpm = FixedTpm {
            answer: hex::decode("80010000000a000001cb").unwrap(),
            command: Vec::new(),
        };
        let err = tpm2_flush_context(&mut tpm, 0x03000001).unwrap_err();
        let rc = err.response_code().unwrap();
        assert_eq!(rc.base(), TpmRc::HANDLE);
        assert_eq!(rc.parameter(), Some(1));
    }
}
