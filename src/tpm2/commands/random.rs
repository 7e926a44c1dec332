use crate::device::raw::TpmDeviceOps;
use crate::tpm2::commands::run;
use crate::tpm2::commands::run::TpmCommand;
use crate::tpm2::errors::{CommandError, DecodeError};
use crate::tpm2::serialization::inout;
use crate::tpm2::serialization::inout::Tpm2StructOut;
use crate::tpm2::types::tcg;
use std::result;

// TPM2_GetRandom command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetRandomCommand {
    pub bytes_requested: u16,
}

#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct GetRandomResponse {
    pub random_bytes: tcg::Tpm2bDigest,
}

impl inout::Tpm2StructIn for GetRandomResponse {
    fn unpack(&mut self, buff: &mut inout::ReadCursor<'_>) -> result::Result<(), DecodeError> {
        self.random_bytes.unpack(buff)
    }
}

impl TpmCommand for GetRandomCommand {
    const COMMAND_CODE: tcg::TpmCc = tcg::TPM_CC_GET_RANDOM;
    type Response = GetRandomResponse;

    fn handles(&self) -> Vec<tcg::Handle> {
        Vec::new()
    }

    fn parameters(&self) -> Vec<&dyn Tpm2StructOut> {
        let params: [&dyn Tpm2StructOut; 1] = [&self.bytes_requested];
        params.to_vec()
    }
}

// tpm2_get_random returns at most bytes_requested random bytes. The TPM
// caps a single answer to the size of its largest digest.
pub fn tpm2_get_random(
    tpm: &mut dyn TpmDeviceOps,
    bytes_requested: u16,
) -> result::Result<Vec<u8>, CommandError> {
    let resp = run::run(tpm, &GetRandomCommand { bytes_requested }, &[])?;
    Ok(resp.params.random_bytes.as_bytes().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::errors::DeviceIoError;
    use crate::tpm2::errors::{ErrorClass, LocalError};

    struct FixedTpm {
        answer: Vec<u8>,
    }

    impl TpmDeviceOps for FixedTpm {
        fn send_recv(&mut self, command: &[u8]) -> result::Result<Vec<u8>, DeviceIoError> {
            assert_eq!(command, &hex::decode("80010000000c0000017b0004").unwrap()[..]);
            Ok(self.answer.clone())
        }
    }

    #[test]
    fn test_get_random() {
        let mut tpm = FixedTpm {
            answer: hex::decode("8001000000100000000000040102030a").unwrap(),
        };
        let bytes = tpm2_get_random(&mut tpm, 4).unwrap();
        assert_eq!(bytes, vec![0x01, 0x02, 0x03, 0x0a]);
    }

    #[test]
    fn test_get_random_short_answer() {
        // declares 4 random bytes but carries 3
        let mut tpm = FixedTpm {
            answer: hex::decode("80010000000f00000000000401020a").unwrap(),
        };
        let err = tpm2_get_random(&mut tpm, 4).unwrap_err();
        assert_eq!(err.class(), ErrorClass::Local);
        assert!(matches!(
            err,
            CommandError::Local(LocalError::Decode(DecodeError::Truncated { .. }))
        ));
    }
}
