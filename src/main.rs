use argh::FromArgs;
use log::error;
use std::process;
use std::time::Duration;
use tpm2_marshal::config::{ConfigError, TpmConfig};
use tpm2_marshal::device;
use tpm2_marshal::device::raw::TpmDeviceOps;
use tpm2_marshal::tpm2::commands::flush::tpm2_flush_context;
use tpm2_marshal::tpm2::commands::policy::{tpm2_policy_secret, PolicySecretCommand};
use tpm2_marshal::tpm2::commands::random::tpm2_get_random;
use tpm2_marshal::tpm2::commands::session::tpm2_start_auth_session;
use tpm2_marshal::tpm2::commands::startup::tpm2_startup;
use tpm2_marshal::tpm2::errors::CommandError;
use tpm2_marshal::tpm2::types::tcg;

// Size of the caller nonce drawn from the TPM when none is given
const DEFAULT_NONCE_SIZE: u16 = 32;

// Byte string given on the command line as hex
#[derive(Debug, Default, Clone)]
struct HexBytes(Vec<u8>);

/// Send TPM 2.0 commands to a device or simulator.
#[derive(FromArgs, Debug)]
struct Args {
    /// TCTI string: device:<path>, mssim:host=<h>,port=<p> or swtpm:host=<h>,port=<p>.
    /// Defaults to $TPM2TOOLS_TCTI, $TCTI, then device:/dev/tpmrm0
    #[argh(option, short = 't')]
    tcti: Option<String>,

    /// locality commands are sent at (simulator only)
    #[argh(option, default = "0")]
    locality: u8,

    /// timeout in milliseconds for socket transports, 0 disables it
    #[argh(option)]
    timeout_ms: Option<u64>,

    #[argh(subcommand)]
    command: Command,
}

#[derive(FromArgs, Debug)]
#[argh(subcommand)]
enum Command {
    Startup(Startup),
    GetRandom(GetRandom),
    StartAuthSession(StartAuthSession),
    PolicySecret(PolicySecret),
    FlushContext(FlushContext),
}

/// Issue TPM2_Startup.
#[derive(FromArgs, Debug)]
#[argh(subcommand, name = "startup")]
struct Startup {
    /// resume saved state instead of clearing it
    #[argh(switch)]
    state: bool,
}

/// Fetch random bytes from the TPM.
#[derive(FromArgs, Debug)]
#[argh(subcommand, name = "get-random")]
struct GetRandom {
    /// number of bytes to request
    #[argh(positional)]
    bytes: u16,
}

/// Start an unbound, unsalted authorization session.
#[derive(FromArgs, Debug)]
#[argh(subcommand, name = "start-auth-session")]
struct StartAuthSession {
    /// session type: policy, hmac or trial
    #[argh(option, default = "tcg::TPM_SE_POLICY", from_str_fn(parse_session_type))]
    session_type: tcg::TpmSe,

    /// caller nonce as hex, drawn from the TPM when absent
    #[argh(option, from_str_fn(parse_hex))]
    nonce: Option<HexBytes>,
}

/// Issue TPM2_PolicySecret against a policy session.
#[derive(FromArgs, Debug)]
#[argh(subcommand, name = "policy-secret")]
struct PolicySecret {
    /// entity whose authorization is proven: owner, endorsement, platform,
    /// lockout or a numeric handle
    #[argh(option, default = "tcg::TPM_RH_OWNER", from_str_fn(parse_handle))]
    auth_handle: tcg::Handle,

    /// handle of the policy session
    #[argh(option, from_str_fn(parse_handle))]
    session: tcg::Handle,

    /// password of the authorizing entity
    #[argh(option, default = "String::new()")]
    password: String,

    /// nonceTPM of the policy session as hex
    #[argh(option, default = "HexBytes::default()", from_str_fn(parse_hex))]
    nonce_tpm: HexBytes,

    /// cpHash the authorization is restricted to, as hex
    #[argh(option, default = "HexBytes::default()", from_str_fn(parse_hex))]
    cp_hash: HexBytes,

    /// policy reference as hex
    #[argh(option, default = "HexBytes::default()", from_str_fn(parse_hex))]
    policy_ref: HexBytes,

    /// expiration in seconds, negative to request a ticket
    #[argh(option, default = "0")]
    expiration: i32,
}

/// Flush a transient object or session.
#[derive(FromArgs, Debug)]
#[argh(subcommand, name = "flush-context")]
struct FlushContext {
    /// handle to flush
    #[argh(positional, from_str_fn(parse_handle))]
    handle: tcg::Handle,
}

fn parse_hex(value: &str) -> Result<HexBytes, String> {
    hex::decode(value.trim_start_matches("0x"))
        .map(HexBytes)
        .map_err(|err| format!("invalid hex: {}", err))
}

fn parse_handle(value: &str) -> Result<tcg::Handle, String> {
    match value {
        "owner" => Ok(tcg::TPM_RH_OWNER),
        "endorsement" => Ok(tcg::TPM_RH_ENDORSEMENT),
        "platform" => Ok(tcg::TPM_RH_PLATFORM),
        "lockout" => Ok(tcg::TPM_RH_LOCKOUT),
        "null" => Ok(tcg::TPM_RH_NULL),
        _ => match value.strip_prefix("0x") {
            Some(digits) => u32::from_str_radix(digits, 16),
            None => value.parse(),
        }
        .map_err(|err| format!("invalid handle {}: {}", value, err)),
    }
}

fn parse_session_type(value: &str) -> Result<tcg::TpmSe, String> {
    match value {
        "policy" => Ok(tcg::TPM_SE_POLICY),
        "hmac" => Ok(tcg::TPM_SE_HMAC),
        "trial" => Ok(tcg::TPM_SE_TRIAL),
        _ => Err(format!("unknown session type {}", value)),
    }
}

fn load_config(args: &Args) -> Result<TpmConfig, ConfigError> {
    let config = match &args.tcti {
        Some(tcti) => TpmConfig::from_tcti(tcti)?,
        None => TpmConfig::from_env()?,
    };
    let config = config.with_locality(args.locality);
    Ok(match args.timeout_ms {
        Some(0) => config.with_timeout(None),
        Some(ms) => config.with_timeout(Some(Duration::from_millis(ms))),
        None => config,
    })
}

fn execute(tpm: &mut dyn TpmDeviceOps, command: &Command) -> Result<(), CommandError> {
    match command {
        Command::Startup(cmd) => {
            let startup_type = if cmd.state {
                tcg::TPM_SU_STATE
            } else {
                tcg::TPM_SU_CLEAR
            };
            tpm2_startup(tpm, startup_type)
        }
        Command::GetRandom(cmd) => {
            let bytes = tpm2_get_random(tpm, cmd.bytes)?;
            println!("{}", hex::encode(bytes));
            Ok(())
        }
        Command::StartAuthSession(cmd) => {
            let nonce = match &cmd.nonce {
                Some(nonce) => nonce.0.clone(),
                None => tpm2_get_random(tpm, DEFAULT_NONCE_SIZE)?,
            };
            let session = tpm2_start_auth_session(tpm, cmd.session_type, &nonce)?;
            println!("handle: {:#010x}", session.handle);
            println!("nonce-tpm: {}", hex::encode(session.nonce_tpm.as_bytes()));
            Ok(())
        }
        Command::PolicySecret(cmd) => {
            let command = PolicySecretCommand {
                auth_handle: cmd.auth_handle,
                policy_session: cmd.session,
                nonce_tpm: tcg::Tpm2bNonce::from_slice(&cmd.nonce_tpm.0)?,
                cp_hash_a: tcg::Tpm2bDigest::from_slice(&cmd.cp_hash.0)?,
                policy_ref: tcg::Tpm2bNonce::from_slice(&cmd.policy_ref.0)?,
                expiration: cmd.expiration,
            };
            let auth = tcg::TpmsAuthCommand::password(cmd.password.as_bytes())?;
            let resp = tpm2_policy_secret(tpm, &command, auth)?;
            println!("timeout: {}", hex::encode(resp.params.timeout.as_bytes()));
            println!("ticket-tag: {:#06x}", resp.params.policy_ticket.tag);
            println!(
                "ticket-hierarchy: {:#010x}",
                resp.params.policy_ticket.hierarchy
            );
            println!(
                "ticket-digest: {}",
                hex::encode(resp.params.policy_ticket.digest.as_bytes())
            );
            Ok(())
        }
        Command::FlushContext(cmd) => tpm2_flush_context(tpm, cmd.handle),
    }
}

fn main() {
    env_logger::init();
    let args: Args = argh::from_env();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(err) => {
            error!("{}", err);
            process::exit(2);
        }
    };

    let mut tpm = device::open(&config);
    let ret = match execute(tpm.as_mut(), &args.command) {
        Ok(()) => 0,
        Err(err) => {
            error!("{} ({:?} error)", err, err.class());
            1
        }
    };
    process::exit(ret);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tpm2_marshal::config::DeviceConfig;

    fn parse(args: &[&str]) -> Args {
        Args::from_args(&["tpm2-marshal"], args).unwrap()
    }

    #[test]
    fn test_timeout_option() {
        let args = parse(&["-t", "swtpm:port=2400", "--timeout-ms", "250", "get-random", "8"]);
        let config = load_config(&args).unwrap();
        assert_eq!(config.timeout, Some(Duration::from_millis(250)));
        assert!(matches!(config.device, DeviceConfig::Tcp { port: 2400, .. }));
        assert!(matches!(args.command, Command::GetRandom(GetRandom { bytes: 8 })));

        let args = parse(&["-t", "device", "--timeout-ms", "0", "startup"]);
        assert_eq!(load_config(&args).unwrap().timeout, None);
    }

    #[test]
    fn test_policy_secret_arguments() {
        let args = parse(&[
            "policy-secret",
            "--session",
            "0x03000000",
            "--nonce-tpm",
            "11223344",
        ]);
        match args.command {
            Command::PolicySecret(cmd) => {
                assert_eq!(cmd.auth_handle, tcg::TPM_RH_OWNER);
                assert_eq!(cmd.session, 0x03000000);
                assert_eq!(cmd.nonce_tpm.0, vec![0x11, 0x22, 0x33, 0x44]);
                assert!(cmd.cp_hash.0.is_empty());
                assert_eq!(cmd.expiration, 0);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_bad_handle() {
        assert!(parse_handle("0xzz").is_err());
        assert_eq!(parse_handle("endorsement"), Ok(tcg::TPM_RH_ENDORSEMENT));
    }
}
