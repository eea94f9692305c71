use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand, ValueEnum};
use xbmesh_frame::{Address64, Module, Parameter};
use xbmesh_link::{Connection, LinkConfig};
use xbmesh_transport::{BaudRate, SerialConfig, SerialPort};

use crate::exit::{frame_error, link_error, transport_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod get;
pub mod monitor;
pub mod set;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Read a register of the local radio or a remote module.
    Get(GetArgs),
    /// Write a register of the local radio or a remote module.
    Set(SetArgs),
    /// Print IO samples as they arrive.
    Monitor(MonitorArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Get(args) => get::run(args, format),
        Command::Set(args) => set::run(args, format),
        Command::Monitor(args) => monitor::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

/// How a register value is written on the command line and on the wire.
#[derive(Copy, Clone, Debug, Default, ValueEnum)]
pub enum ValueEncoding {
    /// UTF-8 text, e.g. a node identifier.
    #[default]
    Text,
    /// Hex digits, e.g. `0014`.
    Hex,
    /// Decimal integer, sent as the shortest big-endian form.
    Uint,
}

#[derive(Args, Debug)]
pub struct LinkArgs {
    /// Serial device of the local radio.
    #[arg(long, short = 'd', env = "XBMESH_DEVICE", value_name = "PATH")]
    pub device: PathBuf,
    /// Line speed in baud.
    #[arg(long, default_value_t = 9600)]
    pub baud: u32,
    /// Response timeout (e.g. 2s, 500ms).
    #[arg(long, default_value = "2s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct GetArgs {
    /// Two-character command, e.g. NI.
    pub command: String,
    /// 64-bit address of a remote module (e.g. 0013A2004146B5A9).
    #[arg(long, value_name = "ADDR64")]
    pub remote: Option<String>,
    #[command(flatten)]
    pub link: LinkArgs,
}

#[derive(Args, Debug)]
pub struct SetArgs {
    /// Two-character command, e.g. NI.
    pub command: String,
    /// New register value.
    pub value: String,
    /// Encoding of VALUE.
    #[arg(long = "as", value_name = "ENCODING", default_value = "text")]
    pub encoding: ValueEncoding,
    /// 64-bit address of a remote module (e.g. 0013A2004146B5A9).
    #[arg(long, value_name = "ADDR64")]
    pub remote: Option<String>,
    /// Queue the change without applying it (AC).
    #[arg(long)]
    pub no_apply: bool,
    #[command(flatten)]
    pub link: LinkArgs,
}

#[derive(Args, Debug)]
pub struct MonitorArgs {
    /// Exit after printing N samples.
    #[arg(long)]
    pub count: Option<usize>,
    /// Only print samples from this module.
    #[arg(long, value_name = "ADDR64")]
    pub remote: Option<String>,
    #[command(flatten)]
    pub link: LinkArgs,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Open the serial device and start a link over it.
///
/// Argument errors are reported before the device is touched.
pub fn open_link(args: &LinkArgs) -> CliResult<Connection> {
    let timeout = parse_duration(&args.timeout)?;
    let baud_rate =
        BaudRate::try_from(args.baud).map_err(|err| transport_error("invalid --baud", err))?;

    let config = SerialConfig {
        baud_rate,
        read_timeout: None,
    };
    let port = SerialPort::open_with_config(&args.device, &config)
        .map_err(|err| transport_error("open failed", err))?;

    Connection::open(port, LinkConfig::default().with_response_timeout(timeout))
        .map_err(|err| link_error("link setup failed", err))
}

pub fn parse_command(input: &str) -> CliResult<xbmesh_frame::Command> {
    input
        .parse()
        .map_err(|err| frame_error("invalid command", err))
}

/// Resolve `--remote` into a module to address.
pub fn parse_module(input: &str) -> CliResult<Module> {
    let address64: Address64 = input
        .parse()
        .map_err(|err| frame_error("invalid --remote", err))?;
    Ok(Module::with_address(address64))
}

/// Display name of the register owner: "local" or the module address.
pub fn target_name(module: Option<&Module>) -> String {
    module.map_or_else(|| "local".to_string(), |m| m.address64.to_string())
}

pub fn parse_value(input: &str, encoding: ValueEncoding) -> CliResult<Parameter> {
    match encoding {
        ValueEncoding::Text => Ok(Parameter::from(input)),
        ValueEncoding::Hex => parse_hex(input).map(Parameter::from),
        ValueEncoding::Uint => {
            let value: u64 = input
                .trim()
                .parse()
                .map_err(|_| CliError::new(USAGE, format!("invalid integer value: {input}")))?;
            Ok(Parameter::from(shortest_be_bytes(value)))
        }
    }
}

fn parse_hex(input: &str) -> CliResult<Vec<u8>> {
    let digits = input.trim();
    let digits = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
        .unwrap_or(digits);
    if digits.is_empty() || digits.len() % 2 != 0 {
        return Err(CliError::new(
            USAGE,
            format!("hex value needs an even number of digits: {input}"),
        ));
    }

    (0..digits.len())
        .step_by(2)
        .map(|i| {
            digits
                .get(i..i + 2)
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or_else(|| CliError::new(USAGE, format!("invalid hex value: {input}")))
        })
        .collect()
}

fn shortest_be_bytes(value: u64) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let first = bytes
        .iter()
        .position(|&b| b != 0)
        .unwrap_or(bytes.len() - 1);
    bytes[first..].to_vec()
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("bad").is_err());
        assert_eq!(parse_duration("").unwrap_err().code, USAGE);
    }

    #[test]
    fn values_follow_their_encoding() {
        let text = parse_value("ROUTER", ValueEncoding::Text).unwrap();
        assert_eq!(text.as_bytes(), b"ROUTER");

        let hex = parse_value("0x0014", ValueEncoding::Hex).unwrap();
        assert_eq!(hex.as_bytes(), &[0x00, 0x14]);

        assert_eq!(
            parse_value("1000", ValueEncoding::Uint).unwrap().as_bytes(),
            &[0x03, 0xE8]
        );
        assert_eq!(
            parse_value("0", ValueEncoding::Uint).unwrap().as_bytes(),
            &[0x00]
        );
    }

    #[test]
    fn malformed_values_are_usage_errors() {
        assert_eq!(parse_value("123", ValueEncoding::Hex).unwrap_err().code, USAGE);
        assert_eq!(parse_value("zz", ValueEncoding::Hex).unwrap_err().code, USAGE);
        assert_eq!(parse_value("-1", ValueEncoding::Uint).unwrap_err().code, USAGE);
    }

    #[test]
    fn commands_and_modules_parse() {
        assert_eq!(parse_command("NI").unwrap().to_string(), "NI");
        assert_eq!(parse_command("NID").unwrap_err().code, USAGE);

        let module = parse_module("00:13:A2:00:41:46:B5:A9").unwrap();
        assert_eq!(module.address64.to_u64(), 0x0013_A200_4146_B5A9);
        assert!(module.address16.is_unknown());
        assert_eq!(parse_module("nope").unwrap_err().code, USAGE);
    }
}
