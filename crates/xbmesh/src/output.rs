use std::io::IsTerminal;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use xbmesh_frame::{AnalogPin, Command, DigitalPin, IoSampleFrame, Parameter};

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct ParameterOutput<'a> {
    schema_id: &'a str,
    target: &'a str,
    command: String,
    size: usize,
    hex: String,
    text: Option<&'a str>,
    value: Option<u64>,
}

#[derive(Serialize)]
struct DigitalOutput {
    pin: String,
    high: bool,
}

#[derive(Serialize)]
struct AnalogOutput {
    pin: String,
    raw: u16,
}

#[derive(Serialize)]
struct SampleOutput {
    schema_id: &'static str,
    address64: String,
    address16: String,
    digital: Vec<DigitalOutput>,
    analog: Vec<AnalogOutput>,
    supply_voltage_mv: Option<u32>,
    timestamp: String,
}

/// Print a register value read from `target` ("local" or a module address).
pub fn print_parameter(
    target: &str,
    command: Command,
    parameter: &Parameter,
    format: OutputFormat,
) {
    let hex = hex(parameter.as_bytes());
    let text = printable(parameter);
    let value = parameter.to_uint();

    match format {
        OutputFormat::Json => {
            let out = ParameterOutput {
                schema_id: "https://schemas.3leaps.dev/xbmesh/cli/v1/parameter.schema.json",
                target,
                command: command.to_string(),
                size: parameter.len(),
                hex,
                text,
                value,
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["TARGET", "COMMAND", "HEX", "TEXT", "VALUE"])
                .add_row(vec![
                    target.to_string(),
                    command.to_string(),
                    hex,
                    text.unwrap_or("-").to_string(),
                    value.map_or_else(|| "-".to_string(), |v| v.to_string()),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => match text {
            Some(text) => println!("{target} {command} = {text:?} (0x{hex})"),
            None => println!("{target} {command} = 0x{hex}"),
        },
    }
}

/// Print one IO sample report.
pub fn print_sample(sample: &IoSampleFrame, format: OutputFormat) {
    let digital: Vec<DigitalOutput> = DigitalPin::ALL
        .iter()
        .filter_map(|&pin| {
            sample.digital_level(pin).map(|high| DigitalOutput {
                pin: format!("{pin:?}"),
                high,
            })
        })
        .collect();
    let analog: Vec<AnalogOutput> = AnalogPin::ALL
        .iter()
        .filter_map(|&pin| {
            sample.analog_sample(pin).map(|raw| AnalogOutput {
                pin: format!("{pin:?}"),
                raw,
            })
        })
        .collect();

    match format {
        OutputFormat::Json => {
            let out = SampleOutput {
                schema_id: "https://schemas.3leaps.dev/xbmesh/cli/v1/io-sample.schema.json",
                address64: sample.address64.to_string(),
                address16: sample.address16.to_string(),
                digital,
                analog,
                supply_voltage_mv: sample.supply_voltage_mv(),
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["MODULE", "PIN", "VALUE"]);
            for d in &digital {
                table.add_row(vec![
                    sample.address64.to_string(),
                    d.pin.clone(),
                    if d.high { "high" } else { "low" }.to_string(),
                ]);
            }
            for a in &analog {
                table.add_row(vec![sample.address64.to_string(), a.pin.clone(), a.raw.to_string()]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            let mut line = format!("{} ({})", sample.address64, sample.address16);
            for d in &digital {
                line.push_str(&format!(" {}={}", d.pin, u8::from(d.high)));
            }
            for a in &analog {
                line.push_str(&format!(" {}={}", a.pin, a.raw));
            }
            if let Some(mv) = sample.supply_voltage_mv() {
                line.push_str(&format!(" supply={mv}mV"));
            }
            println!("{line}");
        }
    }
}

pub fn hex(data: &[u8]) -> String {
    data.iter().map(|b| format!("{b:02X}")).collect()
}

/// The parameter as text when it is non-empty, valid UTF-8 and has no
/// control characters.
fn printable(parameter: &Parameter) -> Option<&str> {
    parameter
        .as_str()
        .filter(|s| !s.is_empty() && !s.chars().any(char::is_control))
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_is_uppercase_without_separators() {
        assert_eq!(hex(&[0x00, 0x14, 0xAB]), "0014AB");
        assert_eq!(hex(&[]), "");
    }

    #[test]
    fn binary_parameters_are_not_printable() {
        assert_eq!(printable(&Parameter::from("ROUTER")), Some("ROUTER"));
        assert_eq!(printable(&Parameter::from(0x0014u16)), None);
        assert_eq!(printable(&Parameter::empty()), None);
    }
}
