use xbmesh_frame::{Command, Module, Parameter, RemoteOptions};
use xbmesh_link::Connection;

use crate::cmd::{open_link, parse_command, parse_module, parse_value, target_name, SetArgs};
use crate::exit::{link_error, CliResult, SUCCESS};
use crate::output::{print_parameter, OutputFormat};

pub fn run(args: SetArgs, format: OutputFormat) -> CliResult<i32> {
    let command = parse_command(&args.command)?;
    let parameter = parse_value(&args.value, args.encoding)?;
    let module = args.remote.as_deref().map(parse_module).transpose()?;

    let link = open_link(&args.link)?;
    let result = write(&link, module.as_ref(), command, parameter.clone(), !args.no_apply);
    link.close();

    result.map_err(|err| link_error(&format!("set {command} failed"), err))?;
    print_parameter(&target_name(module.as_ref()), command, &parameter, format);
    Ok(SUCCESS)
}

fn write(
    link: &Connection,
    module: Option<&Module>,
    command: Command,
    parameter: Parameter,
    apply: bool,
) -> xbmesh_link::Result<()> {
    match module {
        Some(module) => {
            let options = if apply {
                RemoteOptions::APPLY_CHANGES
            } else {
                RemoteOptions::NONE
            };
            link.set_remote_parameter_with_options(module, command, parameter, options)
        }
        None => {
            link.set_parameter(command, parameter)?;
            if apply {
                link.apply_changes()?;
            }
            Ok(())
        }
    }
}
