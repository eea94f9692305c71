use crate::cmd::{open_link, parse_command, parse_module, target_name, GetArgs};
use crate::exit::{link_error, CliResult, SUCCESS};
use crate::output::{print_parameter, OutputFormat};

pub fn run(args: GetArgs, format: OutputFormat) -> CliResult<i32> {
    let command = parse_command(&args.command)?;
    let module = args.remote.as_deref().map(parse_module).transpose()?;

    let link = open_link(&args.link)?;
    let result = match &module {
        Some(module) => link.get_remote_parameter(module, command),
        None => link.get_parameter(command),
    };
    link.close();

    let parameter = result.map_err(|err| link_error(&format!("get {command} failed"), err))?;
    print_parameter(&target_name(module.as_ref()), command, &parameter, format);
    Ok(SUCCESS)
}
