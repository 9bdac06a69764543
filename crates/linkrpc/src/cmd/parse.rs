use std::fs;
use std::io::Read;

use linkrpc_frame::{parse, Frame};

use crate::cmd::ParseArgs;
use crate::exit::{frame_error, io_error, CliResult, SUCCESS};
use crate::output::{print_frame, OutputFormat};

pub fn run(args: ParseArgs, format: OutputFormat) -> CliResult<i32> {
    let input = read_input(&args)?;
    let frame = decode(&input)?;
    print_frame(&frame, format);
    Ok(SUCCESS)
}

fn read_input(args: &ParseArgs) -> CliResult<Vec<u8>> {
    match &args.file {
        Some(path) => fs::read(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err)),
        None => {
            let mut input = Vec::new();
            std::io::stdin()
                .read_to_end(&mut input)
                .map_err(|err| io_error("failed reading stdin", err))?;
            Ok(input)
        }
    }
}

fn decode(input: &[u8]) -> CliResult<Frame> {
    parse(input.trim_ascii()).map_err(|err| frame_error("invalid frame", err))
}
