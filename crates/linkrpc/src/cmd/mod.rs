use clap::{Args, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod call;
pub mod parse;
pub mod serve;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the built-in RPC methods and Sys.Echo on a Unix socket.
    Serve(ServeArgs),
    /// Issue one call to a device and print the reply.
    Call(CallArgs),
    /// Decode one frame and print its fields.
    Parse(ParseArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args, format),
        Command::Call(args) => call::run(args, format),
        Command::Parse(args) => parse::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Socket path to bind.
    pub path: PathBuf,
    /// Device id; frames addressed elsewhere are rejected.
    #[arg(long, env = "LINKRPC_ID", default_value = linkrpc_dispatch::DEFAULT_ID)]
    pub id: String,
    /// Directory of `<Method>.schema.json` files validating call params.
    #[arg(long, value_name = "DIR")]
    pub validate: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct CallArgs {
    /// Socket path of the device.
    pub path: PathBuf,
    /// Method to call.
    pub method: String,
    /// JSON params.
    #[arg(long, conflicts_with = "params_file")]
    pub params: Option<String>,
    /// Read JSON params from file.
    #[arg(long, value_name = "FILE", conflicts_with = "params")]
    pub params_file: Option<PathBuf>,
    /// Send a notification and exit without waiting for a reply.
    #[arg(long)]
    pub notify: bool,
    /// Maximum time to wait for the reply (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
    /// Our id, sent as `src`.
    #[arg(long, env = "LINKRPC_ID", default_value = "linkrpc-cli")]
    pub id: String,
    /// Opaque tag echoed back in the reply.
    #[arg(long)]
    pub tag: Option<String>,
}

#[derive(Args, Debug)]
pub struct ParseArgs {
    /// Read the frame from a file instead of stdin.
    #[arg(long)]
    pub file: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// A reply timeout such as `500ms`, `5s`, `2m` or a bare number of seconds.
pub(crate) fn parse_duration(text: &str) -> CliResult<Duration> {
    let text = text.trim();
    let split = text
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(text.len());
    let (digits, unit) = text.split_at(split);
    let amount: u64 = digits
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("bad timeout {text:?}: expected e.g. 5s")))?;
    let timeout = match unit {
        "ms" => Duration::from_millis(amount),
        "" | "s" => Duration::from_secs(amount),
        "m" => Duration::from_secs(amount.saturating_mul(60)),
        other => {
            return Err(CliError::new(
                USAGE,
                format!("bad timeout {text:?}: unknown unit {other:?}"),
            ))
        }
    };
    if timeout.is_zero() {
        return Err(CliError::new(USAGE, "timeout must be positive"));
    }
    Ok(timeout)
}
