use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    println!("linkrpc {}", env!("CARGO_PKG_VERSION"));
    if args.extended {
        for (key, value) in build_facts() {
            println!("  {key:<13} {value}");
        }
    }
    Ok(SUCCESS)
}

fn build_facts() -> Vec<(&'static str, String)> {
    let baked = |value: Option<&str>| value.unwrap_or("unknown").to_string();
    vec![
        ("target", baked(option_env!("LINKRPC_TARGET"))),
        ("profile", baked(option_env!("LINKRPC_PROFILE"))),
        ("platform", format!("{}/{}", std::env::consts::OS, std::env::consts::ARCH)),
        ("schema", cfg!(feature = "schema").to_string()),
        ("frame limit", format!("{} bytes", linkrpc_frame::DEFAULT_MAX_PAYLOAD)),
        ("device id", linkrpc_dispatch::DEFAULT_ID.to_string()),
    ]
}
