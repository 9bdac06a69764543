//! Call a device's own handlers through a loopback channel.
//!
//! Run with: cargo run -p linkrpc --example loopback

use linkrpc::dispatch::{CallOptions, Dispatcher, DispatcherConfig, LOOPBACK_DST};
use serde_json::json;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut dispatcher = Dispatcher::new(DispatcherConfig::default().with_id("demo-device"));
    dispatcher.add_builtin_handlers()?;
    dispatcher.add_handler("Math.Add", None, |d, ri, _fi, args| {
        let sum = args["a"].as_i64().unwrap_or(0) + args["b"].as_i64().unwrap_or(0);
        if let Err(err) = d.respond(ri, json!(sum)) {
            eprintln!("respond failed: {err}");
        }
    })?;
    dispatcher.add_loopback_channel();
    dispatcher.process_events();

    let opts = CallOptions::to(LOOPBACK_DST);
    for method in ["Math.Add", "RPC.List", "No.Such"] {
        dispatcher.call_with(method, Some(json!({"a": 2, "b": 3})), &opts, move |_, _, outcome| {
            match outcome {
                Ok(result) => println!("{method} -> {result}"),
                Err(err) => println!("{method} failed: {err}"),
            }
        })?;
        dispatcher.process_events();
    }

    Ok(())
}
