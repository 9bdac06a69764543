//! Introspection methods every device answers.

use serde_json::{json, Value};

use crate::dispatcher::Dispatcher;
use crate::error::Result;
use crate::handler::{FrameInfo, RequestInfo, RpcError};

pub const RPC_LIST: &str = "RPC.List";
pub const RPC_DESCRIBE: &str = "RPC.Describe";
pub const RPC_PING: &str = "RPC.Ping";

impl Dispatcher {
    /// Register `RPC.List`, `RPC.Describe` and `RPC.Ping`.
    pub fn add_builtin_handlers(&mut self) -> Result<()> {
        self.add_handler(RPC_LIST, None, list)?;
        self.add_handler(
            RPC_DESCRIBE,
            Some(json!({
                "type": "object",
                "properties": { "name": { "type": "string" } }
            })),
            describe,
        )?;
        self.add_handler(RPC_PING, None, ping)?;
        Ok(())
    }
}

fn list(d: &mut Dispatcher, ri: RequestInfo, _fi: &FrameInfo, _args: &Value) {
    let methods = d.method_patterns();
    send(d, ri, Ok(json!(methods)));
}

fn describe(d: &mut Dispatcher, ri: RequestInfo, _fi: &FrameInfo, args: &Value) {
    let outcome = match args.get("name").and_then(Value::as_str) {
        None => Err(RpcError::new(RpcError::BAD_REQUEST, "name is required")),
        Some(name) => match d.method_descriptor(name) {
            Some(descriptor) => Ok(json!({
                "name": name,
                "args": descriptor.unwrap_or(Value::Null),
            })),
            None => Err(RpcError::new(RpcError::NOT_FOUND, "name not found")),
        },
    };
    send(d, ri, outcome);
}

fn ping(d: &mut Dispatcher, ri: RequestInfo, _fi: &FrameInfo, _args: &Value) {
    let info = d
        .channel_info(ri.channel)
        .and_then(|info| info.info)
        .unwrap_or_default();
    send(d, ri, Ok(json!({ "channel_info": info })));
}

fn send(d: &mut Dispatcher, ri: RequestInfo, outcome: std::result::Result<Value, RpcError>) {
    let method = ri.method.clone();
    if let Err(err) = d.respond_with(ri, outcome) {
        tracing::debug!(%method, error = %err, "could not answer");
    }
}
