//! Argument-shape descriptors for linkrpc handlers.
//!
//! A handler may carry a JSON Schema describing its `params`. The registry
//! compiles each descriptor once, checks request arguments before the
//! handler runs, and hands the descriptor back for `RPC.Describe`.

pub mod config;
pub mod error;
pub mod registry;
mod validator;

pub use config::SchemaConfig;
pub use error::{Result, SchemaError};
pub use registry::SchemaRegistry;
