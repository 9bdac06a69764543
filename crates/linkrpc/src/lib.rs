//! Channel-agnostic JSON-RPC for devices.
//!
//! linkrpc routes JSON request/response frames between local handlers and any
//! number of links to peers, queueing across link flaps and correlating
//! replies with pending calls.
//!
//! # Crate Structure
//!
//! - [`transport`] — Byte-stream transports (Unix domain sockets)
//! - [`frame`] — JSON frame envelope and stream framing
//! - [`schema`] — Optional JSON Schema validation of call params (behind `schema` feature)
//! - [`dispatch`] — The dispatcher, channels, handlers and built-ins

/// Re-export transport types.
pub mod transport {
    pub use linkrpc_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use linkrpc_frame::*;
}

/// Re-export schema types (requires `schema` feature).
#[cfg(feature = "schema")]
pub mod schema {
    pub use linkrpc_schema::*;
}

/// Re-export dispatcher types.
pub mod dispatch {
    pub use linkrpc_dispatch::*;
}
