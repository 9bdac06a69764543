//! Unix domain socket links for linkrpc stream channels.
//!
//! [`SocketListener`] and [`dial`] produce [`LinkStream`]s, blocking byte
//! streams that `linkrpc-dispatch` wraps in its `StreamChannel`.

pub mod error;
#[cfg(unix)]
pub mod link;
#[cfg(unix)]
pub mod socket;

pub use error::{Result, TransportError};
#[cfg(unix)]
pub use link::{LinkStream, PeerCred};
#[cfg(unix)]
pub use socket::{dial, SocketListener};
