//! Channel-agnostic JSON-RPC dispatcher for devices.
//!
//! A [`Dispatcher`] owns a set of channels (links to peers), routes outgoing
//! calls to them by destination, queues frames while a link is busy or down,
//! matches responses to pending calls, and serves incoming requests through
//! registered handlers.

pub mod auth;
pub mod builtin;
pub mod channel;
pub mod config;
pub mod destination;
pub mod dispatcher;
pub mod error;
pub mod handler;
#[cfg(unix)]
pub mod listener;
pub mod loopback;
pub mod observer;
mod pending;
mod queue;
mod registry;
#[cfg(unix)]
pub mod stream;
/// In-memory channel test double, for this crate's tests and integrators'.
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use auth::{AuthError, CredentialStore, DigestAssertion};
pub use builtin::{RPC_DESCRIBE, RPC_LIST, RPC_PING};
pub use channel::{AuthnInfo, Channel, ChannelEvent, ChannelId, ChannelInfo, ChannelNotifier};
pub use config::{DispatcherConfig, DEFAULT_AUTH_DOMAIN, DEFAULT_ID};
pub use destination::{dst_eq, is_uri, parse_uri, UriDestination, DEFAULT_DST};
pub use dispatcher::{CallOptions, Dispatcher, ResponseCallback};
pub use error::{DispatchError, Result};
pub use handler::{FrameInfo, Handler, Prehandler, RequestInfo, RpcError};
#[cfg(unix)]
pub use listener::ChannelListener;
pub use loopback::{LoopbackChannel, LOOPBACK_DST};
pub use observer::{DispatchEvent, Observer, ObserverId};
pub use registry::ChannelFactory;
#[cfg(unix)]
pub use stream::{StreamChannel, UNIX_SCHEME};
