use crate::channel::ChannelId;

/// Errors returned by dispatcher operations.
///
/// Failures that have a counterparty on the wire are not errors: they become
/// `RpcError` responses or callback results.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum DispatchError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] linkrpc_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] linkrpc_frame::FrameError),

    /// Argument schema could not be loaded or compiled.
    #[cfg(feature = "schema")]
    #[error("schema error: {0}")]
    Schema(#[from] linkrpc_schema::SchemaError),

    /// The destination matches no channel and no factory can create one.
    #[error("no route to {0:?}")]
    NoRoute(String),

    /// The frame could not be sent and queueing was refused or disabled.
    #[error("frame to {0:?} was not sent and could not be queued")]
    NotSent(String),

    /// No channel is registered under this id.
    #[error("unknown channel {0}")]
    UnknownChannel(ChannelId),

    /// A handler pattern is empty.
    #[error("invalid handler pattern {0:?}")]
    InvalidPattern(String),
}

pub type Result<T> = std::result::Result<T, DispatchError>;
