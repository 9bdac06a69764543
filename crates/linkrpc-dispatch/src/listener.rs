use std::path::Path;

use linkrpc_frame::FrameConfig;
use linkrpc_transport::{LinkStream, SocketListener};
use tracing::debug;

use crate::channel::ChannelId;
use crate::dispatcher::Dispatcher;
use crate::error::Result;
use crate::stream::StreamChannel;

/// Accepts stream connections and registers each as a dispatcher channel.
pub struct ChannelListener {
    socket: SocketListener,
    frame_config: FrameConfig,
}

impl ChannelListener {
    /// Bind to a Unix domain socket path.
    pub fn bind(path: impl AsRef<Path>) -> Result<Self> {
        let socket = SocketListener::bind(path)?;
        Ok(Self {
            socket,
            frame_config: FrameConfig::default(),
        })
    }

    /// Override framing limits applied to accepted connections.
    pub fn with_frame_config(mut self, config: FrameConfig) -> Self {
        self.frame_config = config;
        self
    }

    /// Register every connection already waiting, without blocking.
    ///
    /// Accepted channels learn their destination from the first frame.
    pub fn accept_pending(&self, dispatcher: &mut Dispatcher) -> Result<Vec<ChannelId>> {
        let mut accepted = Vec::new();
        while let Some(stream) = self.socket.try_accept()? {
            accepted.push(self.register(dispatcher, stream));
        }
        Ok(accepted)
    }

    fn register(&self, dispatcher: &mut Dispatcher, stream: LinkStream) -> ChannelId {
        let channel = StreamChannel::from_stream(stream, self.frame_config.clone());
        let id = dispatcher.add_channel("", Box::new(channel));
        debug!(channel = %id, path = ?self.socket.path(), "registered accepted connection");
        if let Err(err) = dispatcher.connect_channel(id) {
            debug!(channel = %id, error = %err, "accepted connection vanished");
        }
        id
    }

    /// Bound socket path.
    pub fn path(&self) -> &Path {
        self.socket.path()
    }
}

impl std::fmt::Debug for ChannelListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelListener")
            .field("path", &self.socket.path())
            .finish()
    }
}
