//! Channel over a framed Unix domain socket stream.

use std::path::PathBuf;
use std::thread::JoinHandle;

use linkrpc_frame::{FrameConfig, FrameError, FrameReader, FrameWriter};
use linkrpc_transport::{dial, LinkStream};
use tracing::{debug, warn};

use crate::channel::{Channel, ChannelNotifier};
use crate::dispatcher::Dispatcher;
use crate::error::Result;

/// URI scheme served by [`StreamChannel::factory`].
pub const UNIX_SCHEME: &str = "unix";

enum Endpoint {
    /// Accepted by a listener; connected already.
    Accepted(Option<LinkStream>),
    /// Dialled on `connect`.
    Path(PathBuf),
}

/// One framed stream link.
///
/// A reader thread decodes incoming frames and reports them through the
/// notifier. Sends are written synchronously on the dispatcher thread.
pub struct StreamChannel {
    endpoint: Endpoint,
    config: FrameConfig,
    notifier: Option<ChannelNotifier>,
    writer: Option<FrameWriter<LinkStream>>,
    reader: Option<JoinHandle<()>>,
    peer: Option<String>,
}

impl StreamChannel {
    /// Wrap a stream a listener accepted.
    pub fn from_stream(stream: LinkStream, config: FrameConfig) -> Self {
        Self::with_endpoint(Endpoint::Accepted(Some(stream)), config)
    }

    /// A channel that dials the socket at `path` when connected.
    pub fn connect_to(path: impl Into<PathBuf>, config: FrameConfig) -> Self {
        Self::with_endpoint(Endpoint::Path(path.into()), config)
    }

    fn with_endpoint(endpoint: Endpoint, config: FrameConfig) -> Self {
        Self {
            endpoint,
            config,
            notifier: None,
            writer: None,
            reader: None,
            peer: None,
        }
    }

    /// Channel factory for `unix://<path>` destinations.
    pub fn factory(
        config: FrameConfig,
    ) -> impl FnMut(&str, &str, &str) -> Option<Box<dyn Channel>> + 'static {
        move |_scheme: &str, canonical: &str, _fragment: &str| {
            let path = canonical.strip_prefix("unix://")?;
            if path.is_empty() {
                warn!(uri = canonical, "unix destination without a path");
                return None;
            }
            let channel: Box<dyn Channel> =
                Box::new(StreamChannel::connect_to(path, config.clone()));
            Some(channel)
        }
    }

    fn open_stream(&mut self) -> Option<LinkStream> {
        match &mut self.endpoint {
            Endpoint::Accepted(stream) => stream.take(),
            Endpoint::Path(path) => match dial(&*path) {
                Ok(stream) => Some(stream),
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "connect failed");
                    None
                }
            },
        }
    }

    fn start(&mut self, stream: LinkStream, notifier: ChannelNotifier) -> Result<()> {
        stream.set_read_timeout(self.config.read_timeout)?;
        stream.set_write_timeout(self.config.write_timeout)?;
        self.peer = Some(stream.describe_peer());

        let limit = self.config.max_payload_size;
        let reader = FrameReader::with_limit(stream.try_clone()?, limit);
        let writer = FrameWriter::with_limit(stream, limit);
        let events = notifier;
        let handle = std::thread::Builder::new()
            .name(format!("linkrpc-{}", events.channel_id()))
            .spawn(move || {
                for frame in reader {
                    match frame {
                        Ok(frame) if events.frame_received(frame.to_vec()) => {}
                        Ok(_) => break,
                        Err(err) => {
                            warn!(channel = %events.channel_id(), error = %err, "stream read failed");
                            break;
                        }
                    }
                }
                events.closed();
            })
            .map_err(FrameError::Io)?;

        self.writer = Some(writer);
        self.reader = Some(handle);
        Ok(())
    }

    fn shutdown(&mut self) {
        if let Some(writer) = self.writer.take() {
            if let Err(err) = writer.get_ref().shutdown() {
                debug!(error = %err, "stream shutdown failed");
            }
        }
    }
}

impl Channel for StreamChannel {
    fn attach(&mut self, notifier: ChannelNotifier) {
        self.notifier = Some(notifier);
    }

    fn connect(&mut self) {
        if self.writer.is_some() {
            return;
        }
        let Some(notifier) = self.notifier.clone() else {
            return;
        };
        let Some(stream) = self.open_stream() else {
            notifier.closed();
            return;
        };
        match self.start(stream, notifier.clone()) {
            Ok(()) => {
                notifier.opened();
            }
            Err(err) => {
                warn!(error = %err, "could not start stream channel");
                notifier.closed();
            }
        }
    }

    fn close(&mut self) {
        if self.writer.is_some() {
            // The reader thread sees EOF and reports the close.
            self.shutdown();
        } else if let Some(notifier) = &self.notifier {
            notifier.closed();
        }
    }

    fn destroy(mut self: Box<Self>) {
        self.shutdown();
        if let Some(handle) = self.reader.take() {
            if handle.join().is_err() {
                warn!("stream reader thread panicked");
            }
        }
    }

    fn send(&mut self, frame: &[u8]) -> bool {
        let Some(writer) = self.writer.as_mut() else {
            return false;
        };
        match writer.write_frame(frame) {
            Ok(()) => {
                if let Some(notifier) = &self.notifier {
                    notifier.frame_sent(true);
                }
                true
            }
            Err(err) => {
                warn!(error = %err, "stream write failed");
                false
            }
        }
    }

    fn channel_type(&self) -> &str {
        UNIX_SCHEME
    }

    fn info(&self) -> Option<String> {
        self.peer.clone()
    }

    fn is_persistent(&self) -> bool {
        false
    }
}

impl Drop for StreamChannel {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for StreamChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let endpoint = match &self.endpoint {
            Endpoint::Accepted(_) => "accepted".to_string(),
            Endpoint::Path(path) => path.display().to_string(),
        };
        f.debug_struct("StreamChannel")
            .field("endpoint", &endpoint)
            .field("connected", &self.writer.is_some())
            .field("peer", &self.peer)
            .finish()
    }
}

impl Dispatcher {
    /// Dial `unix://<path>` destinations on demand.
    pub fn add_unix_channel_factory(&mut self, config: FrameConfig) {
        self.add_channel_factory(UNIX_SCHEME, StreamChannel::factory(config));
    }
}
