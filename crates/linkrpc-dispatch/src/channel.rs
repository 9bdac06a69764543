//! The channel capability interface and the event path back into the dispatcher.

use std::fmt;
use std::sync::mpsc::Sender;

use linkrpc_frame::Frame;
use serde::Serialize;

/// Opaque handle assigned to a channel when it is registered. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ChannelId(pub(crate) u64);

impl ChannelId {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ch-{}", self.0)
    }
}

/// Events a channel binding reports to the dispatcher.
#[derive(Debug)]
pub enum ChannelEvent {
    /// The link is up and can accept a frame.
    Opened,
    /// Raw JSON bytes of one frame arrived.
    FrameReceived(Vec<u8>),
    /// A frame arrived that the binding already decoded.
    FrameReceivedParsed(Frame),
    /// The frame handed to `Channel::send` left the binding.
    FrameSent(bool),
    /// The link went down.
    Closed,
}

/// Sender half of the dispatcher's event queue, bound to one channel.
///
/// Cheap to clone and safe to move to a binding's I/O thread. Events are
/// applied when the dispatcher thread calls `Dispatcher::process_events`.
#[derive(Clone)]
pub struct ChannelNotifier {
    id: ChannelId,
    tx: Sender<(ChannelId, ChannelEvent)>,
}

impl ChannelNotifier {
    pub(crate) fn new(id: ChannelId, tx: Sender<(ChannelId, ChannelEvent)>) -> Self {
        Self { id, tx }
    }

    /// The channel this notifier reports for.
    pub fn channel_id(&self) -> ChannelId {
        self.id
    }

    /// Queue an event. Returns false once the dispatcher is gone.
    pub fn notify(&self, event: ChannelEvent) -> bool {
        self.tx.send((self.id, event)).is_ok()
    }

    pub fn opened(&self) -> bool {
        self.notify(ChannelEvent::Opened)
    }

    pub fn frame_received(&self, frame: Vec<u8>) -> bool {
        self.notify(ChannelEvent::FrameReceived(frame))
    }

    pub fn frame_received_parsed(&self, frame: Frame) -> bool {
        self.notify(ChannelEvent::FrameReceivedParsed(frame))
    }

    pub fn frame_sent(&self, success: bool) -> bool {
        self.notify(ChannelEvent::FrameSent(success))
    }

    pub fn closed(&self) -> bool {
        self.notify(ChannelEvent::Closed)
    }
}

impl fmt::Debug for ChannelNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelNotifier")
            .field("id", &self.id)
            .finish()
    }
}

/// Identity a channel established for its peer on its own (e.g. TLS client
/// certificates), independent of any `auth` member in frames.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct AuthnInfo {
    pub username: String,
}

/// One communication endpoint.
///
/// Implemented by transport bindings. The dispatcher owns the registered
/// channel and is the only caller of these methods; the binding reports back
/// through the `ChannelNotifier` it receives in `attach`.
pub trait Channel {
    /// Called once on registration.
    fn attach(&mut self, notifier: ChannelNotifier);

    /// Start connecting. Success is reported with `ChannelEvent::Opened`.
    fn connect(&mut self);

    /// Start closing. Completion is reported with `ChannelEvent::Closed`.
    fn close(&mut self);

    /// Release the channel after it was unregistered.
    fn destroy(self: Box<Self>) {}

    /// Hand one frame to the link. Returns false if it was not accepted.
    ///
    /// An accepted frame must later be followed by `ChannelEvent::FrameSent`
    /// or `ChannelEvent::Closed`.
    fn send(&mut self, frame: &[u8]) -> bool;

    /// Short type name, e.g. `"loopback"` or `"unix"`.
    fn channel_type(&self) -> &str;

    /// Free-form description of the peer, if the binding has one.
    fn info(&self) -> Option<String> {
        None
    }

    /// Persistent channels stay registered while closed and may reopen.
    fn is_persistent(&self) -> bool;

    fn is_broadcast_enabled(&self) -> bool {
        false
    }

    fn authn_info(&self, _auth_domain: &str) -> Option<AuthnInfo> {
        None
    }
}

/// Snapshot of one registered channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelInfo {
    pub id: ChannelId,
    #[serde(rename = "type")]
    pub channel_type: String,
    pub info: Option<String>,
    pub dst: String,
    pub is_open: bool,
    pub is_busy: bool,
    pub is_persistent: bool,
    pub is_broadcast_enabled: bool,
}
