//! In-process channel that delivers every sent frame back to the dispatcher.

use crate::channel::{Channel, ChannelId, ChannelNotifier};
use crate::dispatcher::Dispatcher;

/// Destination of the loopback channel; also a local id.
pub const LOOPBACK_DST: &str = "RPC.LOOPBACK";

/// Lets a device call its own handlers through the normal dispatch path.
#[derive(Debug, Default)]
pub struct LoopbackChannel {
    notifier: Option<ChannelNotifier>,
}

impl LoopbackChannel {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Channel for LoopbackChannel {
    fn attach(&mut self, notifier: ChannelNotifier) {
        self.notifier = Some(notifier);
    }

    fn connect(&mut self) {
        if let Some(notifier) = &self.notifier {
            notifier.opened();
        }
    }

    fn close(&mut self) {
        if let Some(notifier) = &self.notifier {
            notifier.closed();
        }
    }

    fn send(&mut self, frame: &[u8]) -> bool {
        let Some(notifier) = &self.notifier else {
            return false;
        };
        notifier.frame_received(frame.to_vec()) && notifier.frame_sent(true)
    }

    fn channel_type(&self) -> &str {
        "loopback"
    }

    fn is_persistent(&self) -> bool {
        true
    }
}

impl Dispatcher {
    /// Register and open a loopback channel under `RPC.LOOPBACK`.
    pub fn add_loopback_channel(&mut self) -> ChannelId {
        let id = self.add_channel(LOOPBACK_DST, Box::new(LoopbackChannel::new()));
        self.add_local_id(LOOPBACK_DST);
        if let Err(err) = self.connect_channel(id) {
            tracing::warn!(error = %err, "loopback channel did not connect");
        }
        id
    }
}
