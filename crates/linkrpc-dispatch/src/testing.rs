//! Scriptable in-memory channel for exercising the dispatcher.

use std::cell::RefCell;
use std::rc::Rc;

use serde_json::Value;

use crate::channel::{AuthnInfo, Channel, ChannelEvent, ChannelNotifier};

#[derive(Debug, Default)]
struct MockState {
    notifier: Option<ChannelNotifier>,
    sent: Vec<Vec<u8>>,
    connects: usize,
    closes: usize,
    destroyed: bool,
    accept_sends: bool,
}

/// A channel that records what the dispatcher does with it.
///
/// Nothing happens on its own: tests drive open, close, delivery and send
/// completion through the paired [`MockHandle`].
#[derive(Debug)]
pub struct MockChannel {
    state: Rc<RefCell<MockState>>,
    channel_type: String,
    info: Option<String>,
    persistent: bool,
    broadcast: bool,
    authn_user: Option<String>,
}

/// Test-side view of a [`MockChannel`].
#[derive(Debug, Clone)]
pub struct MockHandle {
    state: Rc<RefCell<MockState>>,
}

impl MockChannel {
    /// A non-persistent channel of type `mock` that accepts every send.
    pub fn new() -> (Self, MockHandle) {
        let state = Rc::new(RefCell::new(MockState {
            accept_sends: true,
            ..MockState::default()
        }));
        let channel = Self {
            state: Rc::clone(&state),
            channel_type: "mock".to_string(),
            info: None,
            persistent: false,
            broadcast: false,
            authn_user: None,
        };
        (channel, MockHandle { state })
    }

    pub fn with_type(mut self, channel_type: impl Into<String>) -> Self {
        self.channel_type = channel_type.into();
        self
    }

    pub fn with_info(mut self, info: impl Into<String>) -> Self {
        self.info = Some(info.into());
        self
    }

    pub fn persistent(mut self) -> Self {
        self.persistent = true;
        self
    }

    pub fn broadcast(mut self) -> Self {
        self.broadcast = true;
        self
    }

    /// Report `user` as authenticated by the transport.
    pub fn with_authn(mut self, user: impl Into<String>) -> Self {
        self.authn_user = Some(user.into());
        self
    }
}

impl Channel for MockChannel {
    fn attach(&mut self, notifier: ChannelNotifier) {
        self.state.borrow_mut().notifier = Some(notifier);
    }

    fn connect(&mut self) {
        self.state.borrow_mut().connects += 1;
    }

    fn close(&mut self) {
        self.state.borrow_mut().closes += 1;
    }

    fn destroy(self: Box<Self>) {
        self.state.borrow_mut().destroyed = true;
    }

    fn send(&mut self, frame: &[u8]) -> bool {
        let mut state = self.state.borrow_mut();
        if !state.accept_sends {
            return false;
        }
        state.sent.push(frame.to_vec());
        true
    }

    fn channel_type(&self) -> &str {
        &self.channel_type
    }

    fn info(&self) -> Option<String> {
        self.info.clone()
    }

    fn is_persistent(&self) -> bool {
        self.persistent
    }

    fn is_broadcast_enabled(&self) -> bool {
        self.broadcast
    }

    fn authn_info(&self, _auth_domain: &str) -> Option<AuthnInfo> {
        self.authn_user.clone().map(|username| AuthnInfo { username })
    }
}

impl MockHandle {
    fn notify(&self, event: ChannelEvent) -> bool {
        let notifier = self.state.borrow().notifier.clone();
        notifier.is_some_and(|notifier| notifier.notify(event))
    }

    /// Report the link as open.
    pub fn open(&self) -> bool {
        self.notify(ChannelEvent::Opened)
    }

    /// Report the link as closed.
    pub fn close(&self) -> bool {
        self.notify(ChannelEvent::Closed)
    }

    /// Deliver a raw frame.
    pub fn deliver(&self, frame: impl Into<Vec<u8>>) -> bool {
        self.notify(ChannelEvent::FrameReceived(frame.into()))
    }

    /// Report completion of the last send.
    pub fn complete_send(&self) -> bool {
        self.notify(ChannelEvent::FrameSent(true))
    }

    /// Make `send` refuse (or accept again).
    pub fn set_accept_sends(&self, accept: bool) {
        self.state.borrow_mut().accept_sends = accept;
    }

    /// Frames accepted by `send`, in order.
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.state.borrow().sent.clone()
    }

    /// Accepted frames decoded as JSON.
    pub fn sent_json(&self) -> Vec<Value> {
        self.state
            .borrow()
            .sent
            .iter()
            .map(|frame| serde_json::from_slice(frame).unwrap_or(Value::Null))
            .collect()
    }

    /// Forget recorded frames.
    pub fn clear_sent(&self) {
        self.state.borrow_mut().sent.clear();
    }

    pub fn connects(&self) -> usize {
        self.state.borrow().connects
    }

    pub fn closes(&self) -> usize {
        self.state.borrow().closes
    }

    pub fn is_destroyed(&self) -> bool {
        self.state.borrow().destroyed
    }
}
