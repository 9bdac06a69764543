//! The dispatcher: routes frames between channels, handlers and callers.

use std::collections::hash_map::RandomState;
use std::collections::VecDeque;
use std::hash::{BuildHasher, Hasher};
use std::rc::Rc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::Duration;

use linkrpc_frame::{parse, Frame, FrameBuilder, FrameId};
use serde_json::Value;
use tracing::{debug, error, info, trace, warn};

use crate::auth::{AuthError, CredentialStore, DigestAssertion};
use crate::channel::{AuthnInfo, Channel, ChannelEvent, ChannelId, ChannelInfo, ChannelNotifier};
use crate::config::DispatcherConfig;
use crate::destination::{is_uri, parse_uri, UriDestination};
use crate::error::{DispatchError, Result};
use crate::handler::{
    FrameInfo, HandlerEntry, HandlerRegistry, Prehandler, RequestInfo, RpcError,
};
use crate::observer::{DispatchEvent, ObserverId, ObserverList};
use crate::pending::PendingTable;
use crate::queue::{OutgoingQueue, QueueEntry};
use crate::registry::{ChannelEntry, ChannelFactory, ChannelRegistry, FactoryRegistry};

/// Called exactly once with the outcome of a call, unless the call is
/// cancelled or no reply ever arrives.
pub type ResponseCallback =
    Box<dyn FnOnce(&mut Dispatcher, &FrameInfo, std::result::Result<Value, RpcError>)>;

/// Addressing and delivery options of an outbound call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallOptions {
    /// Defaults to the dispatcher's id.
    pub src: String,
    /// Empty selects the default route.
    pub dst: String,
    pub tag: String,
    pub key: String,
    /// Offer the frame to every broadcast-enabled channel instead.
    pub broadcast: bool,
    /// Fail instead of queueing when the channel cannot take the frame now.
    pub no_queue: bool,
}

impl CallOptions {
    pub fn to(dst: impl Into<String>) -> Self {
        Self {
            dst: dst.into(),
            ..Self::default()
        }
    }

    pub fn with_src(mut self, src: impl Into<String>) -> Self {
        self.src = src.into();
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    pub fn broadcast(mut self) -> Self {
        self.broadcast = true;
        self
    }

    pub fn no_queue(mut self) -> Self {
        self.no_queue = true;
        self
    }
}

/// Correlation ids: increasing, with a random stride of 1..=65536.
struct IdGenerator {
    last: u64,
    state: u64,
}

impl IdGenerator {
    fn new() -> Self {
        let seed = RandomState::new().build_hasher().finish() | 1;
        Self {
            last: 0,
            state: seed,
        }
    }

    fn next(&mut self) -> FrameId {
        // xorshift64
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        self.last = self.last.wrapping_add((x & 0xffff) + 1);
        FrameId::from(self.last)
    }
}

/// The RPC core.
///
/// Owns every registered channel, handler, pending request and queued frame.
/// All methods run on one thread; channel bindings on other threads report
/// through `ChannelNotifier`, and their events are applied by
/// `process_events` or `wait_for_events`.
pub struct Dispatcher {
    config: DispatcherConfig,
    local_ids: Vec<String>,
    channels: ChannelRegistry,
    factories: FactoryRegistry,
    handlers: HandlerRegistry,
    prehandler: Option<Prehandler>,
    pending: PendingTable<ResponseCallback>,
    queue: OutgoingQueue,
    observers: ObserverList,
    credentials: Option<Box<dyn CredentialStore>>,
    ids: IdGenerator,
    events_tx: Sender<(ChannelId, ChannelEvent)>,
    events_rx: Receiver<(ChannelId, ChannelEvent)>,
    #[cfg(feature = "schema")]
    schemas: linkrpc_schema::SchemaRegistry,
}

impl Dispatcher {
    pub fn new(config: DispatcherConfig) -> Self {
        let (events_tx, events_rx) = mpsc::channel();
        Self {
            local_ids: vec![config.id.clone()],
            channels: ChannelRegistry::default(),
            factories: FactoryRegistry::default(),
            handlers: HandlerRegistry::default(),
            prehandler: None,
            pending: PendingTable::new(config.max_pending_requests),
            queue: OutgoingQueue::new(config.max_queue_length),
            observers: ObserverList::default(),
            credentials: None,
            ids: IdGenerator::new(),
            events_tx,
            events_rx,
            #[cfg(feature = "schema")]
            schemas: linkrpc_schema::SchemaRegistry::new(),
            config,
        }
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Accept frames addressed to `id` in addition to the configured id.
    pub fn add_local_id(&mut self, id: impl Into<String>) {
        let id = id.into();
        if !self.is_local_id(&id) {
            self.local_ids.push(id);
        }
    }

    pub fn is_local_id(&self, id: &str) -> bool {
        self.local_ids.iter().any(|local| local == id)
    }

    // ---- channels ----

    /// Register a channel under `dst` (empty = learn from the first frame,
    /// `*` = default route). The channel is not connected.
    pub fn add_channel(&mut self, dst: &str, mut channel: Box<dyn Channel>) -> ChannelId {
        let id = self.channels.next_id();
        channel.attach(ChannelNotifier::new(id, self.events_tx.clone()));
        debug!(channel = %id, dst, channel_type = channel.channel_type(), "channel registered");
        self.channels.insert(ChannelEntry {
            id,
            dst: dst.to_string(),
            channel,
            is_open: false,
            is_busy: false,
        });
        id
    }

    /// Unregister a channel and hand it back to the caller.
    ///
    /// Queued frames pinned to it are dropped.
    pub fn remove_channel(&mut self, id: ChannelId) -> Option<Box<dyn Channel>> {
        let entry = self.channels.remove(id)?;
        let dropped = self.queue.remove_channel(id);
        debug!(channel = %id, dropped, "channel removed");
        Some(entry.channel)
    }

    pub fn connect_channel(&mut self, id: ChannelId) -> Result<()> {
        let entry = self
            .channels
            .get_mut(id)
            .ok_or(DispatchError::UnknownChannel(id))?;
        entry.channel.connect();
        Ok(())
    }

    pub fn close_channel(&mut self, id: ChannelId) -> Result<()> {
        let entry = self
            .channels
            .get_mut(id)
            .ok_or(DispatchError::UnknownChannel(id))?;
        entry.channel.close();
        Ok(())
    }

    pub fn connect_all(&mut self) {
        for entry in self.channels.iter_mut() {
            entry.channel.connect();
        }
    }

    pub fn disconnect_all(&mut self) {
        for entry in self.channels.iter_mut() {
            entry.channel.close();
        }
    }

    /// True if the default channel is open.
    pub fn is_connected(&self) -> bool {
        self.channels
            .default_channel()
            .and_then(|id| self.channels.get(id))
            .is_some_and(|entry| entry.is_open)
    }

    /// True if the default channel is open and idle.
    pub fn can_send(&self) -> bool {
        self.channels
            .default_channel()
            .and_then(|id| self.channels.get(id))
            .is_some_and(ChannelEntry::can_send)
    }

    pub fn channel_info(&self, id: ChannelId) -> Option<ChannelInfo> {
        self.channels.get(id).map(ChannelEntry::snapshot)
    }

    pub fn channel_infos(&self) -> Vec<ChannelInfo> {
        self.channels.iter().map(ChannelEntry::snapshot).collect()
    }

    /// Create channels on demand for `scheme://` destinations.
    pub fn add_channel_factory<F>(&mut self, scheme: &str, factory: F)
    where
        F: FnMut(&str, &str, &str) -> Option<Box<dyn Channel>> + 'static,
    {
        let factory: ChannelFactory = Box::new(factory);
        self.factories.add(scheme, factory);
        debug!(scheme, "channel factory registered");
    }

    // ---- handlers ----

    /// Register a handler for a method pattern.
    ///
    /// `descriptor` is a JSON Schema of the request `params`.
    pub fn add_handler<F>(&mut self, pattern: &str, descriptor: Option<Value>, handler: F) -> Result<()>
    where
        F: Fn(&mut Dispatcher, RequestInfo, &FrameInfo, &Value) + 'static,
    {
        if pattern.is_empty() {
            return Err(DispatchError::InvalidPattern(pattern.to_string()));
        }

        #[cfg(feature = "schema")]
        if let Some(schema) = &descriptor {
            self.schemas.register_value(pattern, schema)?;
        }

        self.handlers.add(HandlerEntry {
            pattern: pattern.to_string(),
            descriptor,
            handler: Rc::new(handler),
        });
        debug!(pattern, "handler registered");
        Ok(())
    }

    pub fn set_prehandler<F>(&mut self, prehandler: F)
    where
        F: FnMut(&mut Dispatcher, RequestInfo, &FrameInfo, &Value) -> Option<RequestInfo>
            + 'static,
    {
        self.prehandler = Some(Box::new(prehandler));
    }

    pub fn clear_prehandler(&mut self) {
        self.prehandler = None;
    }

    /// Registered method patterns, in registration order.
    pub fn method_patterns(&self) -> Vec<String> {
        self.handlers.patterns().map(str::to_string).collect()
    }

    /// Descriptor of a registered pattern: `None` if no such pattern,
    /// `Some(None)` if it has no descriptor.
    pub fn method_descriptor(&self, pattern: &str) -> Option<Option<Value>> {
        let entry = self.handlers.get(pattern)?;
        Some(self.descriptor_for(entry))
    }

    fn descriptor_for(&self, entry: &HandlerEntry) -> Option<Value> {
        #[cfg(feature = "schema")]
        if entry.descriptor.is_none() {
            return self.schemas.schema(&entry.pattern).cloned();
        }
        entry.descriptor.clone()
    }

    /// Load `<Pattern>.schema.json` descriptors from a directory.
    #[cfg(feature = "schema")]
    pub fn load_schemas(&mut self, path: &std::path::Path) -> Result<usize> {
        let loaded = self.schemas.load_directory(path)?;
        info!(path = %path.display(), loaded, "loaded args schemas");
        Ok(loaded)
    }

    #[cfg(feature = "schema")]
    pub fn schemas(&self) -> &linkrpc_schema::SchemaRegistry {
        &self.schemas
    }

    pub fn set_credential_store(&mut self, store: Box<dyn CredentialStore>) {
        self.credentials = Some(store);
    }

    // ---- observers ----

    pub fn add_observer<F>(&mut self, observer: F) -> ObserverId
    where
        F: FnMut(&DispatchEvent<'_>) + 'static,
    {
        self.observers.add(Box::new(observer))
    }

    pub fn remove_observer(&mut self, id: ObserverId) -> bool {
        self.observers.remove(id)
    }

    // ---- outbound calls ----

    /// Send a call.
    ///
    /// With a callback the call gets a correlation id, returned here, and the
    /// callback fires once with the reply or with a 429 error if the pending
    /// table overflows first. Without one the call is a notification.
    pub fn call(
        &mut self,
        method: &str,
        params: Option<Value>,
        opts: &CallOptions,
        callback: Option<ResponseCallback>,
    ) -> Result<Option<FrameId>> {
        let src = if opts.src.is_empty() {
            self.config.id.clone()
        } else {
            opts.src.clone()
        };
        let mut builder = FrameBuilder::call(method)
            .src(src)
            .tag(opts.tag.clone())
            .key(opts.key.clone());
        if let Some(params) = params {
            builder = builder.params(params);
        }

        let id = match callback {
            Some(callback) => {
                let id = self.ids.next();
                self.admit_pending(id.clone(), callback);
                builder = builder.id(id.clone());
                Some(id)
            }
            None => None,
        };

        let sent = if opts.broadcast {
            self.broadcast(&builder, &opts.dst)
        } else {
            self.dispatch(builder, None, &opts.dst, !opts.no_queue)
        };

        if let Err(err) = sent {
            if let Some(id) = &id {
                self.pending.take(id);
            }
            debug!(method, error = %err, "call failed");
            return Err(err);
        }
        Ok(id)
    }

    /// `call` with a closure callback.
    pub fn call_with<F>(
        &mut self,
        method: &str,
        params: Option<Value>,
        opts: &CallOptions,
        callback: F,
    ) -> Result<FrameId>
    where
        F: FnOnce(&mut Dispatcher, &FrameInfo, std::result::Result<Value, RpcError>) + 'static,
    {
        let id = self.call(method, params, opts, Some(Box::new(callback)))?;
        id.ok_or_else(|| DispatchError::NotSent(opts.dst.clone()))
    }

    /// Send a notification: a call without id that gets no reply.
    pub fn notify(&mut self, method: &str, params: Option<Value>, opts: &CallOptions) -> Result<()> {
        self.call(method, params, opts, None).map(|_| ())
    }

    /// Forget a pending call. A late reply is then ignored.
    pub fn cancel_call(&mut self, id: &FrameId) -> bool {
        self.pending.take(id).is_some()
    }

    pub fn pending_requests(&self) -> usize {
        self.pending.len()
    }

    pub fn queued_frames(&self) -> usize {
        self.queue.len()
    }

    fn admit_pending(&mut self, id: FrameId, callback: ResponseCallback) {
        let evicted = self.pending.admit(id, callback);
        for (old_id, callback) in evicted {
            warn!(id = %old_id, "pending request table full, evicting oldest request");
            callback(
                self,
                &FrameInfo::default(),
                Err(RpcError::new(
                    RpcError::QUEUE_OVERFLOW,
                    "Request queue overflow",
                )),
            );
        }
    }

    fn broadcast(&mut self, builder: &FrameBuilder, dst: &str) -> Result<()> {
        let targets: Vec<ChannelId> = self
            .channels
            .iter()
            .filter(|entry| entry.channel.is_broadcast_enabled())
            .map(|entry| entry.id)
            .collect();

        let mut any = false;
        for id in targets {
            any |= self.dispatch(builder.clone(), Some(id), dst, false).is_ok();
        }
        if any {
            Ok(())
        } else {
            Err(DispatchError::NotSent(dst.to_string()))
        }
    }

    // ---- responses ----

    /// Answer a request with a result.
    pub fn respond(&mut self, ri: RequestInfo, result: Value) -> Result<()> {
        self.respond_with(ri, Ok(result))
    }

    /// Answer a request with an error.
    pub fn respond_error(&mut self, ri: RequestInfo, code: i64, message: impl Into<String>) -> Result<()> {
        self.respond_with(ri, Err(RpcError::new(code, message)))
    }

    /// Answer a request. Answering a notification does nothing.
    ///
    /// The reply goes out on the channel the request arrived on, or is routed
    /// by the requester's address if that channel is gone.
    pub fn respond_with(
        &mut self,
        ri: RequestInfo,
        outcome: std::result::Result<Value, RpcError>,
    ) -> Result<()> {
        let Some(id) = ri.id else {
            trace!(method = %ri.method, "not answering a notification");
            return Ok(());
        };

        let builder = match outcome {
            Ok(result) => FrameBuilder::result(result),
            Err(err) => FrameBuilder::error(err.code, err.message),
        };
        let src = if ri.dst.is_empty() {
            self.config.id.clone()
        } else {
            ri.dst
        };
        let builder = builder.id(id).src(src).tag(ri.tag);
        let pinned = self.channels.get(ri.channel).map(|entry| entry.id);
        self.dispatch(builder, pinned, &ri.src, true)
    }

    /// Verify the request's digest `auth` assertion, if any.
    ///
    /// Advisory: a missing, malformed, foreign-realm or wrong assertion logs a
    /// warning and the request comes back without a user. Only a failing
    /// credential store answers the request (500) and returns `None`.
    pub fn check_auth(&mut self, mut ri: RequestInfo) -> Option<RequestInfo> {
        if let Some(authn) = ri.authn.as_ref().filter(|authn| !authn.username.is_empty()) {
            debug!(user = %authn.username, "request already authenticated");
            return Some(ri);
        }
        let Some(auth) = ri.auth.as_ref() else {
            return Some(ri);
        };
        let Some(assertion) = DigestAssertion::from_value(auth) else {
            warn!(method = %ri.method, "incomplete auth assertion");
            return Some(ri);
        };
        if assertion.realm != self.config.auth_domain {
            warn!(
                expected = %self.config.auth_domain,
                got = %assertion.realm,
                "auth assertion for a different realm"
            );
            return Some(ri);
        }

        let verdict = match &self.credentials {
            Some(store) => store.verify_digest(&assertion),
            None => Err(AuthError::Unavailable(
                "no credential store configured".to_string(),
            )),
        };
        match verdict {
            Ok(true) => {
                debug!(user = %assertion.username, "auth ok");
                ri.authn = Some(AuthnInfo {
                    username: assertion.username,
                });
                Some(ri)
            }
            Ok(false) => {
                warn!(user = %assertion.username, "invalid digest auth");
                Some(ri)
            }
            Err(err) => {
                error!(error = %err, "credential check failed");
                if let Err(send_err) = self.respond_error(ri, RpcError::INTERNAL, err.to_string()) {
                    debug!(error = %send_err, "could not report auth failure");
                }
                None
            }
        }
    }

    // ---- routing ----

    /// Find or create the channel for `dst`.
    ///
    /// Known destinations match first. An unknown URI goes to the factory for
    /// its scheme; any other unknown destination takes the default route.
    fn resolve(&mut self, dst: &str) -> Option<ChannelId> {
        if !dst.is_empty() {
            if let Some(id) = self.channels.find_by_dst(dst) {
                trace!(dst, channel = %id, "resolved");
                return Some(id);
            }
            if let Some(uri) = parse_uri(dst) {
                return self.create_channel(dst, &uri);
            }
        }
        let id = self.channels.default_channel();
        trace!(dst, channel = ?id, "resolved via default route");
        id
    }

    fn create_channel(&mut self, dst: &str, uri: &UriDestination) -> Option<ChannelId> {
        let Some(factory) = self.factories.get_mut(&uri.scheme) else {
            error!(dst, scheme = %uri.scheme, "unsupported connection scheme");
            return None;
        };
        let Some(channel) = factory(&uri.scheme, &uri.canonical, &uri.fragment) else {
            error!(dst, "failed to create channel");
            return None;
        };

        let id = self.add_channel(&uri.canonical, channel);
        info!(channel = %id, uri = %uri.canonical, "created channel for destination");
        if let Some(entry) = self.channels.get_mut(id) {
            entry.channel.connect();
        }
        Some(id)
    }

    /// Offer one frame to a channel. Busy and closed channels refuse.
    fn try_send(&mut self, id: ChannelId, frame: &[u8]) -> bool {
        let Some(entry) = self.channels.get_mut(id) else {
            return false;
        };
        if !entry.can_send() {
            return false;
        }
        let accepted = entry.channel.send(frame);
        if accepted {
            entry.is_busy = true;
            debug!(channel = %id, len = frame.len(), "send frame");
        }
        accepted
    }

    fn dispatch(
        &mut self,
        builder: FrameBuilder,
        pinned: Option<ChannelId>,
        dst: &str,
        enqueue: bool,
    ) -> Result<()> {
        let channel = match pinned {
            Some(id) => Some(id),
            None => self.resolve(dst),
        };
        // URI destinations denote point-to-point links; the peer is implied.
        let wire_dst = if is_uri(dst) { "" } else { dst };
        let frame = builder.dst(wire_dst).build();
        self.observers
            .notify(&DispatchEvent::DispatchFrame { frame: &frame });
        trace!(frame = %String::from_utf8_lossy(&frame), "dispatch frame");

        let Some(channel) = channel else {
            warn!(dst, "no route for frame");
            return Err(DispatchError::NoRoute(dst.to_string()));
        };
        if self.try_send(channel, &frame) {
            return Ok(());
        }

        if enqueue {
            let entry = QueueEntry {
                channel,
                dst: dst.to_string(),
                frame,
            };
            if let Some(evicted) = self.queue.enqueue(entry) {
                if evicted > 0 {
                    warn!(evicted, "outgoing queue full, dropped oldest frames");
                }
                debug!(channel = %channel, queued = self.queue.len(), "queued frame");
                return Ok(());
            }
        }

        warn!(channel = %channel, dst, "dropped frame");
        Err(DispatchError::NotSent(dst.to_string()))
    }

    /// Retry queued frames in FIFO order.
    fn drain_queue(&mut self) {
        if self.queue.is_empty() {
            return;
        }
        let entries = self.queue.take_all();
        let mut kept = VecDeque::new();
        for entry in entries {
            if self.try_send(entry.channel, &entry.frame) {
                debug!(channel = %entry.channel, dst = %entry.dst, "sent queued frame");
            } else {
                kept.push_back(entry);
            }
        }
        self.queue.restore(kept);
    }

    // ---- channel events ----

    /// Apply every queued channel event. Returns the number handled.
    pub fn process_events(&mut self) -> usize {
        let mut handled = 0;
        while let Ok((id, event)) = self.events_rx.try_recv() {
            self.handle_channel_event(id, event);
            handled += 1;
        }
        handled
    }

    /// Block up to `timeout` for the first event, then apply all queued events.
    pub fn wait_for_events(&mut self, timeout: Duration) -> usize {
        match self.events_rx.recv_timeout(timeout) {
            Ok((id, event)) => {
                self.handle_channel_event(id, event);
                1 + self.process_events()
            }
            Err(_) => 0,
        }
    }

    /// Apply one channel event now.
    pub fn handle_channel_event(&mut self, id: ChannelId, event: ChannelEvent) {
        let Some(entry) = self.channels.get_mut(id) else {
            debug!(channel = %id, ?event, "event for unregistered channel ignored");
            return;
        };

        match event {
            ChannelEvent::Opened => {
                entry.is_open = true;
                entry.is_busy = false;
                debug!(
                    channel = %id,
                    channel_type = entry.channel.channel_type(),
                    info = entry.channel.info().unwrap_or_default(),
                    "channel open"
                );
                let dst = entry.dst.clone();
                if !dst.is_empty() {
                    self.observers
                        .notify(&DispatchEvent::ChannelOpened { dst: &dst });
                }
                self.drain_queue();
            }
            ChannelEvent::FrameReceived(bytes) => {
                debug!(channel = %id, len = bytes.len(), "got frame");
                match parse(&bytes) {
                    Ok(frame) => self.accept_frame(id, frame),
                    Err(err) => {
                        warn!(channel = %id, error = %err, "invalid frame");
                        self.reject(id);
                    }
                }
            }
            ChannelEvent::FrameReceivedParsed(frame) => {
                debug!(channel = %id, src = %frame.src, "got parsed frame");
                self.accept_frame(id, frame);
            }
            ChannelEvent::FrameSent(success) => {
                entry.is_busy = false;
                debug!(channel = %id, success, "frame sent");
                self.drain_queue();
            }
            ChannelEvent::Closed => {
                entry.is_open = false;
                entry.is_busy = false;
                let remove = !entry.channel.is_persistent();
                let dst = entry.dst.clone();
                debug!(channel = %id, remove, "channel closed");
                if !dst.is_empty() {
                    self.observers
                        .notify(&DispatchEvent::ChannelClosed { dst: &dst });
                }
                if remove {
                    if let Some(channel) = self.remove_channel(id) {
                        channel.destroy();
                    }
                }
            }
        }
    }

    fn accept_frame(&mut self, id: ChannelId, frame: Frame) {
        if !self.handle_frame(id, frame) {
            self.reject(id);
        }
    }

    /// Close a non-persistent channel that delivered a bad frame.
    fn reject(&mut self, id: ChannelId) {
        if let Some(entry) = self.channels.get_mut(id) {
            if !entry.channel.is_persistent() {
                entry.channel.close();
            }
        }
    }

    fn handle_frame(&mut self, id: ChannelId, frame: Frame) -> bool {
        let wrong_dst = !frame.dst.is_empty() && !self.is_local_id(&frame.dst);
        let Some(entry) = self.channels.get_mut(id) else {
            return false;
        };
        if !entry.is_open {
            warn!(channel = %id, channel_type = entry.channel.channel_type(), "ignored frame from closed channel");
            return false;
        }
        if wrong_dst {
            warn!(channel = %id, dst = %frame.dst, "wrong dst");
            return false;
        }
        if entry.dst.is_empty() {
            entry.dst = frame.src.clone();
        }

        if frame.method.is_some() {
            self.handle_request(id, frame)
        } else {
            self.handle_response(id, frame)
        }
    }

    fn handle_request(&mut self, id: ChannelId, frame: Frame) -> bool {
        let Some(entry) = self.channels.get(id) else {
            return false;
        };
        let frame_info = FrameInfo {
            channel_type: entry.channel.channel_type().to_string(),
        };
        let peer = entry.channel.info().unwrap_or_default();
        let authn = entry.channel.authn_info(&self.config.auth_domain);

        let Frame {
            id: frame_id,
            src,
            dst,
            tag,
            method,
            params,
            auth,
            ..
        } = frame;
        let method = method.unwrap_or_default();

        let found = self.handlers.find(&method).map(|entry| {
            (
                entry.pattern.clone(),
                self.descriptor_for(entry),
                Rc::clone(&entry.handler),
            )
        });

        let mut ri = RequestInfo {
            id: frame_id,
            src,
            dst,
            tag,
            method,
            auth,
            authn,
            channel: id,
            args_descriptor: None,
        };

        let Some((pattern, descriptor, handler)) = found else {
            warn!(method = %ri.method, "no handler");
            let message = format!("No handler for {}", ri.method);
            if let Err(err) = self.respond_error(ri, RpcError::NOT_FOUND, message) {
                debug!(error = %err, "could not send 404");
            }
            return true;
        };
        ri.args_descriptor = descriptor;

        #[cfg(feature = "schema")]
        if let Err(err) = self.schemas.validate(&pattern, params.as_ref()) {
            let detail = match err {
                linkrpc_schema::SchemaError::ValidationFailed { message, .. } => message,
                other => other.to_string(),
            };
            warn!(method = %ri.method, %detail, "invalid args");
            if let Err(err) = self.respond_error(ri, RpcError::BAD_REQUEST, format!("invalid args: {detail}")) {
                debug!(error = %err, "could not send 400");
            }
            return true;
        }
        #[cfg(not(feature = "schema"))]
        let _ = &pattern;

        let args = params.unwrap_or(Value::Null);

        let ri = match self.prehandler.take() {
            Some(mut prehandler) => {
                let outcome = prehandler(self, ri, &frame_info, &args);
                if self.prehandler.is_none() {
                    self.prehandler = Some(prehandler);
                }
                match outcome {
                    Some(ri) => ri,
                    None => {
                        debug!("prehandler took the request");
                        return true;
                    }
                }
            }
            None => ri,
        };

        info!(method = %ri.method, via = %frame_info.channel_type, peer = %peer, "request");
        handler(self, ri, &frame_info, &args);
        true
    }

    fn handle_response(&mut self, id: ChannelId, frame: Frame) -> bool {
        let Some(frame_id) = frame.id else {
            warn!(channel = %id, "response without an id");
            return false;
        };
        let Some(callback) = self.pending.take(&frame_id) else {
            debug!(id = %frame_id, "response to unknown request ignored");
            return true;
        };

        let frame_info = FrameInfo {
            channel_type: self
                .channels
                .get(id)
                .map(|entry| entry.channel.channel_type().to_string())
                .unwrap_or_default(),
        };
        let outcome = match frame.error {
            Some(err) => Err(RpcError::new(err.code, err.message)),
            None => Ok(frame.result.unwrap_or(Value::Null)),
        };
        callback(self, &frame_info, outcome);
        true
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(DispatcherConfig::default())
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("id", &self.config.id)
            .field("local_ids", &self.local_ids)
            .field("channels", &self.channels.len())
            .field("factories", &self.factories.schemes().collect::<Vec<_>>())
            .field("handlers", &self.handlers.len())
            .field("pending", &self.pending.len())
            .field("queued", &self.queue.len())
            .field("observers", &self.observers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_increase_and_never_repeat() {
        let mut ids = IdGenerator::new();
        let mut last = 0u64;
        for _ in 0..1000 {
            let id = ids.next().as_u64().unwrap();
            assert!(id > last);
            assert!(id - last <= 0x10000);
            last = id;
        }
    }

    #[test]
    fn call_options_builders() {
        let opts = CallOptions::to("cloud").with_tag("t").with_key("k").no_queue();
        assert_eq!(opts.dst, "cloud");
        assert_eq!(opts.tag, "t");
        assert_eq!(opts.key, "k");
        assert!(opts.no_queue);
        assert!(!opts.broadcast);
    }

    #[test]
    fn local_ids_include_configured_id() {
        let mut d = Dispatcher::new(DispatcherConfig::default().with_id("dev-1"));
        assert!(d.is_local_id("dev-1"));
        d.add_local_id("alias");
        d.add_local_id("alias");
        assert!(d.is_local_id("alias"));
        assert_eq!(d.local_ids.len(), 2);
    }

    #[test]
    fn empty_pattern_is_rejected() {
        let mut d = Dispatcher::default();
        let err = d.add_handler("", None, |_, ri, _, _| ri.discard());
        assert!(matches!(err, Err(DispatchError::InvalidPattern(_))));
    }
}
