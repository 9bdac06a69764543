//! Request handlers, request info and wire-level errors.

use std::fmt;
use std::rc::Rc;

use linkrpc_frame::FrameId;
use serde_json::Value;

use crate::channel::{AuthnInfo, ChannelId};
use crate::dispatcher::Dispatcher;

/// An error carried in a response's `error` member.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{code}: {message}")]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

impl RpcError {
    pub const BAD_REQUEST: i64 = 400;
    pub const NOT_FOUND: i64 = 404;
    pub const QUEUE_OVERFLOW: i64 = 429;
    pub const INTERNAL: i64 = 500;

    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Per-frame context handed to handlers and response callbacks.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FrameInfo {
    /// `Channel::channel_type` of the channel the frame arrived on.
    pub channel_type: String,
}

/// An incoming request awaiting exactly one reply.
///
/// Consumed by `Dispatcher::respond`, `Dispatcher::respond_error` or
/// `RequestInfo::discard`.
#[must_use = "a request must be answered or explicitly discarded"]
pub struct RequestInfo {
    pub id: Option<FrameId>,
    pub src: String,
    pub dst: String,
    pub tag: String,
    pub method: String,
    pub auth: Option<Value>,
    /// Authenticated user, set by the channel or by `Dispatcher::check_auth`.
    pub authn: Option<AuthnInfo>,
    /// Channel the request arrived on.
    pub channel: ChannelId,
    /// Argument descriptor of the matched handler.
    pub args_descriptor: Option<Value>,
}

impl RequestInfo {
    /// True for notifications, which must not be answered.
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }

    /// Drop the request without replying.
    pub fn discard(self) {}
}

impl fmt::Debug for RequestInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let auth = self
            .auth
            .as_ref()
            .map(|value| format!("<redacted:{} bytes>", value.to_string().len()));
        f.debug_struct("RequestInfo")
            .field("id", &self.id)
            .field("src", &self.src)
            .field("dst", &self.dst)
            .field("tag", &self.tag)
            .field("method", &self.method)
            .field("auth", &auth)
            .field("authn", &self.authn)
            .field("channel", &self.channel)
            .finish()
    }
}

/// A request handler. `args` is `null` when the request had no params.
pub type Handler = Rc<dyn Fn(&mut Dispatcher, RequestInfo, &FrameInfo, &Value)>;

/// Global hook run before every handler. Returning `None` vetoes the handler;
/// the hook then owns the request and may have answered it.
pub type Prehandler =
    Box<dyn FnMut(&mut Dispatcher, RequestInfo, &FrameInfo, &Value) -> Option<RequestInfo>>;

pub(crate) struct HandlerEntry {
    pub pattern: String,
    pub descriptor: Option<Value>,
    pub handler: Handler,
}

/// Method patterns in registration order.
#[derive(Default)]
pub(crate) struct HandlerRegistry {
    entries: Vec<HandlerEntry>,
}

impl HandlerRegistry {
    pub fn add(&mut self, entry: HandlerEntry) {
        self.entries.push(entry);
    }

    /// Pick the handler for `method`.
    ///
    /// Matching ignores ASCII case. An exact pattern wins over wildcards,
    /// the longest wildcard prefix wins next, and ties go to the earliest
    /// registration.
    pub fn find(&self, method: &str) -> Option<&HandlerEntry> {
        let mut best: Option<(&HandlerEntry, usize)> = None;
        for entry in &self.entries {
            let Some(score) = match_score(&entry.pattern, method) else {
                continue;
            };
            if best.is_none_or(|(_, best_score)| score > best_score) {
                best = Some((entry, score));
            }
        }
        best.map(|(entry, _)| entry)
    }

    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.pattern.as_str())
    }

    pub fn get(&self, pattern: &str) -> Option<&HandlerEntry> {
        self.entries
            .iter()
            .find(|entry| entry.pattern.eq_ignore_ascii_case(pattern))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Exact matches score above every wildcard match.
fn match_score(pattern: &str, method: &str) -> Option<usize> {
    match pattern.strip_suffix('*') {
        Some(prefix) => {
            let matches = method.len() >= prefix.len()
                && method.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes());
            matches.then_some(prefix.len())
        }
        None => pattern
            .eq_ignore_ascii_case(method)
            .then_some(usize::MAX),
    }
}
