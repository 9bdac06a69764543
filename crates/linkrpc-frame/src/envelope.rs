//! JSON envelope codec.
//!
//! A frame is one JSON object on the wire:
//!
//! ```text
//! {"id":17,"src":"client","dst":"device","tag":"t1","method":"Math.Add","params":{"a":2,"b":3}}
//! {"id":17,"src":"device","dst":"client","tag":"t1","result":5}
//! {"id":17,"src":"device","dst":"client","error":{"code":404,"message":"No handler for Foo"}}
//! ```
//!
//! Exactly one of `method` (with optional `params`), `result` or `error` is
//! produced per frame. A call without `id` is a notification.

use std::fmt;

use serde_json::{Map, Value};
use tracing::trace;

use crate::error::{FrameError, Result};

/// Correlation id as it appeared on the wire.
///
/// Numeric ids are kept in their decimal text form so that string and number
/// ids share one representation. An id is written back unquoted only when its
/// text is the canonical decimal form of a `u64`, so `"007"` stays a string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FrameId(String);

impl FrameId {
    /// Wrap a textual id.
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    /// The textual form of the id.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The id as an unsigned number, if it is one.
    pub fn as_u64(&self) -> Option<u64> {
        if self.is_numeric() {
            self.0.parse().ok()
        } else {
            None
        }
    }

    fn is_numeric(&self) -> bool {
        !self.0.is_empty() && self.0.bytes().all(|b| b.is_ascii_digit())
    }

    /// JSON value used when the id is serialized.
    pub fn to_json(&self) -> Value {
        match self.as_u64() {
            Some(n) if n.to_string() == self.0 => Value::from(n),
            _ => Value::String(self.0.clone()),
        }
    }
}

impl From<u64> for FrameId {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

impl From<&str> for FrameId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for FrameId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Body of an `error` member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorBody {
    pub code: i64,
    pub message: String,
}

impl ErrorBody {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Classification of a decoded frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// A call that expects a response.
    Request,
    /// A call without a correlation id. No response is permitted.
    Notification,
    /// A `result` or `error` reply.
    Response,
}

/// A decoded frame.
///
/// Empty strings stand for absent `src`/`dst`/`tag`/`key`.
#[derive(Clone, PartialEq, Default)]
pub struct Frame {
    pub version: Option<i64>,
    pub id: Option<FrameId>,
    pub src: String,
    pub dst: String,
    pub tag: String,
    pub key: String,
    pub method: Option<String>,
    pub params: Option<Value>,
    pub result: Option<Value>,
    pub error: Option<ErrorBody>,
    pub auth: Option<Value>,
}

impl Frame {
    /// Request, notification or response.
    pub fn kind(&self) -> FrameKind {
        match (&self.method, &self.id) {
            (Some(_), Some(_)) => FrameKind::Request,
            (Some(_), None) => FrameKind::Notification,
            (None, _) => FrameKind::Response,
        }
    }

    /// Re-encode this frame with the canonical field order.
    ///
    /// `version` and `auth` are not carried over.
    pub fn to_bytes(&self) -> Vec<u8> {
        let builder = match (&self.method, &self.error) {
            (Some(method), _) => {
                let builder = FrameBuilder::call(method.clone());
                match &self.params {
                    Some(params) => builder.params(params.clone()),
                    None => builder,
                }
            }
            (None, Some(err)) => FrameBuilder::error(err.code, err.message.clone()),
            (None, None) => FrameBuilder::result(self.result.clone().unwrap_or(Value::Null)),
        };

        let builder = builder
            .src(self.src.clone())
            .dst(self.dst.clone())
            .tag(self.tag.clone())
            .key(self.key.clone());
        match &self.id {
            Some(id) => builder.id(id.clone()).build(),
            None => builder.build(),
        }
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let auth = self
            .auth
            .as_ref()
            .map(|value| format!("<redacted:{} bytes>", value.to_string().len()));
        f.debug_struct("Frame")
            .field("version", &self.version)
            .field("id", &self.id)
            .field("src", &self.src)
            .field("dst", &self.dst)
            .field("tag", &self.tag)
            .field("key", &self.key)
            .field("method", &self.method)
            .field("params", &self.params)
            .field("result", &self.result)
            .field("error", &self.error)
            .field("auth", &auth)
            .finish()
    }
}

/// Decode one frame from its JSON bytes.
///
/// Unknown members are ignored. `args` is accepted as an alias of `params`;
/// `params` wins when both are present.
pub fn parse(bytes: &[u8]) -> Result<Frame> {
    let value: Value = serde_json::from_slice(bytes)?;
    let Value::Object(mut obj) = value else {
        return Err(FrameError::NotAnObject);
    };

    let id = match obj.remove("id") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.is_empty() => None,
        Some(Value::String(s)) => Some(FrameId(s)),
        Some(Value::Number(n)) => Some(FrameId(n.to_string())),
        Some(_) => return Err(FrameError::InvalidId),
    };

    let version = match obj.remove("v") {
        None | Some(Value::Null) => None,
        Some(Value::Number(n)) => n.as_i64(),
        Some(_) => return Err(FrameError::InvalidField("v")),
    };

    let method = match take_string(&mut obj, "method")? {
        s if s.is_empty() => None,
        s => Some(s),
    };

    let params = match (obj.remove("params"), obj.remove("args")) {
        (Some(params), _) => Some(params),
        (None, args) => args,
    };

    let error = match obj.remove("error") {
        None | Some(Value::Null) => None,
        Some(Value::Object(err)) => Some(ErrorBody {
            code: err.get("code").and_then(Value::as_i64).unwrap_or(0),
            message: err
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        }),
        Some(_) => return Err(FrameError::InvalidField("error")),
    };

    let frame = Frame {
        version,
        id,
        src: take_string(&mut obj, "src")?,
        dst: take_string(&mut obj, "dst")?,
        tag: take_string(&mut obj, "tag")?,
        key: take_string(&mut obj, "key")?,
        method,
        params,
        result: obj.remove("result"),
        error,
        auth: obj.remove("auth"),
    };
    trace!(?frame, "parsed frame");
    Ok(frame)
}

fn take_string(obj: &mut Map<String, Value>, field: &'static str) -> Result<String> {
    match obj.remove(field) {
        None | Some(Value::Null) => Ok(String::new()),
        Some(Value::String(s)) => Ok(s),
        Some(_) => Err(FrameError::InvalidField(field)),
    }
}

#[derive(Debug, Clone)]
enum Payload {
    Call {
        method: String,
        params: Option<Value>,
    },
    Result(Value),
    Error(ErrorBody),
}

/// Builds wire bytes for one frame.
///
/// Members are written in the order `id, src, dst, tag, key` followed by the
/// payload. Empty `dst`/`tag`/`key` are omitted; `src` is always written.
#[derive(Debug, Clone)]
pub struct FrameBuilder {
    id: Option<FrameId>,
    src: String,
    dst: String,
    tag: String,
    key: String,
    payload: Payload,
}

impl FrameBuilder {
    fn with_payload(payload: Payload) -> Self {
        Self {
            id: None,
            src: String::new(),
            dst: String::new(),
            tag: String::new(),
            key: String::new(),
            payload,
        }
    }

    /// A call of `method`. Without an id this is a notification.
    pub fn call(method: impl Into<String>) -> Self {
        Self::with_payload(Payload::Call {
            method: method.into(),
            params: None,
        })
    }

    /// A successful response.
    pub fn result(result: Value) -> Self {
        Self::with_payload(Payload::Result(result))
    }

    /// A failed response. An empty message is omitted.
    pub fn error(code: i64, message: impl Into<String>) -> Self {
        Self::with_payload(Payload::Error(ErrorBody::new(code, message)))
    }

    pub fn id(mut self, id: impl Into<FrameId>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn src(mut self, src: impl Into<String>) -> Self {
        self.src = src.into();
        self
    }

    pub fn dst(mut self, dst: impl Into<String>) -> Self {
        self.dst = dst.into();
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    /// Call arguments. Ignored for responses.
    pub fn params(mut self, value: Value) -> Self {
        if let Payload::Call { params, .. } = &mut self.payload {
            *params = Some(value);
        }
        self
    }

    /// Serialize to wire bytes.
    pub fn build(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(128);
        out.push(b'{');
        if let Some(id) = self.id.as_ref().filter(|id| !id.as_str().is_empty()) {
            push_member(&mut out, "id", &id.to_json());
            out.push(b',');
        }
        push_member(&mut out, "src", &Value::String(self.src.clone()));
        for (name, text) in [("dst", &self.dst), ("tag", &self.tag), ("key", &self.key)] {
            if !text.is_empty() {
                out.push(b',');
                push_member(&mut out, name, &Value::String(text.clone()));
            }
        }
        out.push(b',');
        match &self.payload {
            Payload::Call { method, params } => {
                push_member(&mut out, "method", &Value::String(method.clone()));
                if let Some(params) = params {
                    out.push(b',');
                    push_member(&mut out, "params", params);
                }
            }
            Payload::Result(result) => push_member(&mut out, "result", result),
            Payload::Error(err) => {
                let mut body = Map::new();
                body.insert("code".to_string(), Value::from(err.code));
                if !err.message.is_empty() {
                    body.insert("message".to_string(), Value::String(err.message.clone()));
                }
                push_member(&mut out, "error", &Value::Object(body));
            }
        }
        out.push(b'}');
        out
    }
}

fn push_member(out: &mut Vec<u8>, name: &str, value: &Value) {
    out.push(b'"');
    out.extend_from_slice(name.as_bytes());
    out.extend_from_slice(b"\":");
    // Serializing a `Value` into a Vec cannot fail.
    let _ = serde_json::to_writer(&mut *out, value);
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_request_fields() {
        let frame = parse(
            br#"{"v":2,"id":1,"src":"client","dst":"device","tag":"t","method":"Math.Add","params":{"a":2,"b":3},"extra":true}"#,
        )
        .unwrap();

        assert_eq!(frame.version, Some(2));
        assert_eq!(frame.id, Some(FrameId::from(1)));
        assert_eq!(frame.src, "client");
        assert_eq!(frame.dst, "device");
        assert_eq!(frame.tag, "t");
        assert_eq!(frame.method.as_deref(), Some("Math.Add"));
        assert_eq!(frame.params, Some(json!({"a": 2, "b": 3})));
        assert_eq!(frame.kind(), FrameKind::Request);
    }

    #[test]
    fn missing_fields_decode_to_empty() {
        let frame = parse(br#"{"method":"Sys.Reboot"}"#).unwrap();
        assert!(frame.id.is_none());
        assert!(frame.src.is_empty());
        assert!(frame.dst.is_empty());
        assert!(frame.params.is_none());
        assert_eq!(frame.kind(), FrameKind::Notification);
    }

    #[test]
    fn args_is_an_alias_for_params() {
        let frame = parse(br#"{"id":3,"method":"X","args":[1,2]}"#).unwrap();
        assert_eq!(frame.params, Some(json!([1, 2])));

        let frame = parse(br#"{"id":3,"method":"X","args":[1],"params":[2]}"#).unwrap();
        assert_eq!(frame.params, Some(json!([2])));
    }

    #[test]
    fn string_result_keeps_its_quoting() {
        let frame = parse(br#"{"id":"abc","result":"ok"}"#).unwrap();
        assert_eq!(frame.result, Some(Value::String("ok".into())));
        assert_eq!(frame.kind(), FrameKind::Response);

        let bytes = frame.to_bytes();
        assert_eq!(bytes, br#"{"id":"abc","src":"","result":"ok"}"#.to_vec());
    }

    #[test]
    fn error_response_is_decoded() {
        let frame = parse(br#"{"id":7,"error":{"code":404,"message":"nope"}}"#).unwrap();
        assert_eq!(frame.error, Some(ErrorBody::new(404, "nope")));
        assert_eq!(frame.kind(), FrameKind::Response);
    }

    #[test]
    fn rejects_non_scalar_id() {
        let err = parse(br#"{"id":{"x":1},"method":"A"}"#).unwrap_err();
        assert!(matches!(err, FrameError::InvalidId));

        let err = parse(br#"{"id":true,"method":"A"}"#).unwrap_err();
        assert!(matches!(err, FrameError::InvalidId));
    }

    #[test]
    fn rejects_non_object_and_garbage() {
        assert!(matches!(parse(b"[1,2]"), Err(FrameError::NotAnObject)));
        assert!(matches!(parse(b"{not json"), Err(FrameError::Json(_))));
        assert!(matches!(
            parse(br#"{"method":5}"#),
            Err(FrameError::InvalidField("method"))
        ));
    }

    #[test]
    fn builder_writes_members_in_order() {
        let bytes = FrameBuilder::call("Math.Add")
            .id(1u64)
            .src("client")
            .dst("device")
            .tag("t")
            .key("k")
            .params(json!({"a": 2}))
            .build();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"{"id":1,"src":"client","dst":"device","tag":"t","key":"k","method":"Math.Add","params":{"a":2}}"#
        );
    }

    #[test]
    fn builder_quotes_non_numeric_and_oversized_ids() {
        let bytes = FrameBuilder::result(json!(5)).id("a1").src("d").build();
        assert_eq!(bytes, br#"{"id":"a1","src":"d","result":5}"#.to_vec());

        let bytes = FrameBuilder::result(json!(5))
            .id("99999999999999999999999")
            .src("d")
            .build();
        assert_eq!(
            bytes,
            br#"{"id":"99999999999999999999999","src":"d","result":5}"#.to_vec()
        );
    }

    #[test]
    fn zero_padded_id_stays_a_string() {
        let bytes = FrameBuilder::result(json!(5)).id("007").src("d").build();
        assert_eq!(bytes, br#"{"id":"007","src":"d","result":5}"#.to_vec());
        assert_eq!(parse(&bytes).unwrap().id, Some(FrameId::new("007")));

        let bytes = FrameBuilder::result(json!(5)).id("0").src("d").build();
        assert_eq!(bytes, br#"{"id":0,"src":"d","result":5}"#.to_vec());
    }

    #[test]
    fn builder_omits_empty_error_message() {
        let bytes = FrameBuilder::error(500, "").id(2u64).src("d").build();
        assert_eq!(bytes, br#"{"id":2,"src":"d","error":{"code":500}}"#.to_vec());
    }

    #[test]
    fn debug_redacts_auth() {
        let frame = parse(br#"{"method":"A","auth":{"username":"root","response":"secret"}}"#)
            .unwrap();
        let rendered = format!("{frame:?}");
        assert!(rendered.contains("<redacted:"));
        assert!(!rendered.contains("secret"));
    }

    fn arb_text() -> impl Strategy<Value = String> {
        "[a-zA-Z0-9_.:/ -]{0,12}"
    }

    fn arb_value() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::from),
            any::<i64>().prop_map(Value::from),
            arb_text().prop_map(Value::from),
            prop::collection::vec(any::<i32>(), 0..4).prop_map(|v| json!(v)),
            (arb_text(), any::<i32>()).prop_map(|(k, v)| {
                let mut obj = Map::new();
                obj.insert(k, Value::from(v));
                Value::Object(obj)
            }),
        ]
    }

    fn arb_id() -> impl Strategy<Value = Option<FrameId>> {
        prop_oneof![
            Just(None),
            any::<u64>().prop_map(|n| Some(FrameId::from(n))),
            "[a-z][a-z0-9-]{0,8}".prop_map(|s| Some(FrameId::new(s))),
            "0[0-9]{1,6}".prop_map(|s| Some(FrameId::new(s))),
        ]
    }

    proptest! {
        #[test]
        fn call_survives_build_then_parse(
            id in arb_id(),
            src in arb_text(),
            dst in arb_text(),
            tag in arb_text(),
            method in "[A-Z][a-zA-Z]{0,6}\\.[A-Z][a-zA-Z]{0,6}",
            params in proptest::option::of(arb_value()),
        ) {
            let mut builder = FrameBuilder::call(method.clone()).src(src.clone()).dst(dst.clone()).tag(tag.clone());
            if let Some(id) = id.clone() {
                builder = builder.id(id);
            }
            if let Some(params) = params.clone() {
                builder = builder.params(params);
            }

            let frame = parse(&builder.build()).unwrap();
            prop_assert_eq!(frame.id, id);
            prop_assert_eq!(frame.src, src);
            prop_assert_eq!(frame.dst, dst);
            prop_assert_eq!(frame.tag, tag);
            prop_assert_eq!(frame.method, Some(method));
            prop_assert_eq!(frame.params, params);
        }

        #[test]
        fn response_survives_build_then_parse(id in any::<u64>(), result in arb_value()) {
            let bytes = FrameBuilder::result(result.clone()).id(id).src("device").build();
            let frame = parse(&bytes).unwrap();
            prop_assert_eq!(frame.id, Some(FrameId::from(id)));
            prop_assert_eq!(frame.result, Some(result));
            prop_assert!(frame.error.is_none());
        }
    }
}
