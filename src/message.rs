//! Logical request, response and event values.
//!
//! These are what callers build and receive; the codec turns them into and
//! out of frame payloads. Structured fields use [`serde_json::Value`].

use serde_json::{Map, Value};

use crate::error::{Result, RipcError};

/// Default protocol generation carried in every request.
pub const DEFAULT_PROTO: i32 = 1;

/// Well-known operation names understood by the agent.
pub mod ops {
    pub const HELLO: &str = "hello";
    pub const CREATE: &str = "create";
    pub const GET: &str = "get";
    pub const WRITE: &str = "write";
    pub const CLEAR: &str = "clear";
}

/// Resource a request addresses.
///
/// Always carries a `kind`; structured targets add extra key/value pairs
/// that are merged next to it on the wire.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Target {
    /// Discriminator, e.g. `"agent"` or `"qos"`.
    pub kind: String,
    /// Additional fields. Empty for a plain named target.
    pub extra: Map<String, Value>,
}

impl Target {
    /// A plain named target.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            extra: Map::new(),
        }
    }

    /// Add an extra field.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Whether the target carries anything besides its kind.
    pub fn is_structured(&self) -> bool {
        !self.extra.is_empty()
    }
}

impl From<&str> for Target {
    fn from(kind: &str) -> Self {
        Target::new(kind)
    }
}

impl From<String> for Target {
    fn from(kind: String) -> Self {
        Target::new(kind)
    }
}

/// A request to the agent. Built per call and consumed once by encoding.
///
/// # Example
///
/// ```
/// use ripc_client::{Req, Target};
/// use serde_json::json;
///
/// let req = Req::new("create", Target::new("writer").with("topic", "Chatter"))
///     .args(json!({ "qos": "Lib::Default" }))
///     .data(json!({ "text": "hi" }));
/// assert_eq!(req.op, "create");
/// assert_eq!(req.proto, 1);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Req {
    pub op: String,
    pub target: Target,
    pub args: Option<Value>,
    pub data: Option<Value>,
    pub proto: i32,
}

impl Req {
    /// Create a request with no args or data.
    pub fn new(op: impl Into<String>, target: impl Into<Target>) -> Self {
        Self {
            op: op.into(),
            target: target.into(),
            args: None,
            data: None,
            proto: DEFAULT_PROTO,
        }
    }

    /// The `hello` handshake request.
    pub fn hello(target: impl Into<Target>) -> Self {
        Self::new(ops::HELLO, target)
    }

    /// Set the `args` field.
    pub fn args(mut self, args: Value) -> Self {
        self.args = Some(args);
        self
    }

    /// Set the `data` field.
    pub fn data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Set the protocol generation.
    pub fn proto(mut self, proto: i32) -> Self {
        self.proto = proto;
        self
    }
}

/// A response from the agent.
///
/// `ok = false` means `err` should be consulted.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Rsp {
    pub ok: bool,
    pub action: Option<String>,
    pub data: Option<Value>,
    pub err: Option<String>,
}

impl Rsp {
    /// Turn an `ok = false` response into [`RipcError::Rejected`].
    pub fn into_result(self) -> Result<Option<Value>> {
        if self.ok {
            Ok(self.data)
        } else {
            Err(RipcError::Rejected {
                action: self.action,
                err: self.err,
            })
        }
    }
}

/// An unsolicited notification from the agent.
#[derive(Debug, Clone, PartialEq)]
pub struct Evt {
    pub kind: String,
    pub data: Option<Value>,
}

impl Evt {
    fn field(&self, name: &str) -> Option<&Value> {
        self.data.as_ref()?.get(name).filter(|v| !v.is_null())
    }

    /// Topic the event concerns, when present.
    pub fn topic(&self) -> Option<&str> {
        self.field("topic")?.as_str()
    }

    /// Type name of the sample, when present.
    pub fn event_type(&self) -> Option<&str> {
        self.field("type")?.as_str()
    }

    /// Display payload, when present.
    pub fn display(&self) -> Option<&Value> {
        self.field("display")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_req_defaults() {
        let req = Req::hello("agent");
        assert_eq!(req.op, "hello");
        assert_eq!(req.target, Target::new("agent"));
        assert!(req.args.is_none());
        assert!(req.data.is_none());
        assert_eq!(req.proto, DEFAULT_PROTO);
    }

    #[test]
    fn test_structured_target() {
        let target = Target::new("qos").with("profile", "Lib::A").with("domain", 0);
        assert!(target.is_structured());
        assert_eq!(target.extra["profile"], json!("Lib::A"));
        assert!(!Target::from("agent").is_structured());
    }

    #[test]
    fn test_rsp_into_result() {
        let ok = Rsp {
            ok: true,
            data: Some(json!({ "id": 3 })),
            ..Default::default()
        };
        assert_eq!(ok.into_result().unwrap(), Some(json!({ "id": 3 })));

        let failed = Rsp {
            ok: false,
            action: Some("create".into()),
            err: Some("exists".into()),
            ..Default::default()
        };
        match failed.into_result() {
            Err(RipcError::Rejected { action, err }) => {
                assert_eq!(action.as_deref(), Some("create"));
                assert_eq!(err.as_deref(), Some("exists"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_evt_accessors() {
        let evt = Evt {
            kind: "data".into(),
            data: Some(json!({ "topic": "X", "type": null, "display": { "v": 1 } })),
        };
        assert_eq!(evt.topic(), Some("X"));
        assert_eq!(evt.event_type(), None);
        assert_eq!(evt.display(), Some(&json!({ "v": 1 })));

        let bare = Evt {
            kind: "ping".into(),
            data: None,
        };
        assert_eq!(bare.topic(), None);
    }
}
