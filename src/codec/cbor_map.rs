//! Canonical CBOR map codec.
//!
//! Requests are encoded as a definite-length map with exactly five entries
//! in a fixed order:
//!
//! ```text
//! { "op": text, "target": { "kind": text, ...extra }, "args": any|null,
//!   "data": any|null, "proto": int }
//! ```
//!
//! Responses and events are decoded leniently: keys may arrive in any
//! order and unknown keys are skipped whole. A map with `ok` is a response
//! (even if `evt` is also present); otherwise a map with `evt` is an event.

use ciborium::Value as Cbor;
use serde_json::{json, Value as Json};

use super::value::{cbor_to_json, json_to_cbor, optional_json_to_cbor};
use super::{DecodeError, Decoded, FrameCodec};
use crate::error::{Result, RipcError};
use crate::message::{Evt, Req, Rsp};

/// CBOR map codec for requests, responses and events.
#[derive(Debug, Clone, Copy, Default)]
pub struct CborMapCodec;

impl CborMapCodec {
    /// Create the codec.
    pub fn new() -> Self {
        Self
    }

    /// Build the request map without serializing it.
    pub fn request_value(req: &Req) -> Cbor {
        let mut target = Vec::with_capacity(1 + req.target.extra.len());
        target.push(text_entry("kind", Cbor::Text(req.target.kind.clone())));
        for (key, value) in &req.target.extra {
            // The discriminator is fixed; an extra `kind` would duplicate the key.
            if key == "kind" {
                continue;
            }
            target.push((Cbor::Text(key.clone()), json_to_cbor(value)));
        }

        Cbor::Map(vec![
            text_entry("op", Cbor::Text(req.op.clone())),
            text_entry("target", Cbor::Map(target)),
            text_entry("args", optional_json_to_cbor(req.args.as_ref())),
            text_entry("data", optional_json_to_cbor(req.data.as_ref())),
            text_entry("proto", Cbor::Integer(req.proto.into())),
        ])
    }
}

fn text_entry(key: &str, value: Cbor) -> (Cbor, Cbor) {
    (Cbor::Text(key.to_string()), value)
}

impl FrameCodec for CborMapCodec {
    fn name(&self) -> &'static str {
        "cbor-map"
    }

    fn encode_request(&self, req: &Req) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(64);
        ciborium::ser::into_writer(&Self::request_value(req), &mut buf).map_err(|e| {
            tracing::warn!(
                op = %req.op,
                target = %req.target.kind,
                error = %e,
                "request encode failed"
            );
            RipcError::CborEncode(e.to_string())
        })?;
        tracing::trace!(op = %req.op, proto = req.proto, len = buf.len(), "encoded request");
        Ok(buf)
    }

    fn decode(&self, payload: &[u8]) -> std::result::Result<Decoded, DecodeError> {
        let root: Cbor =
            ciborium::de::from_reader(payload).map_err(|e| DecodeError::Cbor(e.to_string()))?;
        let Cbor::Map(entries) = root else {
            return Err(DecodeError::NotAMap);
        };

        let mut fields = Fields::default();
        for (key, value) in entries {
            let Cbor::Text(key) = key else {
                return Err(DecodeError::NonTextKey);
            };
            fields.absorb(&key, value)?;
        }
        fields.finish()
    }
}

/// Recognized top-level fields, collected in whatever order they arrive.
#[derive(Default)]
struct Fields {
    ok: Option<bool>,
    action: Option<String>,
    result: Option<Json>,
    err: Option<String>,
    evt: Option<String>,
    topic: Option<String>,
    event_type: Option<String>,
    display: Option<Json>,
}

impl Fields {
    fn absorb(&mut self, key: &str, value: Cbor) -> std::result::Result<(), DecodeError> {
        match key {
            "ok" => {
                self.ok = Some(value.as_bool().ok_or(DecodeError::WrongType {
                    key: "ok",
                    expected: "bool",
                })?)
            }
            "action" => self.action = optional_text("action", value)?,
            "result" => self.result = non_null(cbor_to_json(value)?),
            "err" => self.err = node_to_string(value)?,
            "evt" => {
                self.evt = Some(optional_text("evt", value)?.ok_or(DecodeError::WrongType {
                    key: "evt",
                    expected: "text string",
                })?)
            }
            "topic" => self.topic = optional_text("topic", value)?,
            "type" => self.event_type = optional_text("type", value)?,
            "display" => self.display = non_null(cbor_to_json(value)?),
            // Unknown keys are skipped; the value was already consumed whole.
            _ => {}
        }
        Ok(())
    }

    fn finish(self) -> std::result::Result<Decoded, DecodeError> {
        if let Some(ok) = self.ok {
            return Ok(Decoded::Response(Rsp {
                ok,
                action: self.action,
                data: self.result,
                err: self.err,
            }));
        }
        if let Some(kind) = self.evt {
            return Ok(Decoded::Event(Evt {
                kind,
                data: Some(json!({
                    "topic": self.topic,
                    "type": self.event_type,
                    "display": self.display,
                })),
            }));
        }
        Err(DecodeError::Unrecognized)
    }
}

fn optional_text(
    key: &'static str,
    value: Cbor,
) -> std::result::Result<Option<String>, DecodeError> {
    match value {
        Cbor::Text(s) => Ok(Some(s)),
        Cbor::Null => Ok(None),
        _ => Err(DecodeError::WrongType {
            key,
            expected: "text string",
        }),
    }
}

fn node_to_string(value: Cbor) -> std::result::Result<Option<String>, DecodeError> {
    Ok(match cbor_to_json(value)? {
        Json::Null => None,
        Json::String(s) => Some(s),
        other => Some(other.to_string()),
    })
}

fn non_null(value: Json) -> Option<Json> {
    (!value.is_null()).then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Target;
    use serde_json::json;

    fn encode(value: &Cbor) -> Vec<u8> {
        let mut buf = Vec::new();
        ciborium::ser::into_writer(value, &mut buf).unwrap();
        buf
    }

    fn map(entries: Vec<(&str, Cbor)>) -> Cbor {
        Cbor::Map(
            entries
                .into_iter()
                .map(|(k, v)| (Cbor::Text(k.to_string()), v))
                .collect(),
        )
    }

    fn keys(value: &Cbor) -> Vec<String> {
        value
            .as_map()
            .unwrap()
            .iter()
            .map(|(k, _)| k.as_text().unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_request_has_five_keys_in_fixed_order() {
        let bytes = CborMapCodec::new()
            .encode_request(&Req::hello("agent"))
            .unwrap();
        let decoded: Cbor = ciborium::de::from_reader(bytes.as_slice()).unwrap();

        assert_eq!(keys(&decoded), ["op", "target", "args", "data", "proto"]);
        // 0xA5 = definite-length map with five entries
        assert_eq!(bytes[0], 0xA5);
    }

    #[test]
    fn test_request_roundtrip_logical_structure() {
        let req = Req::new(
            "create",
            Target::new("writer").with("topic", "Chatter").with("domain", 3),
        )
        .args(json!({ "qos": "Lib::A", "depth": [1, 2, { "x": -4.5 }] }))
        .data(json!("payload"))
        .proto(2);

        let bytes = CborMapCodec::new().encode_request(&req).unwrap();
        let decoded: Cbor = ciborium::de::from_reader(bytes.as_slice()).unwrap();
        let json = cbor_to_json(decoded).unwrap();

        assert_eq!(
            json,
            json!({
                "op": "create",
                "target": { "kind": "writer", "topic": "Chatter", "domain": 3 },
                "args": { "qos": "Lib::A", "depth": [1, 2, { "x": -4.5 }] },
                "data": "payload",
                "proto": 2
            })
        );
    }

    #[test]
    fn test_target_kind_first_then_extras() {
        let req = Req::new("get", Target::new("qos").with("b", 1).with("a", 2));
        let value = CborMapCodec::request_value(&req);
        let target = &value.as_map().unwrap()[1].1;
        assert_eq!(keys(target), ["kind", "a", "b"]);
    }

    #[test]
    fn test_extra_kind_does_not_duplicate() {
        let req = Req::new("get", Target::new("qos").with("kind", "other"));
        let value = CborMapCodec::request_value(&req);
        let target = &value.as_map().unwrap()[1].1;
        assert_eq!(keys(target), ["kind"]);
    }

    #[test]
    fn test_null_args_and_data() {
        let value = CborMapCodec::request_value(&Req::hello("agent"));
        let entries = value.as_map().unwrap();
        assert_eq!(entries[2].1, Cbor::Null);
        assert_eq!(entries[3].1, Cbor::Null);
        assert_eq!(entries[4].1, Cbor::Integer(1.into()));
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let req = Req::new("write", "writer").data(json!({ "z": 1, "a": [true], "m": null }));
        let codec = CborMapCodec::new();
        assert_eq!(
            codec.encode_request(&req).unwrap(),
            codec.encode_request(&req).unwrap()
        );
    }

    #[test]
    fn test_decode_response() {
        let payload = encode(&map(vec![
            ("ok", Cbor::Bool(true)),
            ("action", Cbor::Text("hello".into())),
            ("result", map(vec![("version", Cbor::Text("1.2".into()))])),
        ]));
        let rsp = CborMapCodec::new()
            .try_decode(&payload)
            .unwrap()
            .into_response()
            .unwrap();

        assert!(rsp.ok);
        assert_eq!(rsp.action.as_deref(), Some("hello"));
        assert_eq!(rsp.data, Some(json!({ "version": "1.2" })));
        assert_eq!(rsp.err, None);
    }

    #[test]
    fn test_decode_response_any_key_order_with_unknowns() {
        let payload = encode(&map(vec![
            ("future", map(vec![("nested", Cbor::Array(vec![Cbor::Null, Cbor::Bool(false)]))])),
            ("err", Cbor::Text("denied".into())),
            ("evt", Cbor::Text("ignored".into())),
            ("ok", Cbor::Bool(false)),
            ("extra", Cbor::Bytes(vec![1, 2, 3])),
        ]));
        let decoded = CborMapCodec::new().try_decode(&payload).unwrap();

        let Decoded::Response(rsp) = decoded else {
            panic!("ok must win over evt");
        };
        assert!(!rsp.ok);
        assert_eq!(rsp.err.as_deref(), Some("denied"));
    }

    #[test]
    fn test_decode_err_non_text_is_stringified() {
        let payload = encode(&map(vec![
            ("ok", Cbor::Bool(false)),
            ("err", map(vec![("code", Cbor::Integer(7.into()))])),
        ]));
        let rsp = CborMapCodec::new()
            .try_decode(&payload)
            .unwrap()
            .into_response()
            .unwrap();
        assert_eq!(rsp.err.as_deref(), Some(r#"{"code":7}"#));
    }

    #[test]
    fn test_decode_event() {
        let payload = encode(&map(vec![
            ("display", map(vec![("value", Cbor::Integer(5.into()))])),
            ("type", Cbor::Text("Y".into())),
            ("evt", Cbor::Text("data".into())),
            ("topic", Cbor::Text("X".into())),
        ]));
        let evt = CborMapCodec::new()
            .try_decode(&payload)
            .unwrap()
            .into_event()
            .unwrap();

        assert_eq!(evt.kind, "data");
        assert_eq!(
            evt.data,
            Some(json!({ "topic": "X", "type": "Y", "display": { "value": 5 } }))
        );
        assert_eq!(evt.topic(), Some("X"));
    }

    #[test]
    fn test_decode_event_missing_fields_are_null() {
        let payload = encode(&map(vec![("evt", Cbor::Text("heartbeat".into()))]));
        let evt = CborMapCodec::new()
            .try_decode(&payload)
            .unwrap()
            .into_event()
            .unwrap();
        assert_eq!(
            evt.data,
            Some(json!({ "topic": null, "type": null, "display": null }))
        );
    }

    #[test]
    fn test_decode_neither_ok_nor_evt_fails() {
        let payload = encode(&map(vec![("action", Cbor::Text("x".into()))]));
        let codec = CborMapCodec::new();
        assert!(matches!(codec.decode(&payload), Err(DecodeError::Unrecognized)));
        assert!(codec.try_decode(&payload).is_none());
    }

    #[test]
    fn test_decode_malformed_input_fails_quietly() {
        let codec = CborMapCodec::new();
        assert!(codec.try_decode(b"").is_none());
        assert!(codec.try_decode(&[0xFF, 0x00, 0x13]).is_none());
        // Map header promising entries that never come.
        assert!(codec.try_decode(&[0xA3, 0x62, b'o', b'k']).is_none());
        // Not a map at all.
        assert!(matches!(
            codec.decode(&encode(&Cbor::Array(vec![]))),
            Err(DecodeError::NotAMap)
        ));
    }

    #[test]
    fn test_decode_wrong_ok_type_fails() {
        let payload = encode(&map(vec![("ok", Cbor::Text("yes".into()))]));
        assert!(matches!(
            CborMapCodec::new().decode(&payload),
            Err(DecodeError::WrongType { key: "ok", .. })
        ));
    }

    #[test]
    fn test_decode_indefinite_length_map() {
        // {_ "ok": true, "action": "x" } using indefinite-length encoding
        let payload = [
            0xBF, 0x62, b'o', b'k', 0xF5, 0x66, b'a', b'c', b't', b'i', b'o', b'n', 0x61, b'x',
            0xFF,
        ];
        let rsp = CborMapCodec::new()
            .try_decode(&payload)
            .unwrap()
            .into_response()
            .unwrap();
        assert!(rsp.ok);
        assert_eq!(rsp.action.as_deref(), Some("x"));
    }
}
