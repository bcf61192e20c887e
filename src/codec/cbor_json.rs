//! Legacy codec: a JSON document carried inside one CBOR byte string.
//!
//! Older agents speak this encoding. Request JSON is
//! `{op, target, args, data, proto}` where `target` is the bare kind string,
//! or `{kind, ...extra}` when extras are present. Replies are recognized by
//! `ok` (response, fields `action`/`data`/`err`) or `kind` (event, field `data`).

use ciborium::Value as Cbor;
use serde_json::{json, Map, Value as Json};

use super::{DecodeError, Decoded, FrameCodec};
use crate::error::{Result, RipcError};
use crate::message::{Evt, Req, Rsp};

/// JSON-in-CBOR codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct CborJsonCodec;

impl CborJsonCodec {
    /// Create the codec.
    pub fn new() -> Self {
        Self
    }

    /// The JSON document sent for `req`.
    pub fn request_json(req: &Req) -> Json {
        let target = if req.target.is_structured() {
            let mut obj = Map::with_capacity(1 + req.target.extra.len());
            obj.insert("kind".to_string(), Json::String(req.target.kind.clone()));
            for (key, value) in &req.target.extra {
                obj.entry(key.clone()).or_insert_with(|| value.clone());
            }
            Json::Object(obj)
        } else {
            Json::String(req.target.kind.clone())
        };

        json!({
            "op": req.op,
            "target": target,
            "args": req.args,
            "data": req.data,
            "proto": req.proto,
        })
    }
}

impl FrameCodec for CborJsonCodec {
    fn name(&self) -> &'static str {
        "cbor-json"
    }

    fn encode_request(&self, req: &Req) -> Result<Vec<u8>> {
        let document = serde_json::to_vec(&Self::request_json(req))?;
        let mut buf = Vec::with_capacity(document.len() + 5);
        ciborium::ser::into_writer(&Cbor::Bytes(document), &mut buf)
            .map_err(|e| RipcError::CborEncode(e.to_string()))?;
        tracing::trace!(op = %req.op, len = buf.len(), "encoded legacy request");
        Ok(buf)
    }

    fn decode(&self, payload: &[u8]) -> std::result::Result<Decoded, DecodeError> {
        let root: Cbor =
            ciborium::de::from_reader(payload).map_err(|e| DecodeError::Cbor(e.to_string()))?;
        let Cbor::Bytes(document) = root else {
            return Err(DecodeError::NotAByteString);
        };
        let Json::Object(mut obj) = serde_json::from_slice::<Json>(&document)? else {
            return Err(DecodeError::NotAMap);
        };

        let data = obj.remove("data").filter(|v| !v.is_null());

        if let Some(ok) = obj.remove("ok") {
            let ok = ok.as_bool().ok_or(DecodeError::WrongType {
                key: "ok",
                expected: "bool",
            })?;
            return Ok(Decoded::Response(Rsp {
                ok,
                action: optional_string("action", obj.remove("action"))?,
                data,
                err: optional_string("err", obj.remove("err"))?,
            }));
        }

        if let Some(kind) = obj.remove("kind") {
            let kind =
                optional_string("kind", Some(kind))?.unwrap_or_else(|| "unknown".to_string());
            return Ok(Decoded::Event(Evt { kind, data }));
        }

        Err(DecodeError::Unrecognized)
    }
}

fn optional_string(
    key: &'static str,
    value: Option<Json>,
) -> std::result::Result<Option<String>, DecodeError> {
    match value {
        None | Some(Json::Null) => Ok(None),
        Some(Json::String(s)) => Ok(Some(s)),
        Some(_) => Err(DecodeError::WrongType {
            key,
            expected: "string",
        }),
    }
}
