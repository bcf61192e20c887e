//! Codec module - payload serialization for frames.
//!
//! This module turns logical requests into frame payloads and incoming
//! payloads back into responses or events:
//!
//! - [`CborMapCodec`] - canonical CBOR map, the current wire encoding
//! - [`CborJsonCodec`] - JSON document wrapped in a CBOR byte string (legacy peers)
//!
//! # Design
//!
//! Codecs sit behind the [`FrameCodec`] trait so the client can be built
//! with either one. Encoding is fallible and reports errors; decoding never
//! fails loudly: [`FrameCodec::try_decode`] returns `None` and logs a bounded
//! hex preview of the offending bytes.
//!
//! # Example
//!
//! ```
//! use ripc_client::codec::{CborMapCodec, Decoded, FrameCodec};
//! use ripc_client::Req;
//!
//! let codec = CborMapCodec::new();
//! let payload = codec.encode_request(&Req::hello("agent")).unwrap();
//! assert!(!payload.is_empty());
//!
//! // A request payload carries neither `ok` nor `evt`.
//! assert!(codec.try_decode(&payload).is_none());
//! ```

mod cbor_json;
mod cbor_map;
pub mod value;

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::Result;
use crate::message::{Evt, Req, Rsp};

pub use cbor_json::CborJsonCodec;
pub use cbor_map::CborMapCodec;

/// Maximum number of payload bytes shown in a decode-failure log line.
pub const PREVIEW_BYTES: usize = 128;

/// Result of a successful decode.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Response(Rsp),
    Event(Evt),
}

impl Decoded {
    /// The response, if this is one.
    pub fn into_response(self) -> Option<Rsp> {
        match self {
            Decoded::Response(rsp) => Some(rsp),
            Decoded::Event(_) => None,
        }
    }

    /// The event, if this is one.
    pub fn into_event(self) -> Option<Evt> {
        match self {
            Decoded::Event(evt) => Some(evt),
            Decoded::Response(_) => None,
        }
    }
}

/// Why a payload could not be decoded. Only ever logged.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed CBOR: {0}")]
    Cbor(String),

    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("top-level item is not a map")]
    NotAMap,

    #[error("top-level item is not a byte string")]
    NotAByteString,

    #[error("map key is not a text string")]
    NonTextKey,

    #[error("field `{key}` is not a {expected}")]
    WrongType {
        key: &'static str,
        expected: &'static str,
    },

    #[error("payload is neither a response nor an event")]
    Unrecognized,
}

/// Payload encoder/decoder used by the client.
pub trait FrameCodec: Send + Sync + 'static {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Encode a request into a frame payload.
    fn encode_request(&self, req: &Req) -> Result<Vec<u8>>;

    /// Decode a payload, reporting the reason on failure.
    fn decode(&self, payload: &[u8]) -> std::result::Result<Decoded, DecodeError>;

    /// Decode a payload into a response or an event.
    ///
    /// Never panics or errors; malformed or unrecognized input yields `None`
    /// and a warning carrying a hex preview of at most [`PREVIEW_BYTES`].
    fn try_decode(&self, payload: &[u8]) -> Option<Decoded> {
        match self.decode(payload) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                tracing::warn!(
                    codec = self.name(),
                    len = payload.len(),
                    preview = %hex_preview(payload, PREVIEW_BYTES),
                    error = %e,
                    "payload decode failed"
                );
                None
            }
        }
    }
}

/// Which codec a client is configured with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CodecKind {
    #[default]
    CborMap,
    CborJson,
}

impl CodecKind {
    /// Instantiate the codec.
    pub fn build(self) -> std::sync::Arc<dyn FrameCodec> {
        match self {
            CodecKind::CborMap => std::sync::Arc::new(CborMapCodec::new()),
            CodecKind::CborJson => std::sync::Arc::new(CborJsonCodec::new()),
        }
    }
}

impl std::str::FromStr for CodecKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "cbor-map" => Ok(CodecKind::CborMap),
            "cbor-json" => Ok(CodecKind::CborJson),
            other => Err(format!("unknown codec '{other}'")),
        }
    }
}

/// Space-separated uppercase hex of the first `max` bytes.
///
/// A suffix notes how many bytes were left out.
pub fn hex_preview(bytes: &[u8], max: usize) -> String {
    let shown = &bytes[..bytes.len().min(max)];
    let mut out = String::with_capacity(shown.len() * 3 + 24);
    for (i, b) in shown.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{b:02X}");
    }
    if bytes.len() > shown.len() {
        let _ = write!(out, " ...(+{} bytes)", bytes.len() - shown.len());
    }
    out
}
