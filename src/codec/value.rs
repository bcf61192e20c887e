//! Conversion between JSON-shaped values and CBOR values.
//!
//! Callers hand in arbitrary [`serde_json::Value`] trees for `args`, `data`
//! and target extras; the map codec needs them as [`ciborium::Value`]. The
//! reverse direction turns decoded `result`/`display` nodes back into JSON.

use ciborium::Value as Cbor;
use serde_json::{Map, Number, Value as Json};

use super::DecodeError;

/// Recursively translate a JSON value into CBOR.
///
/// Numbers that fit a 64-bit integer (signed or unsigned) become CBOR
/// integers, everything else a double. Object entries keep the map's
/// iteration order, which is sorted by key.
pub fn json_to_cbor(value: &Json) -> Cbor {
    match value {
        Json::Null => Cbor::Null,
        Json::Bool(b) => Cbor::Bool(*b),
        Json::Number(n) => number_to_cbor(n),
        Json::String(s) => Cbor::Text(s.clone()),
        Json::Array(items) => Cbor::Array(items.iter().map(json_to_cbor).collect()),
        Json::Object(map) => Cbor::Map(
            map.iter()
                .map(|(k, v)| (Cbor::Text(k.clone()), json_to_cbor(v)))
                .collect(),
        ),
    }
}

/// `Option` flavour used for nullable request fields.
pub fn optional_json_to_cbor(value: Option<&Json>) -> Cbor {
    value.map_or(Cbor::Null, json_to_cbor)
}

fn number_to_cbor(n: &Number) -> Cbor {
    if let Some(i) = n.as_i64() {
        Cbor::Integer(i.into())
    } else if let Some(u) = n.as_u64() {
        Cbor::Integer(u.into())
    } else {
        n.as_f64().map_or(Cbor::Null, Cbor::Float)
    }
}

/// Recursively translate a decoded CBOR value into JSON.
///
/// Tags are unwrapped, byte strings and non-finite floats become `null`.
/// Map keys must be text strings.
pub fn cbor_to_json(value: Cbor) -> Result<Json, DecodeError> {
    Ok(match value {
        Cbor::Null => Json::Null,
        Cbor::Bool(b) => Json::Bool(b),
        Cbor::Integer(i) => integer_to_json(i128::from(i)),
        Cbor::Float(f) => Number::from_f64(f).map_or(Json::Null, Json::Number),
        Cbor::Text(s) => Json::String(s),
        Cbor::Bytes(_) => Json::Null,
        Cbor::Tag(_, inner) => cbor_to_json(*inner)?,
        Cbor::Array(items) => Json::Array(
            items
                .into_iter()
                .map(cbor_to_json)
                .collect::<Result<Vec<_>, _>>()?,
        ),
        Cbor::Map(entries) => {
            let mut map = Map::with_capacity(entries.len());
            for (key, val) in entries {
                let Cbor::Text(key) = key else {
                    return Err(DecodeError::NonTextKey);
                };
                map.insert(key, cbor_to_json(val)?);
            }
            Json::Object(map)
        }
        // ciborium::Value is non-exhaustive.
        _ => Json::Null,
    })
}

fn integer_to_json(n: i128) -> Json {
    if let Ok(i) = i64::try_from(n) {
        Json::from(i)
    } else if let Ok(u) = u64::try_from(n) {
        Json::from(u)
    } else {
        Number::from_f64(n as f64).map_or(Json::Null, Json::Number)
    }
}
