//! Coerced reply values.
//!
//! The wire-level [`Reply`](crate::protocol::Reply) is rewritten into a
//! [`Value`] on the receive path: bulk payloads get best-effort numeric and
//! charset conversion, arrays convert element-wise, and error replies that
//! are nested inside arrays (e.g. inside an EXEC result) stay values rather
//! than failing the whole reply.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::opts::Charset;
use crate::protocol::Reply;

/// A reply after post-parse coercion.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Nil bulk or nil multi-bulk.
    Nil,
    /// Status line such as `OK`.
    Status(String),
    Int(i64),
    Float(f64),
    /// Bulk payload decoded through the connection charset.
    String(String),
    /// Bulk payload that was not decodable (or charset is binary).
    Bytes(Vec<u8>),
    Array(Vec<Value>),
    /// Produced by post-processing callbacks such as the HGETALL pairing.
    Map(HashMap<String, Value>),
    /// Error reply nested inside an array.
    Error { kind: String, message: String },
}

impl Value {
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Status or decoded string content.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Status(s) | Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn into_array(self) -> Option<Vec<Value>> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn into_map(self) -> Option<HashMap<String, Value>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// True for the `OK` status reply.
    pub fn is_ok(&self) -> bool {
        matches!(self, Value::Status(s) if s == "OK")
    }
}

/// Coerce a wire reply into a [`Value`].
///
/// Top-level error replies are rejected by the connection before coercion;
/// this function only sees errors nested inside arrays.
pub fn coerce(reply: Reply, charset: Charset) -> Value {
    match reply {
        Reply::Status(s) => Value::Status(s),
        Reply::Integer(n) => Value::Int(n),
        Reply::Bulk(None) | Reply::Array(None) => Value::Nil,
        Reply::Bulk(Some(data)) => convert_bulk(&data, charset),
        Reply::Array(Some(items)) => {
            Value::Array(items.into_iter().map(|r| coerce(r, charset)).collect())
        }
        Reply::Error { kind, message } => Value::Error { kind, message },
    }
}

/// Numeric coercion is attempted only when the payload plausibly starts a
/// number; `+inf`, `-inf` and `NaN` contain no `.` and fail integer parsing,
/// so they fall through to the string form as required.
fn convert_bulk(data: &[u8], charset: Charset) -> Value {
    if let Some(&first) = data.first()
        && (first.is_ascii_digit() || first == b'+' || first == b'-' || first == b'.')
        && let Ok(text) = simdutf8::basic::from_utf8(data)
    {
        if memchr::memchr(b'.', data).is_none() {
            if let Ok(n) = text.parse::<i64>() {
                return Value::Int(n);
            }
        } else if let Ok(f) = text.parse::<f64>() {
            return Value::Float(f);
        }
    }

    match charset {
        Charset::Utf8 => match simdutf8::basic::from_utf8(data) {
            Ok(text) => Value::String(text.to_string()),
            Err(_) => Value::Bytes(data.to_vec()),
        },
        Charset::Binary => Value::Bytes(data.to_vec()),
    }
}

/// Convert a flat `[field, value, field, value, ..]` array into a map.
///
/// Used as the HGETALL post-processing callback; a trailing odd element is
/// dropped and non-array inputs pass through unchanged.
pub fn pairs_to_map(value: Value) -> Value {
    let Value::Array(items) = value else {
        return value;
    };
    let mut map = HashMap::with_capacity(items.len() / 2);
    let mut iter = items.into_iter();
    while let (Some(field), Some(val)) = (iter.next(), iter.next()) {
        let key = match field {
            Value::Status(s) | Value::String(s) => s,
            Value::Int(n) => n.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Bytes(b) => String::from_utf8_lossy(&b).into_owned(),
            other => format!("{:?}", other),
        };
        map.insert(key, val);
    }
    Value::Map(map)
}

/// Normalize an array of integer flags to 0/1.
///
/// Used as the SCRIPT EXISTS post-processing callback.
pub fn ints_to_bools(value: Value) -> Value {
    let Value::Array(items) = value else {
        return value;
    };
    Value::Array(
        items
            .into_iter()
            .map(|v| match v {
                Value::Int(n) => Value::Int(i64::from(n != 0)),
                other => other,
            })
            .collect(),
    )
}

/// Typed extraction from a [`Value`], for callers that know the reply shape.
pub trait FromValue: Sized {
    fn from_value(value: Value) -> Result<Self>;
}

impl FromValue for Value {
    fn from_value(value: Value) -> Result<Self> {
        Ok(value)
    }
}

impl FromValue for i64 {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Int(n) => Ok(n),
            other => Err(Error::InvalidData(format!("expected integer, got {:?}", other))),
        }
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Status(s) | Value::String(s) => Ok(s),
            Value::Int(n) => Ok(n.to_string()),
            other => Err(Error::InvalidData(format!("expected string, got {:?}", other))),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Nil => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Array(items) => items.into_iter().map(T::from_value).collect(),
            other => Err(Error::InvalidData(format!("expected array, got {:?}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use pretty_assertions::assert_eq;

    fn bulk(data: &'static [u8]) -> Reply {
        Reply::Bulk(Some(Bytes::from_static(data)))
    }

    #[test]
    fn integers_and_floats() {
        assert_eq!(coerce(bulk(b"42"), Charset::Utf8), Value::Int(42));
        assert_eq!(coerce(bulk(b"-7"), Charset::Utf8), Value::Int(-7));
        assert_eq!(coerce(bulk(b"3.25"), Charset::Utf8), Value::Float(3.25));
        assert_eq!(coerce(bulk(b"+1"), Charset::Utf8), Value::Int(1));
    }

    #[test]
    fn inf_and_nan_stay_strings() {
        assert_eq!(
            coerce(bulk(b"+inf"), Charset::Utf8),
            Value::String("+inf".into())
        );
        assert_eq!(
            coerce(bulk(b"-inf"), Charset::Utf8),
            Value::String("-inf".into())
        );
        assert_eq!(
            coerce(bulk(b"NaN"), Charset::Utf8),
            Value::String("NaN".into())
        );
    }

    #[test]
    fn text_decoding() {
        assert_eq!(
            coerce(bulk(b"hello"), Charset::Utf8),
            Value::String("hello".into())
        );
        // invalid UTF-8 falls back to raw bytes
        assert_eq!(
            coerce(bulk(b"\xff\xfe"), Charset::Utf8),
            Value::Bytes(vec![0xff, 0xfe])
        );
        // binary charset never decodes
        assert_eq!(
            coerce(bulk(b"hello"), Charset::Binary),
            Value::Bytes(b"hello".to_vec())
        );
    }

    #[test]
    fn nils() {
        assert_eq!(coerce(Reply::Bulk(None), Charset::Utf8), Value::Nil);
        assert_eq!(coerce(Reply::Array(None), Charset::Utf8), Value::Nil);
    }

    #[test]
    fn arrays_recurse() {
        let reply = Reply::Array(Some(vec![
            bulk(b"1"),
            Reply::Array(Some(vec![bulk(b"x")])),
            Reply::Bulk(None),
        ]));
        assert_eq!(
            coerce(reply, Charset::Utf8),
            Value::Array(vec![
                Value::Int(1),
                Value::Array(vec![Value::String("x".into())]),
                Value::Nil,
            ])
        );
    }

    #[test]
    fn nested_error_stays_value() {
        let reply = Reply::Array(Some(vec![Reply::Error {
            kind: "WRONGTYPE".into(),
            message: "oops".into(),
        }]));
        assert_eq!(
            coerce(reply, Charset::Utf8),
            Value::Array(vec![Value::Error {
                kind: "WRONGTYPE".into(),
                message: "oops".into()
            }])
        );
    }

    #[test]
    fn hash_pairing() {
        let value = Value::Array(vec![
            Value::String("foo".into()),
            Value::String("bar".into()),
            Value::String("n".into()),
            Value::Int(3),
        ]);
        let map = pairs_to_map(value).into_map().unwrap();
        assert_eq!(map.get("foo"), Some(&Value::String("bar".into())));
        assert_eq!(map.get("n"), Some(&Value::Int(3)));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn typed_extraction() {
        let v = Value::Array(vec![Value::Int(1), Value::Nil, Value::Int(2)]);
        let out: Vec<Option<i64>> = FromValue::from_value(v).unwrap();
        assert_eq!(out, vec![Some(1), None, Some(2)]);
    }
}
