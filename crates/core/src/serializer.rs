//! Binary framing for a `Value` as stored in a Data Log record or WAL entry.
//!
//! Layout: `[type: u8][length: u32 LE][payload: length bytes]`. Scalars get a
//! dedicated compact encoding; `Array` and `Object` fall back to `Value`'s own
//! JSON encoding (which already base64-encodes nested `Bytes`, see
//! `crate::value`) since a bespoke binary tree format buys nothing a KV store
//! needs over what `serde_json` already gives for free.

use crate::error::{Error, Result};
use crate::limits::MAX_NESTING_DEPTH;
use crate::value::Value;

const TAG_NULL: u8 = 0;
const TAG_UNDEFINED: u8 = 1;
const TAG_BOOL: u8 = 2;
const TAG_NUMBER: u8 = 3;
const TAG_STRING: u8 = 4;
const TAG_BYTES: u8 = 5;
const TAG_ARRAY: u8 = 6;
const TAG_OBJECT: u8 = 7;

/// Encode a `Value` into its framed binary representation.
pub fn encode(value: &Value) -> Result<Vec<u8>> {
    if value.nesting_depth() > MAX_NESTING_DEPTH {
        return Err(Error::Serialization(format!(
            "value nesting depth exceeds maximum of {MAX_NESTING_DEPTH}"
        )));
    }

    let (tag, payload) = match value {
        Value::Null => (TAG_NULL, Vec::new()),
        Value::Undefined => (TAG_UNDEFINED, Vec::new()),
        Value::Bool(b) => (TAG_BOOL, vec![*b as u8]),
        Value::Number(n) => (TAG_NUMBER, n.to_le_bytes().to_vec()),
        Value::String(s) => (TAG_STRING, s.as_bytes().to_vec()),
        Value::Bytes(b) => (TAG_BYTES, b.clone()),
        Value::Array(_) => (
            TAG_ARRAY,
            serde_json::to_vec(value)
                .map_err(|e| Error::Serialization(format!("encoding array: {e}")))?,
        ),
        Value::Object(_) => (
            TAG_OBJECT,
            serde_json::to_vec(value)
                .map_err(|e| Error::Serialization(format!("encoding object: {e}")))?,
        ),
    };

    let len: u32 = payload
        .len()
        .try_into()
        .map_err(|_| Error::Serialization("payload exceeds 4 GiB".into()))?;

    let mut out = Vec::with_capacity(5 + payload.len());
    out.push(tag);
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Decode a framed `Value` from the start of `bytes`, returning the value and
/// the number of bytes consumed.
pub fn decode(bytes: &[u8]) -> Result<(Value, usize)> {
    if bytes.len() < 5 {
        return Err(Error::Corruption(
            "record too short for type/length header".into(),
        ));
    }
    let tag = bytes[0];
    let len = u32::from_le_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]) as usize;
    let header_len = 5;
    if bytes.len() < header_len + len {
        return Err(Error::Corruption(format!(
            "declared payload length {len} exceeds available {} bytes",
            bytes.len() - header_len
        )));
    }
    let payload = &bytes[header_len..header_len + len];

    let value = match tag {
        TAG_NULL => Value::Null,
        TAG_UNDEFINED => Value::Undefined,
        TAG_BOOL => {
            if payload.len() != 1 {
                return Err(Error::Corruption("bool payload must be 1 byte".into()));
            }
            Value::Bool(payload[0] != 0)
        }
        TAG_NUMBER => {
            if payload.len() != 8 {
                return Err(Error::Corruption("number payload must be 8 bytes".into()));
            }
            let mut buf = [0u8; 8];
            buf.copy_from_slice(payload);
            Value::Number(f64::from_le_bytes(buf))
        }
        TAG_STRING => Value::String(
            std::str::from_utf8(payload)
                .map_err(|e| Error::Corruption(format!("string payload is not UTF-8: {e}")))?
                .to_string(),
        ),
        TAG_BYTES => Value::Bytes(payload.to_vec()),
        TAG_ARRAY => {
            let v: Value = serde_json::from_slice(payload)
                .map_err(|e| Error::Corruption(format!("decoding array: {e}")))?;
            if !matches!(v, Value::Array(_)) {
                return Err(Error::Corruption(
                    "array tag decoded to a non-array value".into(),
                ));
            }
            v
        }
        TAG_OBJECT => {
            let v: Value = serde_json::from_slice(payload)
                .map_err(|e| Error::Corruption(format!("decoding object: {e}")))?;
            if !matches!(v, Value::Object(_)) {
                return Err(Error::Corruption(
                    "object tag decoded to a non-object value".into(),
                ));
            }
            v
        }
        other => return Err(Error::Corruption(format!("unknown type tag {other}"))),
    };

    Ok((value, header_len + len))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn round_trip(value: Value) {
        let encoded = encode(&value).unwrap();
        let (decoded, consumed) = decode(&encoded).unwrap();
        assert_eq!(consumed, encoded.len());
        assert_eq!(decoded, value);
    }

    #[test]
    fn round_trips_every_scalar_variant() {
        round_trip(Value::Null);
        round_trip(Value::Undefined);
        round_trip(Value::Bool(true));
        round_trip(Value::Bool(false));
        round_trip(Value::Number(std::f64::consts::PI));
        round_trip(Value::Number(-0.0));
        round_trip(Value::String("hello world".into()));
        round_trip(Value::String(String::new()));
        round_trip(Value::Bytes(vec![0, 1, 2, 255]));
        round_trip(Value::Bytes(Vec::new()));
    }

    #[test]
    fn round_trips_array_and_object() {
        round_trip(Value::Array(vec![
            Value::Number(1.0),
            Value::String("x".into()),
            Value::Bytes(vec![1, 2, 3]),
        ]));

        let mut fields = HashMap::new();
        fields.insert("a".to_string(), Value::Bool(true));
        fields.insert("b".to_string(), Value::Null);
        round_trip(Value::Object(fields));
    }

    #[test]
    fn decode_rejects_truncated_header() {
        assert!(decode(&[TAG_BOOL, 0, 0]).is_err());
    }

    #[test]
    fn decode_rejects_length_past_buffer_end() {
        let mut bytes = vec![TAG_STRING];
        bytes.extend_from_slice(&100u32.to_le_bytes());
        bytes.extend_from_slice(b"short");
        assert!(decode(&bytes).is_err());
    }

    #[test]
    fn decode_rejects_unknown_tag() {
        let mut bytes = vec![200u8];
        bytes.extend_from_slice(&0u32.to_le_bytes());
        assert!(decode(&bytes).is_err());
    }

    #[test]
    fn encode_rejects_excessive_nesting() {
        let mut value = Value::Null;
        for _ in 0..(MAX_NESTING_DEPTH + 1) {
            value = Value::Array(vec![value]);
        }
        assert!(encode(&value).is_err());
    }

    #[test]
    fn decode_leaves_trailing_bytes_untouched() {
        let encoded = encode(&Value::Bool(true)).unwrap();
        let mut buf = encoded.clone();
        buf.extend_from_slice(&[0xAA, 0xBB]);
        let (value, consumed) = decode(&buf).unwrap();
        assert_eq!(value, Value::Bool(true));
        assert_eq!(consumed, encoded.len());
    }

    proptest::proptest! {
        #[test]
        fn string_values_round_trip(s in ".*") {
            round_trip(Value::String(s));
        }

        #[test]
        fn byte_values_round_trip(b in proptest::collection::vec(proptest::prelude::any::<u8>(), 0..256)) {
            round_trip(Value::Bytes(b));
        }

        #[test]
        fn number_values_round_trip(n in proptest::prelude::any::<f64>().prop_filter("no NaN", |n| !n.is_nan())) {
            round_trip(Value::Number(n));
        }
    }
}
