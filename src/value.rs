//! Record value envelope.
//!
//! A record payload is a self-describing MessagePack map with the keys:
//!
//! - `e` — the primary encoded blob (itself MessagePack once decompressed)
//! - `c` — compression flag; `1` means `e` is zstd-compressed
//! - `s` — secondary-segment descriptors; element 0 carries `l` (byte length
//!   of a segment stored as a suffix of the payload) and an optional
//!   segment-level `c`
//! - `z` — encryption descriptor; unsupported, such records are rejected
//!
//! The secondary segment is appended after the envelope's encoded region, so
//! it is located by trailing length over the *original* payload rather than
//! by cursor position. A missing or malformed `s` descriptor means "no
//! secondary part" and is not an error.

use rmpv::Value;
use std::io::Cursor;

use crate::error::VofError;

/// Default zstd level for the encode path.
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 3;

/// Decoded record value: the primary structured part and the raw secondary
/// segment (empty when the record carries none).
#[derive(Debug, Clone, PartialEq)]
pub struct RecordValue {
    pub primary: Value,
    pub secondary: Vec<u8>,
}

/// Look up `key` in a MessagePack map value. Returns `None` when `value`
/// is not a map or the key is absent.
pub fn map_get<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    let Value::Map(entries) = value else {
        return None;
    };
    entries
        .iter()
        .find(|(k, _)| k.as_str() == Some(key))
        .map(|(_, v)| v)
}

pub(crate) fn value_bytes(value: &Value) -> Option<&[u8]> {
    match value {
        Value::Binary(b) => Some(b),
        Value::String(s) => Some(s.as_bytes()),
        _ => None,
    }
}

/// Decode a record payload into its primary and secondary parts. `offset`
/// is the record's byte offset, used for error context only.
pub fn decode_value(payload: &[u8], offset: u64) -> Result<RecordValue, VofError> {
    // The secondary segment trails the envelope, so decode exactly one
    // value and ignore whatever follows it.
    let mut cursor = Cursor::new(payload);
    let envelope = rmpv::decode::read_value(&mut cursor)?;

    if map_get(&envelope, "z").is_some() {
        return Err(VofError::EncryptedValue { offset });
    }

    let compressed = matches!(map_get(&envelope, "c").and_then(Value::as_u64), Some(1));

    let encoded = map_get(&envelope, "e").ok_or(VofError::MissingField {
        entity: "value envelope",
        field: "e",
    })?;
    let encoded = value_bytes(encoded).ok_or(VofError::FieldType {
        entity: "value envelope",
        field: "e",
    })?;

    let primary = if compressed {
        let raw = zstd::decode_all(encoded).map_err(VofError::Decompress)?;
        rmpv::decode::read_value(&mut Cursor::new(&raw))?
    } else {
        rmpv::decode::read_value(&mut Cursor::new(encoded))?
    };

    let secondary = decode_secondary(&envelope, payload, compressed, offset)?;

    Ok(RecordValue { primary, secondary })
}

/// Extract the secondary segment described by `s[0]`, if any. Absent or
/// malformed descriptors yield an empty buffer; only an out-of-range length
/// or a failed decompression is an error.
fn decode_secondary(
    envelope: &Value,
    payload: &[u8],
    outer_compressed: bool,
    offset: u64,
) -> Result<Vec<u8>, VofError> {
    let Some(descriptor) = map_get(envelope, "s")
        .and_then(Value::as_array)
        .and_then(|descriptors| descriptors.first())
    else {
        return Ok(Vec::new());
    };
    let Some(len) = map_get(descriptor, "l").and_then(Value::as_u64) else {
        return Ok(Vec::new());
    };

    if len > payload.len() as u64 {
        return Err(VofError::SecondaryOverrun {
            offset,
            declared: len,
            payload_len: payload.len() as u64,
        });
    }
    let segment = &payload[payload.len() - len as usize..];

    // The segment's own compression flag wins; fall back to the outer flag
    // when the descriptor does not carry one.
    let compressed = match map_get(descriptor, "c") {
        Some(flag) => flag.as_u64() == Some(1),
        None => outer_compressed,
    };
    if compressed {
        zstd::decode_all(segment).map_err(VofError::Decompress)
    } else {
        Ok(segment.to_vec())
    }
}

/// Build a record payload from a primary value and an optional secondary
/// segment. With `compress` set, both the encoded primary and the secondary
/// segment are zstd-compressed and the envelope carries `c = 1`.
pub fn encode_value(
    primary: &Value,
    secondary: Option<&[u8]>,
    compress: bool,
) -> Result<Vec<u8>, VofError> {
    let mut encoded = Vec::new();
    rmpv::encode::write_value(&mut encoded, primary)?;
    if compress {
        encoded = zstd::encode_all(&encoded[..], DEFAULT_COMPRESSION_LEVEL)?;
    }

    let stored_secondary = match secondary {
        Some(data) if compress => Some(zstd::encode_all(data, DEFAULT_COMPRESSION_LEVEL)?),
        Some(data) => Some(data.to_vec()),
        None => None,
    };

    let mut entries: Vec<(Value, Value)> = vec![(Value::from("e"), Value::from(encoded))];
    if compress {
        entries.push((Value::from("c"), Value::from(1u64)));
    }
    if let Some(ref stored) = stored_secondary {
        let descriptor = Value::Map(vec![(Value::from("l"), Value::from(stored.len() as u64))]);
        entries.push((Value::from("s"), Value::Array(vec![descriptor])));
    }

    let mut payload = Vec::new();
    rmpv::encode::write_value(&mut payload, &Value::Map(entries))?;
    if let Some(stored) = stored_secondary {
        payload.extend_from_slice(&stored);
    }
    Ok(payload)
}
