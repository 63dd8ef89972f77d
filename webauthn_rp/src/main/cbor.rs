use ciborium::value::{Integer, Value as CborValue};

use crate::errors::WebauthnError;

pub(crate) type CborMap = Vec<(CborValue, CborValue)>;

/// Decodes exactly one CBOR item from the front of `bytes` and reports how
/// many bytes it occupied, so callers can keep slicing the same buffer.
///
/// Maps stay as ordered key/value vectors; nothing is coerced into structs,
/// so keys this crate does not know about are preserved.
pub fn decode_cbor_first(bytes: &[u8]) -> Result<(CborValue, usize), WebauthnError> {
    let mut remaining = bytes;
    let value: CborValue = ciborium::de::from_reader(&mut remaining)
        .map_err(|e| WebauthnError::Decode(format!("Invalid CBOR data: {e}")))?;
    let consumed = bytes.len() - remaining.len();
    Ok((value, consumed))
}

/// Decodes one CBOR item and rejects anything left over after it.
pub fn decode_cbor_exact(bytes: &[u8]) -> Result<CborValue, WebauthnError> {
    let (value, consumed) = decode_cbor_first(bytes)?;
    if consumed != bytes.len() {
        return Err(WebauthnError::Decode(format!(
            "Unexpected {} trailing bytes after CBOR item",
            bytes.len() - consumed
        )));
    }
    Ok(value)
}

/// Encodes a value. Byte strings are written as plain major type 2 items, so
/// their length is unchanged by a decode/encode cycle.
pub fn encode_cbor(value: &CborValue) -> Result<Vec<u8>, WebauthnError> {
    let mut out = Vec::new();
    ciborium::ser::into_writer(value, &mut out)
        .map_err(|e| WebauthnError::Decode(format!("Failed to encode CBOR: {e}")))?;
    Ok(out)
}

pub(crate) fn integer_to_i64(i: &Integer) -> Option<i64> {
    i64::try_from(*i).ok()
}

pub(crate) fn as_map(value: &CborValue) -> Option<&CborMap> {
    match value {
        CborValue::Map(m) => Some(m),
        _ => None,
    }
}

pub(crate) fn as_bytes(value: &CborValue) -> Option<&[u8]> {
    match value {
        CborValue::Bytes(b) => Some(b),
        _ => None,
    }
}

pub(crate) fn as_text(value: &CborValue) -> Option<&str> {
    match value {
        CborValue::Text(t) => Some(t),
        _ => None,
    }
}

pub(crate) fn as_i64(value: &CborValue) -> Option<i64> {
    match value {
        CborValue::Integer(i) => integer_to_i64(i),
        _ => None,
    }
}

pub(crate) fn as_array(value: &CborValue) -> Option<&[CborValue]> {
    match value {
        CborValue::Array(a) => Some(a),
        _ => None,
    }
}

/// Looks up a text key in a CBOR map.
pub(crate) fn map_get<'a>(map: &'a CborMap, key: &str) -> Option<&'a CborValue> {
    map.iter().find_map(|(k, v)| match k {
        CborValue::Text(t) if t == key => Some(v),
        _ => None,
    })
}

/// Looks up an integer key (COSE labels) in a CBOR map.
pub(crate) fn map_get_int(map: &CborMap, key: i64) -> Option<&CborValue> {
    map.iter().find_map(|(k, v)| match k {
        CborValue::Integer(i) if integer_to_i64(i) == Some(key) => Some(v),
        _ => None,
    })
}
