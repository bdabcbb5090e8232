//! DAG-CBOR helpers and Filecoin big-integer byte encoding
//!
//! Only the handful of shapes the actor params need: tuples of byte
//! strings and unsigned integers.

use ciborium::value::Value;

use crate::error::EncodingError;

pub fn encode(value: &Value) -> Result<Vec<u8>, EncodingError> {
    let mut buf = Vec::new();
    ciborium::ser::into_writer(value, &mut buf)
        .map_err(|e| EncodingError::new(format!("cbor encode: {}", e)))?;
    Ok(buf)
}

pub fn decode(bytes: &[u8]) -> Result<Value, EncodingError> {
    ciborium::de::from_reader(bytes).map_err(|e| EncodingError::new(format!("cbor decode: {}", e)))
}

pub fn uint(value: u64) -> Value {
    Value::Integer(value.into())
}

pub fn int(value: i64) -> Value {
    Value::Integer(value.into())
}

pub fn bytes(value: impl Into<Vec<u8>>) -> Value {
    Value::Bytes(value.into())
}

pub fn big(value: u128) -> Value {
    Value::Bytes(bigint_to_bytes(value))
}

/// Split a CBOR array of exactly `len` elements
pub fn tuple(value: Value, len: usize) -> Result<Vec<Value>, EncodingError> {
    match value {
        Value::Array(items) if items.len() == len => Ok(items),
        Value::Array(items) => Err(EncodingError::new(format!(
            "expected {}-tuple, got {} elements",
            len,
            items.len()
        ))),
        other => Err(EncodingError::new(format!("expected array, got {:?}", other))),
    }
}

pub fn as_bytes(value: Value) -> Result<Vec<u8>, EncodingError> {
    match value {
        Value::Bytes(b) => Ok(b),
        other => Err(EncodingError::new(format!("expected bytes, got {:?}", other))),
    }
}

pub fn as_u64(value: &Value) -> Result<u64, EncodingError> {
    match value {
        Value::Integer(i) => u64::try_from(*i)
            .map_err(|_| EncodingError::new(format!("integer out of range: {:?}", i))),
        other => Err(EncodingError::new(format!("expected uint, got {:?}", other))),
    }
}

pub fn as_i64(value: &Value) -> Result<i64, EncodingError> {
    match value {
        Value::Integer(i) => i64::try_from(*i)
            .map_err(|_| EncodingError::new(format!("integer out of range: {:?}", i))),
        other => Err(EncodingError::new(format!("expected int, got {:?}", other))),
    }
}

pub fn as_big(value: Value) -> Result<u128, EncodingError> {
    bigint_from_bytes(&as_bytes(value)?)
}

/// Filecoin BigInt: empty for zero, else sign byte (0x00) + big-endian magnitude
pub fn bigint_to_bytes(value: u128) -> Vec<u8> {
    if value == 0 {
        return Vec::new();
    }
    let be = value.to_be_bytes();
    let first = be.iter().position(|b| *b != 0).unwrap_or(be.len());
    let mut out = Vec::with_capacity(1 + be.len() - first);
    out.push(0x00);
    out.extend_from_slice(&be[first..]);
    out
}

pub fn bigint_from_bytes(bytes: &[u8]) -> Result<u128, EncodingError> {
    let Some((&sign, magnitude)) = bytes.split_first() else {
        return Ok(0);
    };
    if sign != 0x00 {
        return Err(EncodingError::new("negative big integer"));
    }
    if magnitude.len() > 16 {
        return Err(EncodingError::new(format!(
            "big integer too large: {} bytes",
            magnitude.len()
        )));
    }
    let mut buf = [0u8; 16];
    buf[16 - magnitude.len()..].copy_from_slice(magnitude);
    Ok(u128::from_be_bytes(buf))
}
