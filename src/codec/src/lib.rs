//! # Asynx Codec
//!
//! Reversible encoding of scalar and small structured values into the byte
//! strings stored as Redis hash fields. A meta hash in the key space
//! described by `asynx-taskqueue` holds one encoded `Value` per field.

mod value;

pub use value::Value;

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Errors raised while encoding or decoding a stored value.
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("failed to encode value: {0}")]
    Encode(String),

    #[error("failed to decode value: {0}")]
    Decode(String),
}

/// Reversible mapping between in-memory values and the byte strings
/// persisted in hash fields. `Codec` implementations must round-trip every
/// `Value` variant: `decode(encode(v)) == v`. Kept free of generic methods
/// so it stays usable as `Arc<dyn Codec>`; typed access goes through the
/// free [`encode`]/[`decode`] functions below, pivoting through [`Value`].
pub trait Codec: Send + Sync {
    /// Encode a dynamically-typed [`Value`].
    fn encode_value(&self, value: &Value) -> Result<Vec<u8>, CodecError>;

    /// Decode into a dynamically-typed [`Value`].
    fn decode_value(&self, bytes: &[u8]) -> Result<Value, CodecError>;
}

/// Encode any serializable value through `codec`, pivoting it through
/// [`Value`] so the trait itself never needs a generic method.
pub fn encode<C, T>(codec: &C, value: &T) -> Result<Vec<u8>, CodecError>
where
    C: Codec + ?Sized,
    T: Serialize,
{
    let as_value: Value = serde_json::to_value(value)
        .and_then(serde_json::from_value)
        .map_err(|e| CodecError::Encode(e.to_string()))?;
    codec.encode_value(&as_value)
}

/// Decode bytes produced by [`encode`] back into `T`.
pub fn decode<C, T>(codec: &C, bytes: &[u8]) -> Result<T, CodecError>
where
    C: Codec + ?Sized,
    T: DeserializeOwned,
{
    let as_value = codec.decode_value(bytes)?;
    serde_json::to_value(&as_value)
        .and_then(serde_json::from_value)
        .map_err(|e| CodecError::Decode(e.to_string()))
}

/// Default `Codec` backed by `serde_json`. Every Asynx meta hash field is
/// encoded with this codec unless a deployment swaps in another
/// implementation (e.g. a more compact binary format); the wire shape
/// (JSON scalars/records/lists) is what the rest of the system's
/// forward-compatibility guarantees (unknown fields ignored on read) rely
/// on.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode_value(&self, value: &Value) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(value).map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn decode_value(&self, bytes: &[u8]) -> Result<Value, CodecError> {
        serde_json::from_slice(bytes).map_err(|e| CodecError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_scalars() {
        let codec = JsonCodec;
        let encoded = encode(&codec, &42i64).unwrap();
        let decoded: i64 = decode(&codec, &encoded).unwrap();
        assert_eq!(decoded, 42);
    }

    #[test]
    fn round_trips_value_record() {
        let codec = JsonCodec;
        let value = Value::Record(vec![
            ("a".to_string(), Value::Str("b".to_string())),
            ("n".to_string(), Value::Int(7)),
        ]);
        let encoded = codec.encode_value(&value).unwrap();
        let decoded = codec.decode_value(&encoded).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn decode_rejects_garbage() {
        let codec = JsonCodec;
        let err = decode::<_, i64>(&codec, b"not json").unwrap_err();
        assert!(matches!(err, CodecError::Decode(_)));
    }
}
