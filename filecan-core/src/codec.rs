//! Object serialization strategies

use crate::{FileCanError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Turns typed values into bytes and back.
///
/// The engine never looks inside the bytes a codec produces.
pub trait Codec: Send + Sync + 'static {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Encode a value
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>>;

    /// Decode a value previously produced by `encode`
    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T>;
}

/// Compact binary encoding (bincode)
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeCodec;

impl Codec for BincodeCodec {
    fn name(&self) -> &'static str {
        "bincode"
    }

    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        bincode::serialize(value).map_err(|e| FileCanError::SerializationFailed(e.to_string()))
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        bincode::deserialize(bytes).map_err(|e| FileCanError::DeserializationFailed(e.to_string()))
    }
}

/// Human-readable JSON encoding
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn name(&self) -> &'static str {
        "json"
    }

    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        serde_json::to_vec(value).map_err(|e| FileCanError::SerializationFailed(e.to_string()))
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        serde_json::from_slice(bytes)
            .map_err(|e| FileCanError::DeserializationFailed(e.to_string()))
    }
}

/// Length prefix for a field of an on-disk record
pub(crate) fn frame_len(field: &str, len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| {
        FileCanError::SerializationFailed(format!("{} too large: {} bytes", field, len))
    })
}
