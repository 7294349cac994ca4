//! Serialization that never fails.
//!
//! A value whose `Serialize` impl errors (maps with non-string keys, custom
//! impls that reject their input) degrades to its `Debug` text instead of
//! failing the whole record. Non-finite floats become `null`, as serde_json
//! encodes them.

use crate::error::DeliveryError;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use tracing::debug;

/// Converts `value` to JSON, falling back to its `Debug` representation.
pub fn to_value_lossy<T>(value: &T) -> Value
where
    T: Serialize + fmt::Debug + ?Sized,
{
    match serde_json::to_value(value) {
        Ok(v) => v,
        Err(e) => {
            debug!(error = %e, "value not representable as JSON, using text fallback");
            Value::String(format!("{value:?}"))
        }
    }
}

/// Converts `value` to a JSON object.
///
/// Values that do not encode to an object are wrapped as `{"value": ...}`.
pub fn to_map_lossy<T>(value: &T) -> Map<String, Value>
where
    T: Serialize + fmt::Debug + ?Sized,
{
    match to_value_lossy(value) {
        Value::Object(map) => map,
        other => {
            let mut map = Map::new();
            map.insert("value".to_string(), other);
            map
        }
    }
}

/// Encodes a wire payload into a request body.
pub fn encode_body<T: Serialize>(payload: &T) -> Result<Vec<u8>, DeliveryError> {
    serde_json::to_vec(payload).map_err(|e| DeliveryError::Serialization(e.to_string()))
}
