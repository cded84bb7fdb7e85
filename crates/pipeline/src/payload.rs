//! Decoding of the JSON handed between steps.
//!
//! A step may receive its input already parsed, or as a JSON document embedded
//! in a string (as produced by schedulers that template step outputs). Input that
//! cannot be decoded into the expected shape degrades to an empty collection.
//! Typed lists are decoded per element, so one bad record never empties a batch.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::PipelineError;

/// Parse a string payload once; any other value is returned untouched.
fn decode_embedded(value: Value) -> Result<Value, PipelineError> {
    match value {
        Value::String(text) => Ok(serde_json::from_str(&text)?),
        other => Ok(other),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Decode a payload expected to be a JSON object.
pub fn object_payload(value: Value) -> Map<String, Value> {
    match decode_embedded(value) {
        Ok(Value::Object(map)) => map,
        Ok(other) => {
            debug!(kind = kind(&other), "payload is not an object, treating as empty");
            Map::new()
        }
        Err(e) => {
            debug!(error = %e, "unparsable object payload, treating as empty");
            Map::new()
        }
    }
}

/// Decode a payload expected to be a JSON array.
pub fn list_payload(value: Value) -> Vec<Value> {
    match decode_embedded(value) {
        Ok(Value::Array(items)) => items,
        Ok(Value::Null) => Vec::new(),
        Ok(other) => {
            debug!(kind = kind(&other), "payload is not a list, treating as empty");
            Vec::new()
        }
        Err(e) => {
            debug!(error = %e, "unparsable list payload, treating as empty");
            Vec::new()
        }
    }
}

/// Decode a list payload into typed records, element by element. Elements that
/// do not match `T` are dropped with a warning; the rest keep their order.
pub fn records_payload<T: DeserializeOwned>(value: Value) -> Vec<T> {
    let items = list_payload(value);
    let total = items.len();
    let records: Vec<T> = items
        .into_iter()
        .enumerate()
        .filter_map(|(index, item)| match serde_json::from_value(item) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(index, error = %e, "dropping payload record with an unexpected shape");
                None
            }
        })
        .collect();
    if records.len() < total {
        warn!(kept = records.len(), total, "some payload records were dropped");
    }
    records
}
