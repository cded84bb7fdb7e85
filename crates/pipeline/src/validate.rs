//! Validation stage: keeps only events carrying an order id, status and update time.
//!
//! Rejected events are dropped without error or count.

use serde_json::Value;

use orderwatch_core::{RawOrderEvent, ValidatedOrderEvent};

use crate::payload::{list_payload, object_payload};

/// Validate a fetch response (parsed, or a JSON string). The order list is read
/// from `data`, which may itself be an embedded JSON string.
pub fn validate_payload(payload: Value) -> Vec<ValidatedOrderEvent> {
    let mut body = object_payload(payload);
    let rows = list_payload(body.remove("data").unwrap_or(Value::Null));
    validate_rows(rows)
}

/// Keep the events that pass validation, in their original order.
pub fn validate_rows(rows: Vec<Value>) -> Vec<ValidatedOrderEvent> {
    rows.into_iter()
        .filter_map(RawOrderEvent::from_value)
        .filter_map(|raw| ValidatedOrderEvent::try_from(raw).ok())
        .collect()
}
