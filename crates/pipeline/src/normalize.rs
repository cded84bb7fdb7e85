//! Normalization stage: maps validated events onto [`NormalizedOrderRecord`].
//!
//! Status and order type are upper-cased and coerced into their enumerations,
//! unknown values falling back to `PENDING` / `ONLINE`. Records are never dropped.

use serde_json::Value;
use tracing::debug;

use orderwatch_core::{
    amount_text, NormalizedOrderRecord, OrderStatus, OrderType, RawOrderEvent, ValidatedOrderEvent,
};

use crate::payload::list_payload;

pub fn normalize(events: Vec<ValidatedOrderEvent>) -> Vec<NormalizedOrderRecord> {
    events
        .iter()
        .map(|event| normalize_event(event.as_raw()))
        .collect()
}

/// Normalize a serialized event list. Non-object elements become empty events
/// so the output length always matches the input.
pub fn normalize_payload(payload: Value) -> Vec<NormalizedOrderRecord> {
    list_payload(payload)
        .into_iter()
        .map(|value| RawOrderEvent::from_value(value).unwrap_or_default())
        .map(|raw| normalize_event(&raw))
        .collect()
}

pub fn normalize_event(raw: &RawOrderEvent) -> NormalizedOrderRecord {
    let order_id = raw.text("order_id").unwrap_or_default();

    let status_text = raw.text("status").unwrap_or_default();
    let status = OrderStatus::coerce(&status_text);
    if !status.as_str().eq_ignore_ascii_case(&status_text) {
        debug!(order_id = %order_id, value = %status_text, "unknown order status, using PENDING");
    }

    let type_text = raw.text("order_type").unwrap_or_default();
    let order_type = OrderType::coerce(&type_text);
    if !order_type.as_str().eq_ignore_ascii_case(&type_text) {
        debug!(order_id = %order_id, value = %type_text, "unknown order type, using ONLINE");
    }

    NormalizedOrderRecord {
        customer_id: raw.text("customer_id"),
        customer_name: raw.text("customer_name"),
        status,
        order_type,
        total_amount: total_amount(&order_id, raw.get("total_amount")),
        updated_at: raw.text("updated_at").unwrap_or_default(),
        item_name: raw.text("item_name"),
        item_detail: raw.text("item_detail"),
        order_id,
    }
}

fn total_amount(order_id: &str, value: Option<&Value>) -> Option<String> {
    let value = value.filter(|v| !v.is_null())?;
    let amount = amount_text(value);
    if amount.is_none() {
        debug!(order_id = %order_id, value = %value, "non-numeric total_amount, storing NULL");
    }
    amount
}
