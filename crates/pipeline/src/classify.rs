//! Classification stage: derives success / failed / delayed flags from the status.

use serde_json::{Map, Value};
use tracing::debug;

use orderwatch_core::{ClassifiedOrderRecord, NormalizedOrderRecord, OrderFlags};

use crate::payload::list_payload;

pub const SUCCESS_STATUSES: [&str; 2] = ["COMPLETE", "CLOSED"];
pub const FAILED_STATUSES: [&str; 2] = ["CANCELED", "FRAUD"];
pub const DELAY_STATUSES: [&str; 6] = [
    "PENDING",
    "PENDING_PAYMENT",
    "PROCESSING",
    "HOLDED",
    "PAYMENT_REVIEW",
    "SHIPPING",
];

/// Flags for a status string. A status in none of the sets yields all flags false.
pub fn classify_status(status: &str) -> OrderFlags {
    let is_success = SUCCESS_STATUSES.contains(&status);
    let is_failed = FAILED_STATUSES.contains(&status);
    let is_delayed = DELAY_STATUSES.contains(&status) && !(is_success || is_failed);
    OrderFlags {
        is_success,
        is_failed,
        is_delayed,
    }
}

pub fn classify(records: Vec<NormalizedOrderRecord>) -> Vec<ClassifiedOrderRecord> {
    records
        .into_iter()
        .map(|record| ClassifiedOrderRecord {
            flags: classify_status(record.status.as_str()),
            record,
        })
        .collect()
}

/// Classify a serialized list of normalized records.
///
/// Each element keeps its fields verbatim and gains the three flags, computed
/// from its raw `status` text. A status outside every set, including one no
/// enumeration knows, yields all flags false. Length and order are preserved.
pub fn classify_payload(payload: Value) -> Vec<Value> {
    list_payload(payload).into_iter().map(classify_value).collect()
}

fn classify_value(value: Value) -> Value {
    let mut record = match value {
        Value::Object(map) => map,
        other => {
            debug!(value = %other, "non-object record, classifying as empty");
            Map::new()
        }
    };
    let status = record.get("status").and_then(Value::as_str).unwrap_or_default();
    let flags = classify_status(status);
    record.insert("is_success".to_string(), Value::Bool(flags.is_success));
    record.insert("is_failed".to_string(), Value::Bool(flags.is_failed));
    record.insert("is_delayed".to_string(), Value::Bool(flags.is_delayed));
    Value::Object(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use orderwatch_core::{OrderStatus, OrderType};
    use serde_json::json;

    fn record(id: &str, status: OrderStatus) -> NormalizedOrderRecord {
        NormalizedOrderRecord {
            order_id: id.to_string(),
            customer_id: None,
            customer_name: None,
            status,
            order_type: OrderType::Online,
            total_amount: None,
            updated_at: "2025-01-01T00:00:00Z".to_string(),
            item_name: None,
            item_detail: None,
        }
    }

    #[test]
    fn every_status_obeys_the_partition() {
        for status in OrderStatus::ALL {
            let flags = classify_status(status.as_str());
            assert!(!(flags.is_success && flags.is_failed), "{status}");
            let in_delay_set = DELAY_STATUSES.contains(&status.as_str());
            assert_eq!(
                flags.is_delayed,
                in_delay_set && !flags.is_success && !flags.is_failed,
                "{status}"
            );
            assert!(flags.is_success || flags.is_failed || flags.is_delayed, "{status}");
        }
    }

    #[test]
    fn specific_statuses() {
        assert!(classify_status("COMPLETE").is_success);
        assert!(classify_status("CLOSED").is_success);
        assert!(classify_status("FRAUD").is_failed);
        assert!(classify_status("HOLDED").is_delayed);
    }

    #[test]
    fn status_outside_all_sets_has_no_flags() {
        assert_eq!(classify_status("REFUNDED"), OrderFlags::default());
        assert_eq!(classify_status("complete"), OrderFlags::default());
    }

    #[test]
    fn keeps_length_and_order() {
        let out = classify(vec![
            record("a", OrderStatus::Canceled),
            record("b", OrderStatus::Shipping),
            record("c", OrderStatus::Complete),
        ]);
        let ids: Vec<_> = out.iter().map(|r| r.record.order_id.as_str()).collect();
        assert_eq!(ids, ["a", "b", "c"]);
        assert!(out[0].flags.is_failed);
        assert!(out[1].flags.is_delayed);
        assert!(out[2].flags.is_success);
    }

    #[test]
    fn serialized_input() {
        let payload = serde_json::to_value(vec![record("a", OrderStatus::Closed)]).unwrap();
        let out = classify_payload(Value::String(payload.to_string()));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0]["is_success"], true);

        let back: Vec<ClassifiedOrderRecord> = serde_json::from_value(Value::Array(out)).unwrap();
        assert_eq!(back[0].record.order_id, "a");
        assert!(back[0].flags.is_success);
    }

    #[test]
    fn serialized_status_outside_every_set_keeps_the_record() {
        let out = classify_payload(json!([
            {"order_id": "a", "status": "COMPLETE", "total_amount": "1.00", "updated_at": "2025-01-01T00:00:00Z"},
            {"order_id": "b", "status": "REFUNDED", "total_amount": 12.5, "updated_at": "2025-01-01T00:00:05Z"},
            {"order_id": "c", "status": "CANCELED", "updated_at": "2025-01-01T00:00:09Z"}
        ]));
        let ids: Vec<_> = out.iter().map(|r| r["order_id"].as_str().unwrap()).collect();
        assert_eq!(ids, ["a", "b", "c"]);

        assert_eq!(out[1]["status"], "REFUNDED");
        assert_eq!(out[1]["total_amount"], 12.5);
        assert_eq!(out[1]["is_success"], false);
        assert_eq!(out[1]["is_failed"], false);
        assert_eq!(out[1]["is_delayed"], false);
        assert_eq!(out[0]["is_success"], true);
        assert_eq!(out[2]["is_failed"], true);
    }

    #[test]
    fn serialized_non_objects_keep_their_slot() {
        let out = classify_payload(json!([7, {"order_id": "x", "status": "HOLDED"}]));
        assert_eq!(out.len(), 2);
        assert_eq!(out[0]["is_delayed"], false);
        assert_eq!(out[1]["is_delayed"], true);
    }
}
