//! Order records as they move through the monitoring pipeline.
//!
//! Raw events arrive as loose JSON objects. Validation wraps them without
//! copying, normalization produces the typed [`NormalizedOrderRecord`], and
//! classification attaches [`OrderFlags`]. [`FactRow`] and [`AggregateRow`]
//! are the persisted shapes.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Timelike, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::CoreError;

/// Fields every event must carry to survive validation.
pub const REQUIRED_FIELDS: [&str; 3] = ["order_id", "status", "updated_at"];

// ── Enumerations ──────────────────────────────────────────────

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    #[default]
    Pending,
    PendingPayment,
    Processing,
    Complete,
    Closed,
    Canceled,
    Holded,
    PaymentReview,
    Fraud,
    Shipping,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 10] = [
        Self::Pending,
        Self::PendingPayment,
        Self::Processing,
        Self::Complete,
        Self::Closed,
        Self::Canceled,
        Self::Holded,
        Self::PaymentReview,
        Self::Fraud,
        Self::Shipping,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::PendingPayment => "PENDING_PAYMENT",
            Self::Processing => "PROCESSING",
            Self::Complete => "COMPLETE",
            Self::Closed => "CLOSED",
            Self::Canceled => "CANCELED",
            Self::Holded => "HOLDED",
            Self::PaymentReview => "PAYMENT_REVIEW",
            Self::Fraud => "FRAUD",
            Self::Shipping => "SHIPPING",
        }
    }

    /// Upper-case `raw` and match it; anything unrecognised becomes `PENDING`.
    pub fn coerce(raw: &str) -> Self {
        raw.to_uppercase().parse().unwrap_or_default()
    }
}

impl FromStr for OrderStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| CoreError::UnknownVariant {
                kind: "order status",
                value: s.to_string(),
            })
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    #[default]
    Online,
    Offline,
    Instore,
    Marketplace,
    Callcenter,
}

impl OrderType {
    pub const ALL: [OrderType; 5] = [
        Self::Online,
        Self::Offline,
        Self::Instore,
        Self::Marketplace,
        Self::Callcenter,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Online => "ONLINE",
            Self::Offline => "OFFLINE",
            Self::Instore => "INSTORE",
            Self::Marketplace => "MARKETPLACE",
            Self::Callcenter => "CALLCENTER",
        }
    }

    /// Upper-case `raw` and match it; anything unrecognised becomes `ONLINE`.
    pub fn coerce(raw: &str) -> Self {
        raw.to_uppercase().parse().unwrap_or_default()
    }
}

impl FromStr for OrderType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|order_type| order_type.as_str() == s)
            .ok_or_else(|| CoreError::UnknownVariant {
                kind: "order type",
                value: s.to_string(),
            })
    }
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Raw and validated events ──────────────────────────────────

/// One order event exactly as the order API reported it. No field is trusted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawOrderEvent(Map<String, Value>);

impl RawOrderEvent {
    /// Wrap a JSON value; anything other than an object is not an order event.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Text form of a field, `None` when missing or null.
    pub fn text(&self, key: &str) -> Option<String> {
        self.get(key).and_then(value_text)
    }

    /// True when the field exists and carries a non-empty value.
    pub fn has_value(&self, key: &str) -> bool {
        self.get(key).is_some_and(is_present)
    }

    /// First required field that is missing or empty.
    pub fn missing_required(&self) -> Option<&'static str> {
        REQUIRED_FIELDS.into_iter().find(|field| !self.has_value(field))
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Map<String, Value>> for RawOrderEvent {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// A raw event known to carry `order_id`, `status` and `updated_at`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ValidatedOrderEvent(RawOrderEvent);

impl ValidatedOrderEvent {
    pub fn order_id(&self) -> String {
        self.0.text("order_id").unwrap_or_default()
    }

    pub fn status(&self) -> String {
        self.0.text("status").unwrap_or_default()
    }

    pub fn updated_at(&self) -> String {
        self.0.text("updated_at").unwrap_or_default()
    }

    pub fn as_raw(&self) -> &RawOrderEvent {
        &self.0
    }

    pub fn into_raw(self) -> RawOrderEvent {
        self.0
    }
}

impl TryFrom<RawOrderEvent> for ValidatedOrderEvent {
    type Error = CoreError;

    fn try_from(raw: RawOrderEvent) -> Result<Self, Self::Error> {
        match raw.missing_required() {
            Some(field) => Err(CoreError::MissingField(field)),
            None => Ok(Self(raw)),
        }
    }
}

/// Truthiness used for required fields: null, false and empty containers
/// or strings count as missing. Numbers always count as present.
fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(_) => true,
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

// ── Canonical records ─────────────────────────────────────────

/// Decoding is lenient the same way normalization is: unknown enum text is
/// coerced and amounts may be JSON numbers or decimal strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedOrderRecord {
    pub order_id: String,
    pub customer_id: Option<String>,
    pub customer_name: Option<String>,
    #[serde(deserialize_with = "lenient_status")]
    pub status: OrderStatus,
    #[serde(default, deserialize_with = "lenient_order_type")]
    pub order_type: OrderType,
    /// Decimal text, kept as text so no precision is lost on the way to `numeric`.
    #[serde(default, deserialize_with = "lenient_amount")]
    pub total_amount: Option<String>,
    pub updated_at: String,
    pub item_name: Option<String>,
    pub item_detail: Option<String>,
}

impl NormalizedOrderRecord {
    pub fn updated_at_utc(&self) -> Result<DateTime<Utc>, CoreError> {
        parse_order_timestamp(&self.updated_at)
    }
}

fn lenient_status<'de, D: Deserializer<'de>>(d: D) -> Result<OrderStatus, D::Error> {
    let raw = Option::<Value>::deserialize(d)?;
    Ok(OrderStatus::coerce(&raw.as_ref().and_then(value_text).unwrap_or_default()))
}

fn lenient_order_type<'de, D: Deserializer<'de>>(d: D) -> Result<OrderType, D::Error> {
    let raw = Option::<Value>::deserialize(d)?;
    Ok(OrderType::coerce(&raw.as_ref().and_then(value_text).unwrap_or_default()))
}

fn lenient_amount<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(Option::<Value>::deserialize(d)?.as_ref().and_then(amount_text))
}

/// Amounts arrive as JSON numbers or as decimal strings (`numeric` serialized by
/// the upstream API). Anything that is not a finite number yields `None`.
pub fn amount_text(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<f64>()
                .ok()
                .filter(|n| n.is_finite())
                .map(|_| s.to_string())
        }
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderFlags {
    pub is_success: bool,
    pub is_failed: bool,
    pub is_delayed: bool,
}

/// Serialized flat: the flags sit next to the record fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedOrderRecord {
    #[serde(flatten)]
    pub record: NormalizedOrderRecord,
    #[serde(flatten)]
    pub flags: OrderFlags,
}

/// Persisted fact. `ingested_at` is set on first insert and never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactRow {
    #[serde(flatten)]
    pub order: ClassifiedOrderRecord,
    pub ingested_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateRow {
    pub ts_minute: DateTime<Utc>,
    pub success_count: i64,
    pub failed_count: i64,
    pub delayed_count: i64,
    pub total_count: i64,
}

impl AggregateRow {
    pub fn empty(ts_minute: DateTime<Utc>) -> Self {
        Self {
            ts_minute,
            success_count: 0,
            failed_count: 0,
            delayed_count: 0,
            total_count: 0,
        }
    }

    pub fn record(&mut self, flags: OrderFlags) {
        self.success_count += i64::from(flags.is_success);
        self.failed_count += i64::from(flags.is_failed);
        self.delayed_count += i64::from(flags.is_delayed);
        self.total_count += 1;
    }
}

// ── Timestamps ────────────────────────────────────────────────

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Parse an order timestamp. RFC 3339 is preferred; zone-less values are taken as UTC.
pub fn parse_order_timestamp(raw: &str) -> Result<DateTime<Utc>, CoreError> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
        .ok_or_else(|| CoreError::InvalidTimestamp(raw.to_string()))
}

pub fn truncate_to_minute(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(ts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: Value) -> RawOrderEvent {
        RawOrderEvent::from_value(value).unwrap()
    }

    #[test]
    fn status_coercion_is_case_insensitive() {
        assert_eq!(OrderStatus::coerce("complete"), OrderStatus::Complete);
        assert_eq!(OrderStatus::coerce("Payment_Review"), OrderStatus::PaymentReview);
        assert_eq!(OrderStatus::coerce("delivered"), OrderStatus::Pending);
        assert_eq!(OrderStatus::coerce(""), OrderStatus::Pending);
    }

    #[test]
    fn order_type_coercion_defaults_to_online() {
        assert_eq!(OrderType::coerce("instore"), OrderType::Instore);
        assert_eq!(OrderType::coerce("kiosk"), OrderType::Online);
    }

    #[test]
    fn from_str_is_exact() {
        assert!("complete".parse::<OrderStatus>().is_err());
        assert_eq!("PENDING_PAYMENT".parse::<OrderStatus>(), Ok(OrderStatus::PendingPayment));
        for status in OrderStatus::ALL {
            assert_eq!(status.as_str().parse::<OrderStatus>(), Ok(status));
        }
    }

    #[test]
    fn enums_serialize_upper_case() {
        assert_eq!(serde_json::to_value(OrderStatus::PaymentReview).unwrap(), json!("PAYMENT_REVIEW"));
        assert_eq!(serde_json::to_value(OrderType::Callcenter).unwrap(), json!("CALLCENTER"));
    }

    #[test]
    fn non_objects_are_not_events() {
        assert!(RawOrderEvent::from_value(json!("ORD-1")).is_none());
        assert!(RawOrderEvent::from_value(json!([1, 2])).is_none());
    }

    #[test]
    fn required_field_presence() {
        let event = raw(json!({"order_id": "A", "status": "", "updated_at": "2025-01-01T00:00:00Z"}));
        assert_eq!(event.missing_required(), Some("status"));

        let event = raw(json!({"order_id": null, "status": "X", "updated_at": "t"}));
        assert_eq!(event.missing_required(), Some("order_id"));

        let event = raw(json!({"order_id": 42, "status": "X", "updated_at": "t"}));
        assert_eq!(event.missing_required(), None);
    }

    #[test]
    fn validated_event_exposes_required_text() {
        let event = raw(json!({"order_id": 42, "status": "complete", "updated_at": "2025-01-01"}));
        let validated = ValidatedOrderEvent::try_from(event).unwrap();
        assert_eq!(validated.order_id(), "42");
        assert_eq!(validated.status(), "complete");

        let missing = raw(json!({"order_id": "A"}));
        assert_eq!(
            ValidatedOrderEvent::try_from(missing),
            Err(CoreError::MissingField("status"))
        );
    }

    #[test]
    fn classified_record_serializes_flat() {
        let record = ClassifiedOrderRecord {
            record: NormalizedOrderRecord {
                order_id: "ORD-1".into(),
                customer_id: Some("C-1".into()),
                customer_name: None,
                status: OrderStatus::Closed,
                order_type: OrderType::Marketplace,
                total_amount: Some("19.90".into()),
                updated_at: "2025-01-01T00:00:10Z".into(),
                item_name: None,
                item_detail: None,
            },
            flags: OrderFlags { is_success: true, is_failed: false, is_delayed: false },
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["status"], "CLOSED");
        assert_eq!(value["is_success"], true);
        assert_eq!(value["customer_name"], Value::Null);

        let back: ClassifiedOrderRecord = serde_json::from_value(value).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn record_decoding_accepts_numeric_amounts_and_unknown_enums() {
        let record: NormalizedOrderRecord = serde_json::from_value(json!({
            "order_id": "ORD-2",
            "status": "refunded",
            "total_amount": 12.5,
            "updated_at": "2025-01-01T00:00:10Z"
        }))
        .unwrap();
        assert_eq!(record.status, OrderStatus::Pending);
        assert_eq!(record.order_type, OrderType::Online);
        assert_eq!(record.total_amount.as_deref(), Some("12.5"));
        assert_eq!(record.customer_id, None);

        let record: NormalizedOrderRecord = serde_json::from_value(json!({
            "order_id": "ORD-3",
            "status": "CLOSED",
            "order_type": "instore",
            "total_amount": "n/a",
            "updated_at": "2025-01-01T00:00:10Z"
        }))
        .unwrap();
        assert_eq!(record.status, OrderStatus::Closed);
        assert_eq!(record.order_type, OrderType::Instore);
        assert_eq!(record.total_amount, None);
    }

    #[test]
    fn amounts() {
        assert_eq!(amount_text(&json!(12.5)).as_deref(), Some("12.5"));
        assert_eq!(amount_text(&json!(" 3.10 ")).as_deref(), Some("3.10"));
        assert_eq!(amount_text(&json!("n/a")), None);
        assert_eq!(amount_text(&json!("inf")), None);
        assert_eq!(amount_text(&json!(true)), None);
    }

    #[test]
    fn timestamps_with_and_without_zone() {
        let expected = "2025-01-01T00:00:30Z".parse::<DateTime<Utc>>().unwrap();
        assert_eq!(parse_order_timestamp("2025-01-01T00:00:30Z").unwrap(), expected);
        assert_eq!(parse_order_timestamp("2025-01-01T07:00:30+07:00").unwrap(), expected);
        assert_eq!(parse_order_timestamp("2025-01-01 00:00:30").unwrap(), expected);
        assert_eq!(parse_order_timestamp("2025-01-01T00:00:30.250").unwrap().second(), 30);
        assert!(parse_order_timestamp("yesterday").is_err());
    }

    #[test]
    fn minute_truncation() {
        let ts = parse_order_timestamp("2025-01-01T00:00:59.999Z").unwrap();
        assert_eq!(
            truncate_to_minute(ts),
            parse_order_timestamp("2025-01-01T00:00:00Z").unwrap()
        );
    }

    #[test]
    fn aggregate_row_counts_flags() {
        let mut row = AggregateRow::empty(Utc::now());
        row.record(OrderFlags { is_success: true, ..Default::default() });
        row.record(OrderFlags { is_delayed: true, ..Default::default() });
        row.record(OrderFlags::default());
        assert_eq!((row.success_count, row.failed_count, row.delayed_count, row.total_count), (1, 0, 1, 3));
    }
}
