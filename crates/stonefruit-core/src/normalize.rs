//! Normalization of upstream transaction records and duplicate detection
//!
//! Two keys identify a stored transaction:
//! - `fingerprint`: the upstream `transaction_id`, unique in storage
//! - `content_hash`: SHA-256 over date, amount, currency, normalized name and
//!   payment metadata. Account and item ids are left out so a transaction
//!   that resurfaces after the user relinks an institution still collides.

use chrono::NaiveDate;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::models::{NormalizedTransaction, RawTransaction, SkipReason};

/// Separator between content hash fields (ASCII unit separator)
pub const CONTENT_HASH_DELIMITER: char = '\u{1f}';

/// Convert a raw upstream record into the row stored for `item_id`
pub fn normalize(raw: &RawTransaction, item_id: &str) -> Result<NormalizedTransaction> {
    let transaction_id = required(raw, "transaction_id", None)?;
    let id = Some(transaction_id.as_str());
    let account_id = required(raw, "account_id", id)?;

    let date = parse_date(&required(raw, "date", id)?, "date", &transaction_id)?;
    let authorized_date = text(raw, "authorized_date", id)?
        .map(|s| parse_date(&s, "authorized_date", &transaction_id))
        .transpose()?;

    let amount = parse_amount(raw.get("amount"), &transaction_id)?;
    let iso_currency_code = text(raw, "iso_currency_code", id)?;
    let name = text(raw, "name", id)?;

    let payment_meta_json = structured(raw.get("payment_meta"))?;
    let content_hash = content_hash(
        &date,
        amount,
        iso_currency_code.as_deref(),
        name.as_deref(),
        payment_meta_json.as_deref(),
    );

    Ok(NormalizedTransaction {
        fingerprint: transaction_id.clone(),
        account_id,
        item_id: item_id.to_string(),
        pending: truthy(raw.get("pending")),
        pending_transaction_id: text(raw, "pending_transaction_id", id)?,
        authorized_date,
        date,
        amount,
        iso_currency_code,
        name,
        personal_finance_category_json: structured(raw.get("personal_finance_category"))?,
        location_json: structured(raw.get("location"))?,
        payment_meta_json,
        raw_json: serde_json::to_string(raw)?,
        content_hash,
        transaction_id,
    })
}

/// Hash of the semantic transaction content, hex encoded
pub fn content_hash(
    date: &NaiveDate,
    amount: f64,
    iso_currency_code: Option<&str>,
    name: Option<&str>,
    payment_meta_json: Option<&str>,
) -> String {
    let normalized_name = name.map(|n| n.trim().to_lowercase()).unwrap_or_default();
    let fields = [
        date.to_string(),
        format_amount(amount),
        iso_currency_code.unwrap_or_default().to_string(),
        normalized_name,
        payment_meta_json.unwrap_or_default().to_string(),
    ];

    let mut hasher = Sha256::new();
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            let mut buf = [0u8; 4];
            hasher.update(CONTENT_HASH_DELIMITER.encode_utf8(&mut buf).as_bytes());
        }
        hasher.update(field.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Shortest decimal rendering of an amount (`12.5`, `12`, `-3.25`)
pub fn format_amount(amount: f64) -> String {
    if amount == 0.0 {
        // -0.0 renders as "-0"
        return "0".to_string();
    }
    amount.to_string()
}

/// JSON encoding with object keys sorted at every level
pub fn canonical_json(value: &Value) -> Result<String> {
    Ok(serde_json::to_string(&canonicalize(value))?)
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::new();
            for key in keys {
                sorted.insert(key.clone(), canonicalize(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

fn structured(value: Option<&Value>) -> Result<Option<String>> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(v) => canonical_json(v).map(Some),
    }
}

/// Upstream truthiness: absent, null, false, 0 and "" are unset
fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}

fn malformed(transaction_id: Option<&str>, problem: &str) -> Error {
    match transaction_id {
        Some(id) => Error::MalformedRecord(format!("transaction {} {}", id, problem)),
        None => Error::MalformedRecord(format!("transaction {}", problem)),
    }
}

/// String field; absent, null and empty all become `None`
fn text(raw: &RawTransaction, field: &str, transaction_id: Option<&str>) -> Result<Option<String>> {
    match raw.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(malformed(
            transaction_id,
            &format!("has non-string {}: {}", field, other),
        )),
    }
}

fn required(raw: &RawTransaction, field: &str, transaction_id: Option<&str>) -> Result<String> {
    text(raw, field, transaction_id)?
        .ok_or_else(|| malformed(transaction_id, &format!("is missing {}", field)))
}

fn parse_date(s: &str, field: &str, transaction_id: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|_| {
        Error::MalformedRecord(format!(
            "transaction {} has invalid {}: {:?}",
            transaction_id, field, s
        ))
    })
}

fn parse_amount(value: Option<&Value>, transaction_id: &str) -> Result<f64> {
    let parsed = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    match parsed {
        Some(amount) if amount.is_finite() => Ok(amount),
        _ => Err(Error::MalformedRecord(format!(
            "transaction {} has non-numeric amount: {}",
            transaction_id,
            value.map(|v| v.to_string()).unwrap_or_else(|| "null".to_string())
        ))),
    }
}

/// Outcome of the duplicate check for an added record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DedupDecision {
    /// No conflicting row; write it
    Upsert,
    /// A different row already represents this transaction
    Skip {
        existing_transaction_id: String,
        reason: SkipReason,
    },
}

/// Decide whether an added record may be written
///
/// `fingerprint_owner` is the id of the row holding the incoming fingerprint,
/// `content_match` the id of a row sharing the incoming content hash.
pub fn decide(
    transaction_id: &str,
    fingerprint_owner: Option<&str>,
    content_match: Option<&str>,
) -> DedupDecision {
    if let Some(existing) = fingerprint_owner.filter(|id| *id != transaction_id) {
        return DedupDecision::Skip {
            existing_transaction_id: existing.to_string(),
            reason: SkipReason::Fingerprint,
        };
    }
    if let Some(existing) = content_match.filter(|id| *id != transaction_id) {
        return DedupDecision::Skip {
            existing_transaction_id: existing.to_string(),
            reason: SkipReason::ContentHash,
        };
    }
    DedupDecision::Upsert
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: Value) -> RawTransaction {
        serde_json::from_value(value).unwrap()
    }

    fn coffee() -> RawTransaction {
        raw(json!({
            "transaction_id": "t1",
            "account_id": "a1",
            "date": "2024-01-01",
            "amount": 12.5,
            "name": "Coffee"
        }))
    }

    fn manual_hash(fields: [&str; 5]) -> String {
        let joined = fields.join(&CONTENT_HASH_DELIMITER.to_string());
        hex::encode(Sha256::digest(joined.as_bytes()))
    }

    #[test]
    fn test_normalize_basic() {
        let tx = normalize(&coffee(), "item1").unwrap();
        assert_eq!(tx.transaction_id, "t1");
        assert_eq!(tx.fingerprint, "t1");
        assert_eq!(tx.account_id, "a1");
        assert_eq!(tx.item_id, "item1");
        assert!(!tx.pending);
        assert_eq!(tx.date, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(tx.amount, 12.5);
        assert_eq!(tx.name.as_deref(), Some("Coffee"));
    }

    #[test]
    fn test_content_hash_matches_documented_fields() {
        let tx = normalize(&coffee(), "item1").unwrap();
        assert_eq!(
            tx.content_hash,
            manual_hash(["2024-01-01", "12.5", "", "coffee", ""])
        );
        assert_eq!(tx.content_hash.len(), 64);
    }

    #[test]
    fn test_absent_optionals_are_null_not_empty() {
        let tx = normalize(
            &raw(json!({
                "transaction_id": "t1",
                "account_id": "a1",
                "date": "2024-01-01",
                "amount": 1,
                "name": "",
                "iso_currency_code": "",
                "pending_transaction_id": null
            })),
            "item1",
        )
        .unwrap();
        assert_eq!(tx.name, None);
        assert_eq!(tx.iso_currency_code, None);
        assert_eq!(tx.pending_transaction_id, None);
        assert_eq!(tx.authorized_date, None);
        assert_eq!(tx.personal_finance_category_json, None);
        assert_eq!(tx.location_json, None);
        assert_eq!(tx.payment_meta_json, None);
    }

    #[test]
    fn test_pending_flag() {
        let mut r = coffee();
        r.set("pending", true);
        assert!(normalize(&r, "item1").unwrap().pending);
    }

    #[test]
    fn test_pending_flag_uses_truthiness() {
        for (value, expected) in [
            (json!(1), true),
            (json!(0), false),
            (json!("yes"), true),
            (json!(""), false),
            (json!(null), false),
            (json!(false), false),
        ] {
            let mut r = coffee();
            r.set("pending", value.clone());
            assert_eq!(
                normalize(&r, "item1").unwrap().pending,
                expected,
                "pending = {}",
                value
            );
        }
    }

    #[test]
    fn test_integer_pending_in_batch_deserializes() {
        let batch: crate::models::SyncBatch = serde_json::from_str(
            r#"{"itemId": "item1", "added": [{"transaction_id": "t1", "account_id": "a1",
                "date": "2024-01-01", "amount": 12.5, "pending": 1}]}"#,
        )
        .unwrap();
        assert!(normalize(&batch.added[0], "item1").unwrap().pending);
    }

    #[test]
    fn test_amount_numeric_string_is_accepted() {
        let mut r = coffee();
        r.set("amount", "12.50");
        let tx = normalize(&r, "item1").unwrap();
        assert_eq!(tx.amount, 12.5);
        // Same content as the numeric form
        assert_eq!(tx.content_hash, normalize(&coffee(), "item1").unwrap().content_hash);
    }

    #[test]
    fn test_non_numeric_amount_is_malformed() {
        for bad in [json!("twelve"), json!(""), json!(null), json!({"v": 1}), json!(true)] {
            let mut r = coffee();
            r.set("amount", bad.clone());
            let result = normalize(&r, "item1");
            assert!(
                matches!(result, Err(Error::MalformedRecord(_))),
                "expected malformed for {}",
                bad
            );
        }

        let mut r = coffee();
        r.remove("amount");
        assert!(matches!(normalize(&r, "item1"), Err(Error::MalformedRecord(_))));
    }

    #[test]
    fn test_missing_required_fields_are_malformed() {
        let mut r = coffee();
        r.remove("transaction_id");
        assert!(matches!(normalize(&r, "item1"), Err(Error::MalformedRecord(_))));

        let mut r = coffee();
        r.set("account_id", "");
        assert!(matches!(normalize(&r, "item1"), Err(Error::MalformedRecord(_))));

        let mut r = coffee();
        r.set("date", "01/15/2024");
        assert!(matches!(normalize(&r, "item1"), Err(Error::MalformedRecord(_))));

        let mut r = coffee();
        r.set("name", 42);
        assert!(matches!(normalize(&r, "item1"), Err(Error::MalformedRecord(_))));
    }

    #[test]
    fn test_content_hash_ignores_account_and_item() {
        let a = normalize(&coffee(), "item1").unwrap();
        let mut relinked = coffee();
        relinked.set("transaction_id", "t2");
        relinked.set("account_id", "a9");
        let b = normalize(&relinked, "item2").unwrap();
        assert_eq!(a.content_hash, b.content_hash);
    }

    #[test]
    fn test_content_hash_name_case_and_whitespace() {
        let mut r = coffee();
        r.set("name", "  COFFEE ");
        let tx = normalize(&r, "item1").unwrap();
        assert_eq!(tx.content_hash, normalize(&coffee(), "item1").unwrap().content_hash);
        // Stored name is kept as delivered
        assert_eq!(tx.name.as_deref(), Some("  COFFEE "));
    }

    #[test]
    fn test_content_hash_sensitive_to_currency_and_amount() {
        let base = normalize(&coffee(), "item1").unwrap().content_hash;

        let mut r = coffee();
        r.set("iso_currency_code", "USD");
        assert_ne!(normalize(&r, "item1").unwrap().content_hash, base);

        let mut r = coffee();
        r.set("amount", 12.51);
        assert_ne!(normalize(&r, "item1").unwrap().content_hash, base);
    }

    #[test]
    fn test_structured_fields_are_canonical() {
        let mut a = coffee();
        a.set("payment_meta", json!({"reference_number": "R1", "by_order_of": null}));
        a.set("location", json!({"city": "Austin", "address": {"zip": "78701", "street": "Main"}}));
        let tx = normalize(&a, "item1").unwrap();
        assert_eq!(
            tx.payment_meta_json.as_deref(),
            Some(r#"{"by_order_of":null,"reference_number":"R1"}"#)
        );
        assert_eq!(
            tx.location_json.as_deref(),
            Some(r#"{"address":{"street":"Main","zip":"78701"},"city":"Austin"}"#)
        );
        assert_eq!(
            tx.content_hash,
            manual_hash([
                "2024-01-01",
                "12.5",
                "",
                "coffee",
                r#"{"by_order_of":null,"reference_number":"R1"}"#
            ])
        );
    }

    #[test]
    fn test_raw_payload_keeps_unknown_fields() {
        let r = raw(json!({
            "transaction_id": "t1",
            "account_id": "a1",
            "date": "2024-01-01",
            "amount": 3,
            "merchant_name": "Blue Bottle",
            "category": ["Food", "Coffee"]
        }));
        let tx = normalize(&r, "item1").unwrap();
        let payload: Value = serde_json::from_str(&tx.raw_json).unwrap();
        assert_eq!(payload["merchant_name"], "Blue Bottle");
        assert_eq!(payload["category"][1], "Coffee");
        assert_eq!(payload["transaction_id"], "t1");
    }

    #[test]
    fn test_raw_payload_is_verbatim() {
        let delivered = r#"{"transaction_id":"t1","account_id":"a1","pending_transaction_id":null,"authorized_date":null,"date":"2024-01-01","amount":12.5,"name":"Coffee","zeta":1,"alpha":2}"#;
        let r: RawTransaction = serde_json::from_str(delivered).unwrap();

        let tx = normalize(&r, "item1").unwrap();
        assert_eq!(tx.raw_json, delivered);
        assert_eq!(tx.pending_transaction_id, None);
        assert_eq!(tx.authorized_date, None);
    }

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(12.5), "12.5");
        assert_eq!(format_amount(12.0), "12");
        assert_eq!(format_amount(-3.25), "-3.25");
        assert_eq!(format_amount(-0.0), "0");
    }

    #[test]
    fn test_decide() {
        assert_eq!(decide("t1", None, None), DedupDecision::Upsert);
        // Same id on either key is an update of the same row
        assert_eq!(decide("t1", Some("t1"), Some("t1")), DedupDecision::Upsert);
        assert_eq!(
            decide("t2", None, Some("t1")),
            DedupDecision::Skip {
                existing_transaction_id: "t1".to_string(),
                reason: SkipReason::ContentHash,
            }
        );
        // Fingerprint check runs first
        assert_eq!(
            decide("t2", Some("t3"), Some("t1")),
            DedupDecision::Skip {
                existing_transaction_id: "t3".to_string(),
                reason: SkipReason::Fingerprint,
            }
        );
    }
}
