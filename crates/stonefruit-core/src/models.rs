//! Domain models for Stonefruit

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A linked data source (one institution login)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub item_id: String,
    pub access_token: String,
    pub institution_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The id/token pair returned by latest-item lookups
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemCredential {
    pub item_id: String,
    pub access_token: String,
}

/// A transaction record as delivered by the upstream sync endpoint
///
/// Held verbatim, keys in delivery order and explicit nulls included, so the
/// stored raw payload is exactly what upstream sent. Typed values are read
/// during normalization, where a missing or ill-typed field surfaces as
/// [`crate::Error::MalformedRecord`] instead of failing the whole batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawTransaction(Map<String, Value>);

impl RawTransaction {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Field as delivered; `Some(Value::Null)` for an explicit null
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Set a field, keeping its position if it already exists
    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.0.insert(key.to_string(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }
}

impl From<Map<String, Value>> for RawTransaction {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

/// A removal notice from the upstream sync endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemovedTransaction {
    pub transaction_id: String,
}

impl RemovedTransaction {
    pub fn new(transaction_id: impl Into<String>) -> Self {
        Self {
            transaction_id: transaction_id.into(),
        }
    }
}

/// One page of incremental changes for an item
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncBatch {
    #[serde(alias = "itemId")]
    pub item_id: String,
    #[serde(default)]
    pub added: Vec<RawTransaction>,
    #[serde(default)]
    pub modified: Vec<RawTransaction>,
    #[serde(default)]
    pub removed: Vec<RemovedTransaction>,
    #[serde(default, alias = "nextCursor")]
    pub next_cursor: Option<String>,
}

/// A transaction normalized for storage (before DB insertion)
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedTransaction {
    pub transaction_id: String,
    pub account_id: String,
    /// Item the batch was applied for; only written on first insert
    pub item_id: String,
    pub pending: bool,
    pub pending_transaction_id: Option<String>,
    pub authorized_date: Option<NaiveDate>,
    pub date: NaiveDate,
    pub amount: f64,
    pub iso_currency_code: Option<String>,
    pub name: Option<String>,
    pub personal_finance_category_json: Option<String>,
    pub location_json: Option<String>,
    pub payment_meta_json: Option<String>,
    pub raw_json: String,
    /// Always equal to `transaction_id`
    pub fingerprint: String,
    pub content_hash: String,
}

/// A stored transaction row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredTransaction {
    pub transaction_id: String,
    pub account_id: String,
    pub item_id: String,
    pub pending: bool,
    pub pending_transaction_id: Option<String>,
    pub authorized_date: Option<NaiveDate>,
    pub date: NaiveDate,
    pub amount: f64,
    pub iso_currency_code: Option<String>,
    pub name: Option<String>,
    pub personal_finance_category_json: Option<String>,
    pub location_json: Option<String>,
    pub payment_meta_json: Option<String>,
    pub raw_json: String,
    pub fingerprint: Option<String>,
    /// `None` for legacy rows not rewritten since the column was added
    pub content_hash: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// A stored transaction, as shown in diagnostics samples
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionSample {
    pub transaction_id: String,
    pub account_id: String,
    pub item_id: String,
    pub date: NaiveDate,
    pub amount: f64,
    pub name: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Resumption cursor for an item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncState {
    pub item_id: String,
    /// Empty string means start of history
    pub cursor: String,
    pub has_more: bool,
    pub last_sync_ts: DateTime<Utc>,
}

/// Why an added record was not written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Another row already owns this fingerprint
    Fingerprint,
    /// Another row has identical content (relinked item)
    ContentHash,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fingerprint => "fingerprint",
            Self::ContentHash => "content_hash",
        }
    }
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An added record suppressed as a duplicate of an existing row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedTransaction {
    pub transaction_id: String,
    pub existing_transaction_id: String,
    pub reason: SkipReason,
}

/// Outcome of applying a sync batch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResult {
    /// Rows affected by upserts (an update of an unchanged row still counts)
    pub inserted_or_updated: usize,
    /// Rows deleted; unknown ids contribute nothing
    pub deleted: usize,
    pub skipped: Vec<SkippedTransaction>,
    /// Stored transactions once the batch is applied
    pub total_rows: i64,
}

impl BatchResult {
    pub fn skipped_duplicates(&self) -> usize {
        self.skipped.len()
    }
}

/// Read-only view of stored state for operational inspection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticsSnapshot {
    pub db_path: String,
    pub total_rows: i64,
    pub total_sync_state_rows: i64,
    pub sample_transactions: Vec<TransactionSample>,
    pub sync_states: Vec<SyncState>,
}
