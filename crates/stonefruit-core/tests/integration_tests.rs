//! Integration tests for stonefruit-core
//!
//! These tests exercise the full link → sync → relink → inspect workflow
//! through the public API, against a real file on disk.

use sha2::{Digest, Sha256};
use stonefruit_core::{
    db::Database, ItemCredential, RemovedTransaction, SkipReason, StoreConfig, SyncBatch,
};
use tempfile::TempDir;

fn open_store() -> (TempDir, Database) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let db = Database::new(StoreConfig::new(dir.path().join("raw").join("plaid.db")))
        .expect("Failed to open store");
    (dir, db)
}

/// First page of a sync for a freshly linked item, as delivered upstream
fn first_page() -> &'static str {
    r#"{
        "itemId": "item1",
        "added": [
            {"transaction_id": "t1", "account_id": "a1", "date": "2024-01-01", "amount": 12.5, "name": "Coffee"},
            {"transaction_id": "t2", "account_id": "a1", "date": "2024-01-02", "amount": 64.1,
             "name": "  WHOLE FOODS  ", "iso_currency_code": "USD",
             "payment_meta": {"payment_method": null, "by_order_of": null}},
            {"transaction_id": "t3", "account_id": "a2", "date": "2024-01-03", "amount": -1500,
             "name": "Payroll", "iso_currency_code": "USD", "pending": true}
        ],
        "modified": [],
        "removed": [],
        "nextCursor": "cur1"
    }"#
}

/// Follow-up page: t3 posts, t2 is removed
fn second_page() -> &'static str {
    r#"{
        "itemId": "item1",
        "added": [],
        "modified": [
            {"transaction_id": "t3", "account_id": "a2", "date": "2024-01-03", "amount": -1500,
             "name": "Payroll", "iso_currency_code": "USD", "pending": false}
        ],
        "removed": [{"transaction_id": "t2"}, {"transaction_id": "gone-already"}],
        "nextCursor": "cur2"
    }"#
}

// =============================================================================
// Sync Workflow
// =============================================================================

#[test]
fn test_single_coffee_transaction() {
    let (_dir, db) = open_store();

    let batch: SyncBatch = serde_json::from_str(
        r#"{"itemId": "item1",
            "added": [{"transaction_id": "t1", "account_id": "a1", "date": "2024-01-01", "amount": 12.5, "name": "Coffee"}],
            "modified": [], "removed": [], "nextCursor": "cur1"}"#,
    )
    .unwrap();
    let result = db.apply_sync_batch(&batch).unwrap();
    assert_eq!(result.inserted_or_updated, 1);

    let expected = hex::encode(Sha256::digest(
        ["2024-01-01", "12.5", "", "coffee", ""]
            .join("\u{1f}")
            .as_bytes(),
    ));

    let stored = db.get_transaction("t1").unwrap().unwrap();
    assert_eq!(stored.content_hash.as_deref(), Some(expected.as_str()));
    assert_eq!(stored.fingerprint.as_deref(), Some("t1"));
    assert_eq!(db.count_transactions().unwrap(), 1);
    assert_eq!(
        db.get_transaction_sync_cursor("item1").unwrap(),
        Some("cur1".to_string())
    );
}

#[test]
fn test_full_sync_workflow() {
    let (_dir, db) = open_store();

    db.upsert_item("item1", "access-sandbox-0001", Some("ins_109508"))
        .expect("Failed to register item");

    // Fresh item: no cursor yet, sync starts from the beginning
    assert_eq!(db.get_transaction_sync_cursor("item1").unwrap(), None);

    let page: SyncBatch = serde_json::from_str(first_page()).unwrap();
    let result = db.apply_sync_batch(&page).unwrap();
    assert_eq!(result.inserted_or_updated, 3);
    assert_eq!(result.deleted, 0);
    assert!(result.skipped.is_empty());

    let t3 = db.get_transaction("t3").unwrap().unwrap();
    assert!(t3.pending);
    assert_eq!(t3.amount, -1500.0);

    // Resume from the stored cursor
    let cursor = db.get_transaction_sync_cursor("item1").unwrap();
    assert_eq!(cursor.as_deref(), Some("cur1"));

    let page: SyncBatch = serde_json::from_str(second_page()).unwrap();
    let result = db.apply_sync_batch(&page).unwrap();
    assert_eq!(result.inserted_or_updated, 1);
    assert_eq!(result.deleted, 1);

    assert!(!db.get_transaction("t3").unwrap().unwrap().pending);
    assert!(db.get_transaction("t2").unwrap().is_none());
    assert_eq!(db.count_transactions().unwrap(), 2);

    let state = db.get_sync_state("item1").unwrap().unwrap();
    assert_eq!(state.cursor, "cur2");
    assert!(!state.has_more);

    let snapshot = db.get_diagnostics_snapshot(None).unwrap();
    assert_eq!(snapshot.total_rows, 2);
    assert_eq!(snapshot.total_sync_state_rows, 1);
    assert_eq!(snapshot.sample_transactions.len(), 2);
    // Modified in the latest batch, so it is the most recent sample
    assert_eq!(snapshot.sample_transactions[0].transaction_id, "t3");
}

#[test]
fn test_replaying_a_batch_after_crash() {
    let (_dir, db) = open_store();
    let page: SyncBatch = serde_json::from_str(first_page()).unwrap();

    db.apply_sync_batch(&page).unwrap();
    let before: Vec<_> = ["t1", "t2", "t3"]
        .iter()
        .map(|id| db.get_transaction(id).unwrap().unwrap())
        .collect();

    // The caller did not see the commit and retries from the old cursor
    let replay = db.apply_sync_batch(&page).unwrap();
    assert_eq!(replay.inserted_or_updated, 3);
    assert_eq!(db.count_transactions().unwrap(), 3);

    for old in before {
        let new = db.get_transaction(&old.transaction_id).unwrap().unwrap();
        assert_eq!(old.content_hash, new.content_hash);
        assert_eq!(old.raw_json, new.raw_json);
        assert_eq!(old.amount, new.amount);
        assert_eq!(old.name, new.name);
    }
}

#[test]
fn test_relink_does_not_double_count() {
    let (_dir, db) = open_store();

    db.upsert_item("item1", "access-sandbox-0001", Some("ins_1"))
        .unwrap();
    db.apply_batch(
        "item1",
        &[serde_json::from_str(
            r#"{"transaction_id": "t1", "account_id": "a1", "date": "2024-01-01", "amount": 12.5, "name": "Coffee"}"#,
        )
        .unwrap()],
        &[],
        &[],
        Some("cur1"),
    )
    .unwrap();

    // Same login relinked: new item, new account and transaction ids
    db.upsert_item("item2", "access-sandbox-0002", Some("ins_1"))
        .unwrap();
    let result = db
        .apply_batch(
            "item2",
            &[serde_json::from_str(
                r#"{"transaction_id": "t2", "account_id": "a9", "date": "2024-01-01", "amount": 12.5, "name": "COFFEE "}"#,
            )
            .unwrap()],
            &[],
            &[],
            Some("item2-cur1"),
        )
        .unwrap();

    assert_eq!(result.inserted_or_updated, 0);
    assert_eq!(result.skipped_duplicates(), 1);
    assert_eq!(result.skipped[0].reason, SkipReason::ContentHash);
    assert_eq!(result.skipped[0].existing_transaction_id, "t1");

    assert_eq!(db.count_transactions().unwrap(), 1);
    let t1 = db.get_transaction("t1").unwrap().unwrap();
    assert_eq!(t1.item_id, "item1");

    // The new item is the one future syncs run against
    assert_eq!(
        db.get_latest_valid_item().unwrap(),
        Some(ItemCredential {
            item_id: "item2".to_string(),
            access_token: "access-sandbox-0002".to_string(),
        })
    );
    assert_eq!(
        db.get_transaction_sync_cursor("item2").unwrap(),
        Some("item2-cur1".to_string())
    );
}

#[test]
fn test_failed_batch_can_be_retried_from_held_cursor() {
    let (_dir, db) = open_store();
    let page: SyncBatch = serde_json::from_str(first_page()).unwrap();
    db.apply_sync_batch(&page).unwrap();

    let mut bad: SyncBatch = serde_json::from_str(second_page()).unwrap();
    bad.modified[0].set("date", "03/01/2024");
    assert!(db.apply_sync_batch(&bad).is_err());

    // Nothing from the failed batch landed
    assert_eq!(db.count_transactions().unwrap(), 3);
    assert_eq!(
        db.get_transaction_sync_cursor("item1").unwrap(),
        Some("cur1".to_string())
    );

    let good: SyncBatch = serde_json::from_str(second_page()).unwrap();
    db.apply_sync_batch(&good).unwrap();
    assert_eq!(db.count_transactions().unwrap(), 2);
    assert_eq!(
        db.get_transaction_sync_cursor("item1").unwrap(),
        Some("cur2".to_string())
    );
}

#[test]
fn test_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("plaid.db");

    {
        let db = Database::open(&path).unwrap();
        db.upsert_item("item1", "access-production-abc", None)
            .unwrap();
        let page: SyncBatch = serde_json::from_str(first_page()).unwrap();
        db.apply_sync_batch(&page).unwrap();
    }

    let db = Database::open(&path).unwrap();
    assert_eq!(db.count_transactions().unwrap(), 3);
    assert_eq!(
        db.get_item_id_by_access_token("access-production-abc")
            .unwrap(),
        Some("item1".to_string())
    );

    db.apply_batch(
        "item1",
        &[],
        &[],
        &[RemovedTransaction::new("t1")],
        Some("cur9"),
    )
    .unwrap();
    assert_eq!(db.count_transactions().unwrap(), 2);
}

// =============================================================================
// Inspection
// =============================================================================

#[test]
fn test_read_only_inspection() {
    let (_dir, db) = open_store();
    let page: SyncBatch = serde_json::from_str(first_page()).unwrap();
    db.apply_sync_batch(&page).unwrap();

    let tables = db.list_tables().unwrap();
    assert!(tables.contains(&"transactions".to_string()));

    let result = db
        .query(
            "SELECT item_id, COUNT(*) AS n FROM transactions GROUP BY item_id",
            10,
        )
        .unwrap();
    assert_eq!(result.columns, vec!["item_id", "n"]);
    assert_eq!(
        result.rows,
        vec![vec![serde_json::json!("item1"), serde_json::json!(3)]]
    );

    assert!(db.query("DROP TABLE transactions", 10).is_err());
    assert_eq!(db.count_transactions().unwrap(), 3);
}
