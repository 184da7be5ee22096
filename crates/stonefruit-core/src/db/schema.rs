//! Schema creation and additive upgrades
//!
//! Runs on every connection open. A read-only probe decides whether anything
//! is missing; only then is a write lock taken and the schema applied inside
//! a `BEGIN IMMEDIATE` transaction, so concurrent openers serialise and each
//! column is added at most once. Nothing is ever dropped or rewritten.

use rusqlite::{params, Connection, TransactionBehavior};
use tracing::info;

use crate::error::Result;

pub const ITEMS_TABLE: &str = "items";
pub const TRANSACTIONS_TABLE: &str = "transactions";
pub const SYNC_STATE_TABLE: &str = "transaction_sync_state";

const BASE_SCHEMA: &str = r#"
    -- Linked items (one per institution login)
    CREATE TABLE IF NOT EXISTS items (
        item_id TEXT PRIMARY KEY,
        access_token TEXT NOT NULL,
        institution_id TEXT,
        created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
        updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
    );

    CREATE INDEX IF NOT EXISTS idx_items_updated_at ON items(updated_at);

    -- Transactions
    CREATE TABLE IF NOT EXISTS transactions (
        transaction_id TEXT PRIMARY KEY,
        account_id TEXT NOT NULL,
        item_id TEXT NOT NULL,                  -- set on first insert only
        pending INTEGER NOT NULL DEFAULT 0,
        pending_transaction_id TEXT,
        authorized_date DATE,
        date DATE NOT NULL,
        amount REAL NOT NULL,
        iso_currency_code TEXT,
        name TEXT,
        personal_finance_category_json TEXT,
        location_json TEXT,
        payment_meta_json TEXT,
        raw_json TEXT NOT NULL,                 -- verbatim upstream record
        fingerprint TEXT,
        content_hash TEXT,
        updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
    );

    CREATE INDEX IF NOT EXISTS idx_transactions_item_id ON transactions(item_id);
    CREATE INDEX IF NOT EXISTS idx_transactions_updated_at ON transactions(updated_at);

    -- One resumption cursor per item
    CREATE TABLE IF NOT EXISTS transaction_sync_state (
        item_id TEXT PRIMARY KEY,
        cursor TEXT NOT NULL DEFAULT '',
        has_more INTEGER NOT NULL DEFAULT 0,
        last_sync_ts DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
    );

    CREATE INDEX IF NOT EXISTS idx_sync_state_last_sync_ts ON transaction_sync_state(last_sync_ts);
"#;

/// Columns introduced after the first release of the transactions table
const ADDED_COLUMNS: &[(&str, &str, &str)] = &[
    (TRANSACTIONS_TABLE, "fingerprint", "TEXT"),
    (TRANSACTIONS_TABLE, "content_hash", "TEXT"),
];

/// Indexes over added columns; must run after the columns exist
const DEDUP_INDEXES: &str = r#"
    CREATE UNIQUE INDEX IF NOT EXISTS idx_transactions_fingerprint ON transactions(fingerprint);
    CREATE INDEX IF NOT EXISTS idx_transactions_content_hash ON transactions(content_hash);
"#;

/// Every table and index the schema defines
const EXPECTED_OBJECTS: &[&str] = &[
    ITEMS_TABLE,
    TRANSACTIONS_TABLE,
    SYNC_STATE_TABLE,
    "idx_items_updated_at",
    "idx_transactions_item_id",
    "idx_transactions_updated_at",
    "idx_transactions_fingerprint",
    "idx_transactions_content_hash",
    "idx_sync_state_last_sync_ts",
];

/// Create missing tables, columns and indexes
pub(crate) fn ensure_schema(conn: &mut Connection) -> Result<()> {
    if is_current(conn)? {
        return Ok(());
    }

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    tx.execute_batch(BASE_SCHEMA)?;

    for (table, column, decl) in ADDED_COLUMNS {
        // Re-checked under the write lock; another process may have added it
        if !has_column(&tx, table, column)? {
            tx.execute(
                &format!("ALTER TABLE {} ADD COLUMN {} {}", table, column, decl),
                [],
            )?;
            info!(table, column, "Added column");
        }
    }

    let backfilled = tx.execute(
        "UPDATE transactions SET fingerprint = transaction_id WHERE fingerprint IS NULL",
        [],
    )?;
    if backfilled > 0 {
        info!(rows = backfilled, "Backfilled transaction fingerprints");
    }

    tx.execute_batch(DEDUP_INDEXES)?;
    tx.commit()?;

    info!("Database schema initialized");
    Ok(())
}

/// Whether every expected table, index and column is already present
fn is_current(conn: &Connection) -> Result<bool> {
    let placeholders = vec!["?"; EXPECTED_OBJECTS.len()].join(", ");
    let present: i64 = conn.query_row(
        &format!(
            "SELECT COUNT(*) FROM sqlite_master WHERE name IN ({})",
            placeholders
        ),
        rusqlite::params_from_iter(EXPECTED_OBJECTS.iter()),
        |row| row.get(0),
    )?;
    if present != EXPECTED_OBJECTS.len() as i64 {
        return Ok(false);
    }

    for (table, column, _) in ADDED_COLUMNS {
        if !has_column(conn, table, column)? {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Check the live column list of `table`
pub(crate) fn has_column(conn: &Connection, table: &str, column: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM pragma_table_info(?1) WHERE name = ?2",
        params![table, column],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}
