//! Sync cursors and read-only inspection of stored state

use rusqlite::{params, OptionalExtension, Row};

use super::{parse_date, parse_datetime, Database};
use crate::config::DEFAULT_SAMPLE_SIZE;
use crate::error::Result;
use crate::models::{DiagnosticsSnapshot, StoredTransaction, SyncState, TransactionSample};

/// Positive sizes pass through; anything else falls back to the default
pub fn clamp_sample_size(sample_size: Option<i64>) -> usize {
    match sample_size {
        Some(n) if n > 0 => n as usize,
        _ => DEFAULT_SAMPLE_SIZE,
    }
}

impl Database {
    /// Stored cursor for `item_id`, the point to resume the upstream sync from
    pub fn get_transaction_sync_cursor(&self, item_id: &str) -> Result<Option<String>> {
        if item_id.is_empty() {
            return Ok(None);
        }

        let conn = self.conn()?;
        let cursor = conn
            .query_row(
                "SELECT cursor FROM transaction_sync_state WHERE item_id = ?",
                params![item_id],
                |row| row.get(0),
            )
            .optional()?;

        Ok(cursor)
    }

    /// Full sync state row for `item_id`
    pub fn get_sync_state(&self, item_id: &str) -> Result<Option<SyncState>> {
        let conn = self.conn()?;
        let state = conn
            .query_row(
                r#"
                SELECT item_id, cursor, has_more, last_sync_ts
                FROM transaction_sync_state WHERE item_id = ?
                "#,
                params![item_id],
                Self::row_to_sync_state,
            )
            .optional()?;

        Ok(state)
    }

    /// Get a stored transaction by upstream id
    pub fn get_transaction(&self, transaction_id: &str) -> Result<Option<StoredTransaction>> {
        let conn = self.conn()?;
        let tx = conn
            .query_row(
                r#"
                SELECT transaction_id, account_id, item_id, pending, pending_transaction_id,
                       authorized_date, date, amount, iso_currency_code, name,
                       personal_finance_category_json, location_json, payment_meta_json,
                       raw_json, fingerprint, content_hash, updated_at
                FROM transactions WHERE transaction_id = ?
                "#,
                params![transaction_id],
                |row| {
                    let authorized_date: Option<String> = row.get(5)?;
                    let date: String = row.get(6)?;
                    let updated_at: String = row.get(16)?;
                    Ok(StoredTransaction {
                        transaction_id: row.get(0)?,
                        account_id: row.get(1)?,
                        item_id: row.get(2)?,
                        pending: row.get(3)?,
                        pending_transaction_id: row.get(4)?,
                        authorized_date: authorized_date.as_deref().map(parse_date).transpose()?,
                        date: parse_date(&date)?,
                        amount: row.get(7)?,
                        iso_currency_code: row.get(8)?,
                        name: row.get(9)?,
                        personal_finance_category_json: row.get(10)?,
                        location_json: row.get(11)?,
                        payment_meta_json: row.get(12)?,
                        raw_json: row.get(13)?,
                        fingerprint: row.get(14)?,
                        content_hash: row.get(15)?,
                        updated_at: parse_datetime(&updated_at),
                    })
                },
            )
            .optional()?;

        Ok(tx)
    }

    /// Total number of stored transactions
    pub fn count_transactions(&self) -> Result<i64> {
        let conn = self.conn()?;
        let count = conn.query_row("SELECT COUNT(*) FROM transactions", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Counts plus the most recently updated transactions and sync states
    pub fn get_diagnostics_snapshot(&self, sample_size: Option<i64>) -> Result<DiagnosticsSnapshot> {
        let limit = clamp_sample_size(sample_size) as i64;
        let conn = self.conn()?;

        let total_rows: i64 =
            conn.query_row("SELECT COUNT(*) FROM transactions", [], |row| row.get(0))?;
        let total_sync_state_rows: i64 =
            conn.query_row("SELECT COUNT(*) FROM transaction_sync_state", [], |row| {
                row.get(0)
            })?;

        let mut stmt = conn.prepare(
            r#"
            SELECT transaction_id, account_id, item_id, date, amount, name, updated_at
            FROM transactions
            ORDER BY updated_at DESC, rowid DESC
            LIMIT ?
            "#,
        )?;
        let sample_transactions = stmt
            .query_map(params![limit], |row| {
                let date: String = row.get(3)?;
                let updated_at: String = row.get(6)?;
                Ok(TransactionSample {
                    transaction_id: row.get(0)?,
                    account_id: row.get(1)?,
                    item_id: row.get(2)?,
                    date: parse_date(&date)?,
                    amount: row.get(4)?,
                    name: row.get(5)?,
                    updated_at: parse_datetime(&updated_at),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT item_id, cursor, has_more, last_sync_ts
            FROM transaction_sync_state
            ORDER BY last_sync_ts DESC, rowid DESC
            LIMIT ?
            "#,
        )?;
        let sync_states = stmt
            .query_map(params![limit], Self::row_to_sync_state)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(DiagnosticsSnapshot {
            db_path: self.path().display().to_string(),
            total_rows,
            total_sync_state_rows,
            sample_transactions,
            sync_states,
        })
    }

    fn row_to_sync_state(row: &Row<'_>) -> rusqlite::Result<SyncState> {
        let last_sync_ts: String = row.get(3)?;
        Ok(SyncState {
            item_id: row.get(0)?,
            cursor: row.get(1)?,
            has_more: row.get(2)?,
            last_sync_ts: parse_datetime(&last_sync_ts),
        })
    }
}
