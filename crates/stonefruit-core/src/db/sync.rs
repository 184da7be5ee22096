//! Sync batch processing
//!
//! A batch (added, modified, removed, next cursor) is applied inside a single
//! SQLite transaction in that fixed order. Any failure rolls the whole batch
//! back, so the caller can retry from the cursor it already held.

use rusqlite::{params, OptionalExtension, Transaction, TransactionBehavior};
use tracing::{debug, info, warn};

use super::{now_timestamp, Database};
use crate::error::{Error, Result};
use crate::models::{
    BatchResult, NormalizedTransaction, RawTransaction, RemovedTransaction, SkippedTransaction,
    SyncBatch,
};
use crate::normalize::{decide, normalize, DedupDecision};

const UPSERT_TRANSACTION_SQL: &str = r#"
    INSERT INTO transactions (
        transaction_id, account_id, item_id, pending, pending_transaction_id,
        authorized_date, date, amount, iso_currency_code, name,
        personal_finance_category_json, location_json, payment_meta_json, raw_json,
        fingerprint, content_hash, updated_at
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
    ON CONFLICT(transaction_id) DO UPDATE SET
        account_id = excluded.account_id,
        pending = excluded.pending,
        pending_transaction_id = excluded.pending_transaction_id,
        authorized_date = excluded.authorized_date,
        date = excluded.date,
        amount = excluded.amount,
        iso_currency_code = excluded.iso_currency_code,
        name = excluded.name,
        personal_finance_category_json = excluded.personal_finance_category_json,
        location_json = excluded.location_json,
        payment_meta_json = excluded.payment_meta_json,
        raw_json = excluded.raw_json,
        fingerprint = excluded.fingerprint,
        content_hash = excluded.content_hash,
        updated_at = excluded.updated_at
"#;

impl Database {
    /// Apply a deserialized sync batch
    pub fn apply_sync_batch(&self, batch: &SyncBatch) -> Result<BatchResult> {
        self.apply_batch(
            &batch.item_id,
            &batch.added,
            &batch.modified,
            &batch.removed,
            batch.next_cursor.as_deref(),
        )
    }

    /// Apply added/modified/removed records and store the next cursor atomically
    ///
    /// Added records go through the duplicate check (fingerprint, then content
    /// hash); modified records are upserted by id unconditionally. The stored
    /// `item_id` of an existing row is never changed.
    pub fn apply_batch(
        &self,
        item_id: &str,
        added: &[RawTransaction],
        modified: &[RawTransaction],
        removed: &[RemovedTransaction],
        next_cursor: Option<&str>,
    ) -> Result<BatchResult> {
        if item_id.trim().is_empty() {
            return Err(Error::InvalidArgument(
                "apply_batch requires item_id".to_string(),
            ));
        }

        // Normalize everything first so a malformed record fails before any write
        let added = added
            .iter()
            .map(|raw| normalize(raw, item_id))
            .collect::<Result<Vec<_>>>()?;
        let modified = modified
            .iter()
            .map(|raw| normalize(raw, item_id))
            .collect::<Result<Vec<_>>>()?;
        let cursor = next_cursor.unwrap_or_default();
        if cursor.is_empty() {
            warn!(item_id, "Batch has no next cursor; the next sync restarts from the beginning");
        }

        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let now = now_timestamp();
        let mut result = BatchResult::default();

        for row in &added {
            match check_duplicate(&tx, row)? {
                DedupDecision::Upsert => {
                    result.inserted_or_updated += upsert_transaction(&tx, row, &now)?;
                }
                DedupDecision::Skip {
                    existing_transaction_id,
                    reason,
                } => {
                    debug!(
                        transaction_id = %row.transaction_id,
                        existing = %existing_transaction_id,
                        %reason,
                        "Skipped duplicate transaction"
                    );
                    result.skipped.push(SkippedTransaction {
                        transaction_id: row.transaction_id.clone(),
                        existing_transaction_id,
                        reason,
                    });
                }
            }
        }

        for row in &modified {
            result.inserted_or_updated += upsert_transaction(&tx, row, &now)?;
        }

        for r in removed {
            result.deleted += tx.execute(
                "DELETE FROM transactions WHERE transaction_id = ?",
                params![r.transaction_id],
            )?;
        }

        tx.execute(
            r#"
            INSERT INTO transaction_sync_state (item_id, cursor, has_more, last_sync_ts)
            VALUES (?1, ?2, 0, ?3)
            ON CONFLICT(item_id) DO UPDATE SET
                cursor = excluded.cursor,
                has_more = 0,
                last_sync_ts = excluded.last_sync_ts
            "#,
            params![item_id, cursor, now],
        )?;

        // Counted before commit so nothing can fail once the batch is durable
        result.total_rows =
            tx.query_row("SELECT COUNT(*) FROM transactions", [], |row| row.get(0))?;

        tx.commit()?;

        info!(
            db_path = %self.path().display(),
            item_id,
            added = added.len(),
            modified = modified.len(),
            removed = removed.len(),
            inserted_or_updated = result.inserted_or_updated,
            deleted = result.deleted,
            skipped_duplicates = result.skipped_duplicates(),
            total_rows = result.total_rows,
            next_cursor = cursor,
            "Sync batch committed"
        );

        Ok(result)
    }
}

/// Run the fingerprint and content-hash lookups for an added row
fn check_duplicate(tx: &Transaction<'_>, row: &NormalizedTransaction) -> Result<DedupDecision> {
    let fingerprint_owner: Option<String> = tx
        .prepare_cached("SELECT transaction_id FROM transactions WHERE fingerprint = ? LIMIT 1")?
        .query_row(params![row.fingerprint], |r| r.get(0))
        .optional()?;

    let content_match: Option<String> = tx
        .prepare_cached(
            r#"
            SELECT transaction_id FROM transactions
            WHERE content_hash = ?1 AND transaction_id != ?2
            LIMIT 1
            "#,
        )?
        .query_row(params![row.content_hash, row.transaction_id], |r| r.get(0))
        .optional()?;

    Ok(decide(
        &row.transaction_id,
        fingerprint_owner.as_deref(),
        content_match.as_deref(),
    ))
}

/// Insert or update by `transaction_id`; returns rows affected
fn upsert_transaction(
    tx: &Transaction<'_>,
    row: &NormalizedTransaction,
    now: &str,
) -> Result<usize> {
    let changed = tx.prepare_cached(UPSERT_TRANSACTION_SQL)?.execute(params![
        row.transaction_id,
        row.account_id,
        row.item_id,
        row.pending,
        row.pending_transaction_id,
        row.authorized_date.map(|d| d.to_string()),
        row.date.to_string(),
        row.amount,
        row.iso_currency_code,
        row.name,
        row.personal_finance_category_json,
        row.location_json,
        row.payment_meta_json,
        row.raw_json,
        row.fingerprint,
        row.content_hash,
        now,
    ])?;
    Ok(changed)
}
