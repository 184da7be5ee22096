//! Sync batch commands (apply, cursor)

use std::path::Path;

use anyhow::{Context, Result};
use stonefruit_core::{Database, SyncBatch};

/// Read and deserialize a batch file
pub fn read_batch(path: &Path) -> Result<SyncBatch> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse sync batch in {}", path.display()))
}

pub fn cmd_sync_apply(db: &Database, path: &Path) -> Result<()> {
    let batch = read_batch(path)?;

    println!(
        "📥 Applying batch for {} ({} added, {} modified, {} removed)...",
        batch.item_id,
        batch.added.len(),
        batch.modified.len(),
        batch.removed.len()
    );

    let result = db
        .apply_sync_batch(&batch)
        .context("Batch rolled back; retry from the previous cursor")?;

    println!("   Inserted/updated: {}", result.inserted_or_updated);
    println!("   Deleted: {}", result.deleted);
    if !result.skipped.is_empty() {
        println!("   Skipped duplicates: {}", result.skipped_duplicates());
        for skip in &result.skipped {
            println!(
                "      {} → {} ({})",
                skip.transaction_id, skip.existing_transaction_id, skip.reason
            );
        }
    }
    println!("   Total stored: {}", result.total_rows);
    println!(
        "✅ Cursor saved: {}",
        batch.next_cursor.as_deref().unwrap_or("(empty)")
    );

    Ok(())
}

pub fn cmd_sync_cursor(db: &Database, item_id: &str) -> Result<()> {
    match db.get_transaction_sync_cursor(item_id)? {
        Some(cursor) if cursor.is_empty() => println!("(empty cursor: sync from the beginning)"),
        Some(cursor) => println!("{}", cursor),
        None => println!("No cursor stored for {}", item_id),
    }
    Ok(())
}
