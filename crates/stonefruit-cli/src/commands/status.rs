//! Status command implementation

use anyhow::Result;
use stonefruit_core::Database;

use super::truncate;

pub fn cmd_status(db: &Database, sample: Option<i64>, json: bool) -> Result<()> {
    let snapshot = db.get_diagnostics_snapshot(sample)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(());
    }

    println!();
    println!("📊 Stonefruit Status");
    println!("   ─────────────────────────────────────────────────────────────");
    println!("   Database: {}", snapshot.db_path);

    if let Ok(metadata) = std::fs::metadata(db.path()) {
        let size_kb = metadata.len() as f64 / 1024.0;
        if size_kb < 1024.0 {
            println!("   Size: {:.1} KB", size_kb);
        } else {
            println!("   Size: {:.1} MB", size_kb / 1024.0);
        }
    }

    if db.is_encrypted()? {
        println!("   🔒 Encryption: ENABLED");
    } else {
        println!("   Encryption: disabled");
    }

    println!();
    println!("   Transactions: {}", snapshot.total_rows);
    println!("   Sync states: {}", snapshot.total_sync_state_rows);

    if !snapshot.sample_transactions.is_empty() {
        println!();
        println!("📝 Recent Transactions");
        for tx in &snapshot.sample_transactions {
            println!(
                "   {} │ {:>10.2} │ {} │ {}",
                tx.date,
                tx.amount,
                truncate(tx.name.as_deref().unwrap_or(""), 30),
                tx.item_id
            );
        }
    }

    if !snapshot.sync_states.is_empty() {
        println!();
        println!("🔄 Sync States");
        for state in &snapshot.sync_states {
            println!(
                "   {} │ {} │ {}",
                state.item_id,
                truncate(&state.cursor, 24),
                state.last_sync_ts.format("%Y-%m-%d %H:%M:%S")
            );
        }
    }

    println!();
    Ok(())
}
