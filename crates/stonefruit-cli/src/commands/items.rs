//! Item registry commands (add, list, latest, lookup)

use std::sync::OnceLock;

use anyhow::{Context, Result};
use regex::Regex;
use stonefruit_core::{Database, ItemCredential};

/// Hide all but the environment prefix and the last four characters of a token
pub fn mask_token(token: &str) -> String {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let re = PATTERN.get_or_init(|| {
        Regex::new(r"^(access-[A-Za-z0-9_]+-)[A-Za-z0-9_-]*([A-Za-z0-9_-]{4})$")
            .expect("valid regex")
    });

    match re.captures(token) {
        Some(caps) => format!("{}****{}", &caps[1], &caps[2]),
        None => "****".to_string(),
    }
}

pub fn cmd_items_add(
    db: &Database,
    item_id: &str,
    access_token: &str,
    institution_id: Option<&str>,
) -> Result<()> {
    db.upsert_item(item_id, access_token, institution_id)
        .context("Failed to save item")?;

    println!("✅ Saved item {} ({})", item_id, mask_token(access_token));
    if !stonefruit_core::db::is_live_access_token(access_token) {
        println!("   ⚠️  Token does not look like an access token; `items latest --valid` will skip it");
    }
    Ok(())
}

pub fn cmd_items_list(db: &Database) -> Result<()> {
    let items = db.list_items()?;

    if items.is_empty() {
        println!("No items found. Register one with:");
        println!("  stonefruit items add --item-id ID --access-token TOKEN");
        return Ok(());
    }

    println!();
    println!("🔗 Items");
    println!("   ─────────────────────────────────────────────────────────────");

    for item in items {
        println!(
            "   {} │ {} │ {} │ updated {}",
            item.item_id,
            mask_token(&item.access_token),
            item.institution_id.as_deref().unwrap_or("-"),
            item.updated_at.format("%Y-%m-%d %H:%M:%S")
        );
    }

    Ok(())
}

pub fn cmd_items_latest(db: &Database, valid: bool) -> Result<()> {
    let latest = if valid {
        db.get_latest_valid_item()?
    } else {
        db.get_latest_item()?
    };

    match latest {
        Some(ItemCredential {
            item_id,
            access_token,
        }) => println!("{} ({})", item_id, mask_token(&access_token)),
        None => println!("No items found."),
    }

    Ok(())
}

pub fn cmd_items_lookup(db: &Database, access_token: &str) -> Result<()> {
    match db.get_item_id_by_access_token(access_token)? {
        Some(item_id) => println!("{}", item_id),
        None => println!("No item found for that access token."),
    }
    Ok(())
}
