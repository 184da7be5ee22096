//! Core command implementations and shared utilities
//!
//! This module contains:
//! - `resolve_config` - Build the store config from flags, environment and config file
//! - `open_db` - Shared utility to open the database
//! - `cmd_init` - Initialize the database

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use stonefruit_core::config::{DB_KEY_ENV, DB_PATH_ENV};
use stonefruit_core::{Database, StoreConfig};
use tracing::debug;

/// Resolve the store config from CLI flags and the process environment
pub fn resolve_config(db: Option<&Path>, config_file: Option<&Path>) -> Result<StoreConfig> {
    resolve_config_from(
        db,
        config_file,
        std::env::var(DB_PATH_ENV).ok(),
        std::env::var(DB_KEY_ENV).ok(),
    )
}

/// Path precedence: --db > SQLITE_DB_PATH > config file > default
pub fn resolve_config_from(
    db: Option<&Path>,
    config_file: Option<&Path>,
    env_path: Option<String>,
    passphrase: Option<String>,
) -> Result<StoreConfig> {
    let mut config = match config_file {
        Some(path) => StoreConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => StoreConfig::default(),
    };

    if let Some(path) = db {
        config.db_path = path.to_path_buf();
    } else if let Some(path) = env_path.filter(|p| !p.is_empty()) {
        config.db_path = PathBuf::from(path);
    }

    config.passphrase = passphrase.filter(|p| !p.is_empty());

    debug!(
        db_path = %config.db_path.display(),
        encrypted = config.passphrase.is_some(),
        "Resolved store config"
    );
    Ok(config)
}

/// Open the database, encrypted if a passphrase was resolved
pub fn open_db(config: &StoreConfig) -> Result<Database> {
    Database::new(config.clone())
        .with_context(|| format!("Failed to open database at {}", config.db_path.display()))
}

pub fn cmd_init(config: &StoreConfig) -> Result<()> {
    println!(
        "🔧 Initializing database at {}...",
        config.db_path.display()
    );

    let db = open_db(config)?;
    let tables = db.list_tables().context("Failed to read schema")?;
    println!("   Tables: {}", tables.join(", "));

    if db.is_encrypted()? {
        println!("   🔒 Encryption: ENABLED");
    } else {
        println!("   ⚠️  Encryption: DISABLED (set {} to enable)", DB_KEY_ENV);
    }

    println!("✅ Database initialized successfully!");
    println!();
    println!("Next steps:");
    println!("  1. Register an item: stonefruit items add --item-id ID --access-token TOKEN");
    println!("  2. Apply a batch:    stonefruit sync apply --file batch.json");

    Ok(())
}
