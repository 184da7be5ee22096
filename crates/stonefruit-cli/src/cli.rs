//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Stonefruit - Transaction sync store
#[derive(Parser)]
#[command(name = "stonefruit")]
#[command(about = "Persist and deduplicate incrementally synced bank transactions", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Database path
    ///
    /// Takes precedence over SQLITE_DB_PATH and the config file.
    /// Defaults to data-layer/raw/plaid.db.
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// TOML config file (db_path, busy_timeout_ms)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the database (creates file and schema)
    ///
    /// Set STONEFRUIT_DB_KEY to create an encrypted database.
    Init,

    /// Manage linked items
    Items {
        #[command(subcommand)]
        action: ItemsAction,
    },

    /// Apply sync batches and read cursors
    Sync {
        #[command(subcommand)]
        action: SyncAction,
    },

    /// Show row counts and recent transactions
    Status {
        /// Number of recent transactions and sync states to show
        #[arg(short, long)]
        sample: Option<i64>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Inspect the database (read-only)
    Db {
        #[command(subcommand)]
        action: DbAction,
    },
}

#[derive(Subcommand)]
pub enum ItemsAction {
    /// Register or update an item's access token
    Add {
        /// Item id
        #[arg(long)]
        item_id: String,

        /// Access token from the link exchange
        #[arg(long)]
        access_token: String,

        /// Institution id
        #[arg(long)]
        institution_id: Option<String>,
    },

    /// List all items (tokens are masked)
    List,

    /// Show the most recently updated item
    Latest {
        /// Only consider well-formed access tokens
        #[arg(long)]
        valid: bool,
    },

    /// Find the item for an access token
    Lookup {
        /// Access token to look up
        #[arg(long)]
        access_token: String,
    },
}

#[derive(Subcommand)]
pub enum SyncAction {
    /// Apply a batch file ({itemId, added, modified, removed, nextCursor})
    Apply {
        /// JSON batch file
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Show the stored cursor for an item
    Cursor {
        /// Item id
        #[arg(long)]
        item_id: String,
    },
}

#[derive(Subcommand)]
pub enum DbAction {
    /// List tables
    Tables {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show CREATE statements
    Schema {
        /// Table name (all tables if omitted)
        table: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run a read-only SQL query
    Query {
        /// SQL statement
        sql: String,

        /// Maximum rows to return
        #[arg(short, long, default_value = "50")]
        limit: usize,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}
