//! Stonefruit CLI - Transaction sync store
//!
//! Usage:
//!   stonefruit init                          Initialize database
//!   stonefruit items add --item-id ID ...    Register an item
//!   stonefruit sync apply --file batch.json  Apply a sync batch
//!   stonefruit status                        Show diagnostics

mod cli;
mod commands;


use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    let config = commands::resolve_config(cli.db.as_deref(), cli.config.as_deref())?;

    match cli.command {
        Commands::Init => commands::cmd_init(&config),
        Commands::Items { action } => {
            let db = commands::open_db(&config)?;
            match action {
                ItemsAction::Add {
                    item_id,
                    access_token,
                    institution_id,
                } => commands::cmd_items_add(
                    &db,
                    &item_id,
                    &access_token,
                    institution_id.as_deref(),
                ),
                ItemsAction::List => commands::cmd_items_list(&db),
                ItemsAction::Latest { valid } => commands::cmd_items_latest(&db, valid),
                ItemsAction::Lookup { access_token } => {
                    commands::cmd_items_lookup(&db, &access_token)
                }
            }
        }
        Commands::Sync { action } => {
            let db = commands::open_db(&config)?;
            match action {
                SyncAction::Apply { file } => commands::cmd_sync_apply(&db, &file),
                SyncAction::Cursor { item_id } => commands::cmd_sync_cursor(&db, &item_id),
            }
        }
        Commands::Status { sample, json } => {
            let db = commands::open_db(&config)?;
            commands::cmd_status(&db, sample, json)
        }
        Commands::Db { action } => {
            let db = commands::open_db(&config)?;
            match action {
                DbAction::Tables { json } => commands::cmd_db_tables(&db, json),
                DbAction::Schema { table, json } => {
                    commands::cmd_db_schema(&db, table.as_deref(), json)
                }
                DbAction::Query { sql, limit, json } => {
                    commands::cmd_db_query(&db, &sql, limit, json)
                }
            }
        }
    }
}
