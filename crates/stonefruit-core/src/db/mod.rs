//! Database access layer with open-per-call connections and schema management
//!
//! This module is organized by domain:
//! - `schema` - Additive, idempotent schema creation and upgrades
//! - `items` - Linked item registry (access tokens, institutions)
//! - `sync` - Atomic application of added/modified/removed batches
//! - `diagnostics` - Sync cursors, stored rows and diagnostics snapshots
//! - `inspect` - Read-only table listing and ad-hoc queries
//!
//! There is no pool. Every public operation opens its own connection through
//! [`Database::conn`] and drops it before returning, on success or error.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::Connection;
use tracing::debug;

use crate::config::StoreConfig;
use crate::error::{Error, Result};

mod diagnostics;
mod inspect;
mod items;
mod schema;
mod sync;

pub use diagnostics::clamp_sample_size;
pub use inspect::{QueryResult, TableSchema};
pub use items::is_live_access_token;
pub use schema::{ITEMS_TABLE, SYNC_STATE_TABLE, TRANSACTIONS_TABLE};

/// Derive an encryption key from a passphrase using Argon2
///
/// Uses a fixed application salt so the same passphrase always produces the same key,
/// regardless of database path.
fn derive_key(passphrase: &str) -> Result<String> {
    use argon2::{password_hash::SaltString, Argon2, PasswordHasher};

    // Changing this invalidates every existing encrypted database
    const APP_SALT: &[u8; 16] = b"stonefruit-salt1";

    let salt = SaltString::encode_b64(APP_SALT)
        .map_err(|e| Error::Encryption(format!("Failed to create salt: {}", e)))?;

    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(passphrase.as_bytes(), &salt)
        .map_err(|e| Error::Encryption(format!("Failed to derive key: {}", e)))?;

    let hash_str = hash
        .hash
        .ok_or_else(|| Error::Encryption("No hash output".to_string()))?;
    Ok(hex::encode(hash_str.as_bytes()))
}

/// Current time in the stored timestamp format (UTC, microseconds)
pub(crate) fn now_timestamp() -> String {
    Utc::now().format("%Y-%m-%d %H:%M:%S%.6f").to_string()
}

/// Parse a stored timestamp into a DateTime<Utc>
pub(crate) fn parse_datetime(s: &str) -> DateTime<Utc> {
    // Written as "YYYY-MM-DD HH:MM:SS.ffffff"; CURRENT_TIMESTAMP defaults have no fraction
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .map(|dt| dt.and_utc())
        .unwrap_or_else(|_| Utc::now())
}

/// Parse a stored calendar date
pub(crate) fn parse_date(s: &str) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn storage_unavailable(path: &Path, err: impl std::fmt::Display) -> Error {
    Error::StorageUnavailable(format!("{}: {}", path.display(), err))
}

/// Handle to the transaction store
///
/// Cheap to clone; holds only configuration and the derived key.
#[derive(Clone)]
pub struct Database {
    config: StoreConfig,
    /// `PRAGMA key` statement, present when a passphrase was configured
    key_pragma: Option<String>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("db_path", &self.config.db_path)
            .field("encrypted", &self.key_pragma.is_some())
            .finish()
    }
}

impl Database {
    /// Create a store handle and make sure the file and schema exist
    ///
    /// Fails with `StorageUnavailable` if the file cannot be created or opened,
    /// or if the passphrase does not match an existing encrypted database.
    pub fn new(config: StoreConfig) -> Result<Self> {
        let key_pragma = match config.passphrase.as_deref() {
            Some(pass) => {
                let key = derive_key(pass)?;
                Some(format!("PRAGMA key = 'x\"{}\"';", key))
            }
            None => None,
        };

        let db = Self { config, key_pragma };
        // Open once up front so configuration errors surface here
        drop(db.conn()?);

        Ok(db)
    }

    /// Create an unencrypted store at `path` with default settings
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::new(StoreConfig::new(path.as_ref()))
    }

    /// Get the path to the database file
    pub fn path(&self) -> &Path {
        &self.config.db_path
    }

    /// Open a fresh connection with pragmas applied and the schema ensured
    ///
    /// The returned connection is owned by the caller and closed when dropped.
    pub fn conn(&self) -> Result<Connection> {
        let path = self.config.db_path.as_path();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| storage_unavailable(parent, e))?;
        }

        let mut conn = Connection::open(path).map_err(|e| storage_unavailable(path, e))?;

        if let Some(key_pragma) = &self.key_pragma {
            conn.execute_batch(key_pragma)
                .map_err(|e| storage_unavailable(path, e))?;
        }

        conn.busy_timeout(Duration::from_millis(self.config.busy_timeout_ms))?;

        // First read of the file: fails on a wrong key or a corrupt file
        conn.query_row("SELECT COUNT(*) FROM sqlite_master", [], |row| {
            row.get::<_, i64>(0)
        })
        .map_err(|e| storage_unavailable(path, e))?;

        conn.execute_batch(
            r#"
            -- Items and sync state reference each other by id only
            PRAGMA foreign_keys = OFF;

            -- WAL mode: readers are not blocked by a concurrent batch commit
            PRAGMA journal_mode = WAL;

            PRAGMA synchronous = NORMAL;
            "#,
        )?;

        schema::ensure_schema(&mut conn)?;

        debug!(path = %path.display(), "Opened store connection");
        Ok(conn)
    }

    /// Check if the database is encrypted
    pub fn is_encrypted(&self) -> Result<bool> {
        if self.key_pragma.is_none() {
            return Ok(false);
        }
        let conn = self.conn()?;
        // SQLCipher sets cipher_version if encryption is active
        let result: rusqlite::Result<String> =
            conn.query_row("PRAGMA cipher_version;", [], |row| row.get(0));
        Ok(result.is_ok())
    }
}
