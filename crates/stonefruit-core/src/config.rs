//! Store configuration
//!
//! The store never reads the environment itself. Callers (the CLI) resolve
//! paths and passphrases and hand a `StoreConfig` to [`crate::Database::new`].
//!
//! Example config file:
//!
//! ```toml
//! db_path = "data-layer/raw/plaid.db"
//! busy_timeout_ms = 5000
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::Result;

/// Default database location, relative to the working directory
pub const DEFAULT_DB_PATH: &str = "data-layer/raw/plaid.db";

/// Environment variable overriding the database path
pub const DB_PATH_ENV: &str = "SQLITE_DB_PATH";

/// Environment variable holding the encryption passphrase
pub const DB_KEY_ENV: &str = "STONEFRUIT_DB_KEY";

/// How long a connection waits on a locked database before failing
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;

/// Sample size used by diagnostics when the requested one is not positive
pub const DEFAULT_SAMPLE_SIZE: usize = 5;

/// Configuration for opening the transaction store
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Path to the SQLite database file (parent directories are created)
    pub db_path: PathBuf,

    /// SQLCipher passphrase; never loaded from a config file
    #[serde(skip)]
    pub passphrase: Option<String>,

    pub busy_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            passphrase: None,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

impl StoreConfig {
    /// Unencrypted store at `path` with default settings
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: path.into(),
            ..Self::default()
        }
    }

    /// Set the encryption passphrase
    pub fn with_passphrase(mut self, passphrase: impl Into<String>) -> Self {
        self.passphrase = Some(passphrase.into());
        self
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }
}
