//! Stonefruit Core Library
//!
//! Persistence for incrementally synced bank transactions:
//! - Embedded SQLite store with additive, idempotent schema upgrades
//! - Item registry mapping linked items to access tokens
//! - Normalization of upstream records and two-tier duplicate detection
//!   (upstream id fingerprint plus content hash that survives relinking)
//! - Atomic application of added/modified/removed batches with per-item cursors
//! - Read-only diagnostics and inspection

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod normalize;

pub use config::StoreConfig;
pub use db::Database;
pub use error::{Error, Result};
pub use models::{
    BatchResult, DiagnosticsSnapshot, Item, ItemCredential, RawTransaction, RemovedTransaction,
    SkipReason, SkippedTransaction, StoredTransaction, SyncBatch, SyncState,
};
pub use normalize::{content_hash, normalize, DedupDecision};
