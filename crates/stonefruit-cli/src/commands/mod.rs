//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `core` - Config resolution, open_db and init
//! - `inspect` - Read-only table listing, schema and queries
//! - `items` - Item registry commands (add, list, latest, lookup)
//! - `status` - Diagnostics snapshot
//! - `sync` - Batch application and cursor lookup

pub mod core;
pub mod inspect;
pub mod items;
pub mod status;
pub mod sync;

// Re-export command functions for main.rs
pub use core::*;
pub use inspect::*;
pub use items::*;
pub use status::*;
pub use sync::*;

/// Truncate a string to a maximum length, adding "..." if truncated
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
