//! Item registry operations

use std::sync::OnceLock;

use regex::Regex;
use rusqlite::{params, OptionalExtension};

use super::{now_timestamp, parse_datetime, Database};
use crate::error::{Error, Result};
use crate::models::{Item, ItemCredential};

/// Whether `token` has the shape of a real access token (`access-<env>-<id>`)
///
/// Placeholder values written by tests and fixtures do not match.
pub fn is_live_access_token(token: &str) -> bool {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(r"^access-[A-Za-z0-9_]+-[A-Za-z0-9_-]+$").expect("valid regex")
        })
        .is_match(token)
}

impl Database {
    /// Insert an item, or refresh its token and institution on relink
    pub fn upsert_item(
        &self,
        item_id: &str,
        access_token: &str,
        institution_id: Option<&str>,
    ) -> Result<()> {
        if item_id.trim().is_empty() || access_token.trim().is_empty() {
            return Err(Error::InvalidArgument(
                "upsert_item requires item_id and access_token".to_string(),
            ));
        }

        let conn = self.conn()?;
        let now = now_timestamp();
        conn.execute(
            r#"
            INSERT INTO items (item_id, access_token, institution_id, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?4)
            ON CONFLICT(item_id) DO UPDATE SET
                access_token = excluded.access_token,
                institution_id = excluded.institution_id,
                updated_at = excluded.updated_at
            "#,
            params![item_id, access_token, institution_id, now],
        )?;

        Ok(())
    }

    /// Find the most recently updated item using `access_token`
    pub fn get_item_id_by_access_token(&self, access_token: &str) -> Result<Option<String>> {
        if access_token.is_empty() {
            return Ok(None);
        }

        let conn = self.conn()?;
        let item_id = conn
            .query_row(
                r#"
                SELECT item_id FROM items
                WHERE access_token = ?
                ORDER BY updated_at DESC, rowid DESC
                LIMIT 1
                "#,
                params![access_token],
                |row| row.get(0),
            )
            .optional()?;

        Ok(item_id)
    }

    /// Most recently updated item, if any
    pub fn get_latest_item(&self) -> Result<Option<ItemCredential>> {
        let conn = self.conn()?;
        let item = conn
            .query_row(
                r#"
                SELECT item_id, access_token FROM items
                ORDER BY updated_at DESC, rowid DESC
                LIMIT 1
                "#,
                [],
                |row| {
                    Ok(ItemCredential {
                        item_id: row.get(0)?,
                        access_token: row.get(1)?,
                    })
                },
            )
            .optional()?;

        Ok(item)
    }

    /// Most recently updated item whose token looks like a real credential
    pub fn get_latest_valid_item(&self) -> Result<Option<ItemCredential>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT item_id, access_token FROM items
            WHERE access_token LIKE 'access-%-%'
            ORDER BY updated_at DESC, rowid DESC
            "#,
        )?;

        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let access_token: String = row.get(1)?;
            if is_live_access_token(&access_token) {
                return Ok(Some(ItemCredential {
                    item_id: row.get(0)?,
                    access_token,
                }));
            }
        }

        Ok(None)
    }

    /// List all items, most recently updated first
    pub fn list_items(&self) -> Result<Vec<Item>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT item_id, access_token, institution_id, created_at, updated_at
            FROM items
            ORDER BY updated_at DESC, rowid DESC
            "#,
        )?;

        let items = stmt
            .query_map([], |row| {
                let created_at_str: String = row.get(3)?;
                let updated_at_str: String = row.get(4)?;
                Ok(Item {
                    item_id: row.get(0)?,
                    access_token: row.get(1)?,
                    institution_id: row.get(2)?,
                    created_at: parse_datetime(&created_at_str),
                    updated_at: parse_datetime(&updated_at_str),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(items)
    }
}
