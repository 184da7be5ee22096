//! Read-only inspection of the on-disk schema and ad-hoc queries

use std::sync::OnceLock;

use regex::Regex;
use rusqlite::types::ValueRef;
use serde::Serialize;
use serde_json::Value;

use super::Database;
use crate::error::{Error, Result};

/// Table name with its `CREATE` statement
#[derive(Debug, Clone, Serialize)]
pub struct TableSchema {
    pub name: String,
    pub sql: Option<String>,
}

/// Rows returned by [`Database::query`], in column order
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl QueryResult {
    /// Rows as JSON objects keyed by column name
    pub fn to_objects(&self) -> Vec<serde_json::Map<String, Value>> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .cloned()
                    .zip(row.iter().cloned())
                    .collect()
            })
            .collect()
    }
}

/// `ATTACH`/`DETACH` count as read-only to SQLite but can create files on disk
fn attaches_database(sql: &str) -> bool {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(r"(?is)^\s*(?:(?:--[^\n]*(?:\n|$)|/\*.*?\*/)\s*)*(?:attach|detach)\b")
                .expect("valid regex")
        })
        .is_match(sql)
}

fn value_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::String(hex::encode(bytes)),
    }
}

impl Database {
    /// Names of all tables, alphabetically
    pub fn list_tables(&self) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")?;
        let tables = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(tables)
    }

    /// `CREATE` statements for one table, or for every table when `table` is `None`
    pub fn table_schema(&self, table: Option<&str>) -> Result<Vec<TableSchema>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT name, sql FROM sqlite_master
            WHERE type = 'table' AND (?1 IS NULL OR name = ?1)
            ORDER BY name
            "#,
        )?;
        let schemas = stmt
            .query_map([table], |row| {
                Ok(TableSchema {
                    name: row.get(0)?,
                    sql: row.get(1)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(schemas)
    }

    /// Run a read-only SQL statement, returning at most `limit` rows
    ///
    /// Statements that could modify the database, or attach another one, are
    /// rejected; stored rows are only ever written through the sync and item
    /// operations.
    pub fn query(&self, sql: &str, limit: usize) -> Result<QueryResult> {
        if sql.trim().is_empty() {
            return Err(Error::InvalidArgument("empty query".to_string()));
        }

        if attaches_database(sql) {
            return Err(Error::InvalidArgument(
                "ATTACH and DETACH are not allowed".to_string(),
            ));
        }

        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql)?;
        if !stmt.readonly() {
            return Err(Error::InvalidArgument(
                "only read-only statements can be run".to_string(),
            ));
        }

        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let column_count = columns.len();

        let mut result = QueryResult {
            columns,
            rows: Vec::new(),
        };

        let mut rows = stmt.query([])?;
        while result.rows.len() < limit {
            let Some(row) = rows.next()? else {
                break;
            };
            let values = (0..column_count)
                .map(|i| row.get_ref(i).map(value_to_json))
                .collect::<rusqlite::Result<Vec<_>>>()?;
            result.rows.push(values);
        }

        Ok(result)
    }
}
