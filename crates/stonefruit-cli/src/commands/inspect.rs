//! Read-only database inspection commands (tables, schema, query)

use anyhow::{Context, Result};
use stonefruit_core::Database;

pub fn cmd_db_tables(db: &Database, json: bool) -> Result<()> {
    let tables = db.list_tables()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&tables)?);
    } else {
        for table in tables {
            println!("{}", table);
        }
    }
    Ok(())
}

pub fn cmd_db_schema(db: &Database, table: Option<&str>, json: bool) -> Result<()> {
    let schemas = db.table_schema(table)?;

    if schemas.is_empty() {
        if let Some(table) = table {
            anyhow::bail!("No such table: {}", table);
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&schemas)?);
    } else {
        for schema in schemas {
            println!("{};", schema.sql.as_deref().unwrap_or(&schema.name));
            println!();
        }
    }
    Ok(())
}

pub fn cmd_db_query(db: &Database, sql: &str, limit: usize, json: bool) -> Result<()> {
    let result = db.query(sql, limit).context("Query failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result.to_objects())?);
        return Ok(());
    }

    println!("{}", result.columns.join(" │ "));
    for row in &result.rows {
        let cells: Vec<String> = row
            .iter()
            .map(|v| match v {
                serde_json::Value::String(s) => s.clone(),
                serde_json::Value::Null => "NULL".to_string(),
                other => other.to_string(),
            })
            .collect();
        println!("{}", cells.join(" │ "));
    }
    println!("({} rows)", result.rows.len());
    Ok(())
}
