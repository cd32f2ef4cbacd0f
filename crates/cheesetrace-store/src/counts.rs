use std::collections::BTreeMap;

use rusqlite::Connection;
use serde::Serialize;

use crate::error::{StoreError, StoreResult};

/// Row counts per base table, ordered by table name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TableCounts(pub BTreeMap<String, u64>);

impl TableCounts {
    pub fn get(&self, table: &str) -> u64 {
        self.0.get(table).copied().unwrap_or(0)
    }

    pub fn empty_tables(&self) -> Vec<&str> {
        self.0
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    pub fn total_rows(&self) -> u64 {
        self.0.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.0.iter().map(|(name, count)| (name.as_str(), *count))
    }
}

/// Names of all base tables in the store.
pub fn table_names(conn: &Connection) -> StoreResult<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master \
         WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )?;
    let names = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(names)
}

pub fn table_counts(conn: &Connection) -> StoreResult<TableCounts> {
    let mut counts = BTreeMap::new();
    for name in table_names(conn)? {
        let count: i64 =
            conn.query_row(&format!("SELECT COUNT(*) FROM {}", quote_ident(&name)), [], |row| {
                row.get(0)
            })?;
        counts.insert(name, count as u64);
    }
    Ok(TableCounts(counts))
}

/// Required tables that do not exist in the store.
pub fn missing_tables(conn: &Connection, required: &[&str]) -> StoreResult<Vec<String>> {
    let present = table_names(conn)?;
    Ok(required
        .iter()
        .filter(|name| !present.iter().any(|p| p == *name))
        .map(|name| name.to_string())
        .collect())
}

/// Fails with [`StoreError::MissingTables`] unless every table exists.
pub fn require_tables(conn: &Connection, required: &[&str]) -> StoreResult<()> {
    let missing = missing_tables(conn, required)?;
    if missing.is_empty() {
        Ok(())
    } else {
        Err(StoreError::MissingTables(missing))
    }
}

/// Quotes a SQLite identifier.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
