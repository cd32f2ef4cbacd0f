use std::fs;
use std::path::{Path, PathBuf};

use rusqlite::Connection;
use rusqlite::types::ValueRef;
use serde::Serialize;
use tracing::info;

use crate::counts::{quote_ident, table_names};
use crate::error::StoreResult;

#[derive(Debug, Clone, Serialize)]
pub struct ExportedTable {
    pub table: String,
    pub path: PathBuf,
    pub rows: u64,
}

/// Writes every base table to `<dir>/<table>.csv`, header row first.
pub fn export_tables(conn: &Connection, dir: &Path) -> StoreResult<Vec<ExportedTable>> {
    fs::create_dir_all(dir)?;
    let mut exported = Vec::new();

    for table in table_names(conn)? {
        let path = dir.join(format!("{table}.csv"));
        let mut writer = csv::Writer::from_path(&path)?;
        let mut stmt = conn.prepare(&format!("SELECT * FROM {}", quote_ident(&table)))?;
        let headers: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        writer.write_record(&headers)?;

        let mut rows = stmt.query([])?;
        let mut count = 0u64;
        while let Some(row) = rows.next()? {
            let mut record = Vec::with_capacity(headers.len());
            for idx in 0..headers.len() {
                record.push(render_value(row.get_ref(idx)?));
            }
            writer.write_record(&record)?;
            count += 1;
        }
        writer.flush()?;

        info!(event = "table_exported", table = %table, rows = count, path = %path.display());
        exported.push(ExportedTable {
            table,
            path,
            rows: count,
        });
    }

    Ok(exported)
}

fn render_value(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => String::new(),
        ValueRef::Integer(v) => v.to_string(),
        ValueRef::Real(v) => v.to_string(),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => String::from_utf8_lossy(bytes).into_owned(),
    }
}
