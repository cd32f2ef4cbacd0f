use std::fs;
use std::path::Path;

use rusqlite::Connection;
use tracing::info;

use crate::error::{StoreError, StoreResult};

/// Deletes any existing store at `path` and opens a fresh one.
pub fn reset_store(path: &Path) -> StoreResult<Connection> {
    for suffix in ["", "-journal", "-wal", "-shm"] {
        let candidate = path.with_file_name(format!(
            "{}{suffix}",
            path.file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default()
        ));
        if candidate.exists() {
            fs::remove_file(&candidate)?;
            info!(event = "store_removed", path = %candidate.display());
        }
    }
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let conn = Connection::open(path)?;
    configure(&conn)?;
    Ok(conn)
}

/// Opens an existing store without modifying it.
pub fn open_store(path: &Path) -> StoreResult<Connection> {
    if !path.is_file() {
        return Err(StoreError::MissingStore(path.to_path_buf()));
    }
    let conn = Connection::open(path)?;
    configure(&conn)?;
    Ok(conn)
}

pub fn open_in_memory() -> StoreResult<Connection> {
    let conn = Connection::open_in_memory()?;
    configure(&conn)?;
    Ok(conn)
}

/// Foreign keys are enforced on every connection to the store.
pub fn configure(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    Ok(())
}
