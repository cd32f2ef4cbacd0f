use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while creating, loading or reading the store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Core(#[from] cheesetrace_core::Error),
    #[error("schema file '{name}' not found in {dir}")]
    MissingSchemaFile { name: String, dir: PathBuf },
    #[error("schema file '{file}' failed: {source}")]
    SchemaStatement {
        file: String,
        #[source]
        source: rusqlite::Error,
    },
    #[error("store not found at {0}")]
    MissingStore(PathBuf),
    #[error("missing required tables: {}", .0.join(", "))]
    MissingTables(Vec<String>),
}

pub type StoreResult<T> = Result<T, StoreError>;
