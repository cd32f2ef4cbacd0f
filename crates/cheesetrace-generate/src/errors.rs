use thiserror::Error;

use cheesetrace_store::StoreError;

/// Errors emitted by stages and the orchestrator.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error(transparent)]
    Core(#[from] cheesetrace_core::Error),
    #[error("stage '{stage}' requires missing tables: {}", tables.join(", "))]
    MissingTables { stage: String, tables: Vec<String> },
    #[error("missing reference data: {0}")]
    MissingReference(String),
    #[error("invalid options: {0}")]
    InvalidOptions(String),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
