use thiserror::Error;

/// Errors emitted by the verifier.
#[derive(Debug, Error)]
pub enum EvalError {
    #[error(transparent)]
    Store(#[from] cheesetrace_store::StoreError),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("verification failed with {0} violation(s)")]
    Violations(u64),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
