use chrono::NaiveDate;
use thiserror::Error;

/// Core error type shared across cheesetrace crates.
#[derive(Debug, Error)]
pub enum Error {
    /// A lot number does not follow `<PREFIX>-<YYYY-MM-DD>`.
    #[error("invalid lot number '{0}'")]
    InvalidLotNumber(String),
    /// A lot prefix contains characters that cannot appear in a lot number.
    #[error("invalid lot prefix '{0}'")]
    InvalidLotPrefix(String),
    /// A date string could not be parsed.
    #[error("invalid date '{0}' (expected YYYY-MM-DD)")]
    InvalidDate(String),
    /// The range end precedes its start.
    #[error("invalid date range: {start} is after {end}")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },
    /// The schema snapshot violates internal invariants.
    #[error("invalid schema: {0}")]
    InvalidSchema(String),
}

/// Convenience alias for results returned by cheesetrace crates.
pub type Result<T> = std::result::Result<T, Error>;
