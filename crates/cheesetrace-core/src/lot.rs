//! Lot numbers: the human-readable key of one day's production run.
//!
//! A lot number is `<PREFIX>-<YYYY-MM-DD>`, e.g. `TAL-2024-01-15`. The
//! prefix is one or more ASCII uppercase letters or digits.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::format::{DATE_FORMAT, compact_date, format_date};

/// Prefix used when no product-specific prefix is configured.
pub const DEFAULT_LOT_PREFIX: &str = "TAL";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LotNumber {
    prefix: String,
    date: NaiveDate,
}

impl LotNumber {
    pub fn new(prefix: &str, date: NaiveDate) -> Result<Self> {
        validate_prefix(prefix)?;
        Ok(Self {
            prefix: prefix.to_string(),
            date,
        })
    }

    pub fn parse(value: &str) -> Result<Self> {
        let invalid = || Error::InvalidLotNumber(value.to_string());
        let (prefix, date) = value.split_once('-').ok_or_else(invalid)?;
        validate_prefix(prefix).map_err(|_| invalid())?;
        // chrono accepts unpadded fields, the lot format does not.
        if date.len() != 10 {
            return Err(invalid());
        }
        let date = NaiveDate::parse_from_str(date, DATE_FORMAT).map_err(|_| invalid())?;
        Ok(Self {
            prefix: prefix.to_string(),
            date,
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    /// Batch code printed on regulatory labels, e.g. `TAL-20240115`.
    pub fn batch_code(&self) -> String {
        format!("{}-{}", self.prefix, compact_date(self.date))
    }

    /// SQL `LIKE` pattern matching every lot number with this prefix.
    pub fn like_pattern(prefix: &str) -> String {
        format!("{prefix}-%")
    }
}

impl fmt::Display for LotNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.prefix, format_date(self.date))
    }
}

impl FromStr for LotNumber {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        Self::parse(value)
    }
}

impl Serialize for LotNumber {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for LotNumber {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

fn validate_prefix(prefix: &str) -> Result<()> {
    let valid = !prefix.is_empty()
        && prefix
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit());
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidLotPrefix(prefix.to_string()))
    }
}

/// Lifecycle status stored in `lot_master.status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LotStatus {
    Active,
    /// Placeholder created by a dependent stage when the day's lot was missing.
    Fixture,
}

impl LotStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            LotStatus::Active => "ACTIVE",
            LotStatus::Fixture => "FIXTURE",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn formats_prefix_and_iso_date() {
        let lot = LotNumber::new("TAL", day(2024, 1, 5)).expect("lot");
        assert_eq!(lot.to_string(), "TAL-2024-01-05");
        assert_eq!(lot.batch_code(), "TAL-20240105");
    }

    #[test]
    fn rejects_lowercase_or_dashed_prefix() {
        assert!(LotNumber::new("tal", day(2024, 1, 5)).is_err());
        assert!(LotNumber::new("TA-L", day(2024, 1, 5)).is_err());
        assert!(LotNumber::new("", day(2024, 1, 5)).is_err());
    }

    #[test]
    fn parse_requires_zero_padded_date() {
        assert!(LotNumber::parse("TAL-2024-1-5").is_err());
        assert!(LotNumber::parse("TAL-2024-13-01").is_err());
        assert!(LotNumber::parse("TAL").is_err());
    }
}
