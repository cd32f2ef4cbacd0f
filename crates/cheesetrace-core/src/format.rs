//! Text formats used for dates and timestamps stored in the database.

use chrono::{NaiveDate, NaiveDateTime};

use crate::error::{Error, Result};

/// Date columns are stored as ISO dates.
pub const DATE_FORMAT: &str = "%Y-%m-%d";
/// Timestamp columns are stored as ISO local date-times without offset.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Compact `YYYYMMDD` form used inside codes such as `RM-20240101-001`.
pub fn compact_date(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

pub fn format_timestamp(value: NaiveDateTime) -> String {
    value.format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT)
        .map_err(|_| Error::InvalidDate(value.to_string()))
}

pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_formats_dates() {
        let date = parse_date("2024-01-31").expect("date");
        assert_eq!(format_date(date), "2024-01-31");
        assert_eq!(compact_date(date), "20240131");
    }

    #[test]
    fn rejects_malformed_dates() {
        assert!(parse_date("2024/01/31").is_err());
        assert!(parse_date("2024-02-30").is_err());
    }

    #[test]
    fn timestamps_round_trip_through_text() {
        let ts = NaiveDate::from_ymd_opt(2024, 1, 1)
            .and_then(|d| d.and_hms_opt(10, 52, 0))
            .expect("timestamp");
        let text = format_timestamp(ts);
        assert_eq!(text, "2024-01-01T10:52:00");
        assert_eq!(parse_timestamp(&text), Some(ts));
    }
}
