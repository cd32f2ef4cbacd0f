use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::format::{compact_date, format_date};

/// The date being generated and the running lot counter.
///
/// Passed by value to every stage; stages never keep their own copy of the
/// current date or counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationContext {
    pub date: NaiveDate,
    pub lot_count: u32,
}

impl GenerationContext {
    pub fn new(date: NaiveDate, lot_count: u32) -> Self {
        Self { date, lot_count }
    }

    pub fn date_key(&self) -> String {
        format_date(self.date)
    }

    pub fn compact_date(&self) -> String {
        compact_date(self.date)
    }

    /// Date offset from the lot date by `days`.
    pub fn days_after(&self, days: u64) -> NaiveDate {
        self.date
            .checked_add_days(Days::new(days))
            .unwrap_or(NaiveDate::MAX)
    }
}

/// Inclusive range of production dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(Error::InvalidDateRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Number of days in the range, endpoints included.
    pub fn days(&self) -> u32 {
        (self.end - self.start).num_days() as u32 + 1
    }

    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.start.iter_days().take_while(move |date| *date <= self.end)
    }

    /// One context per date, with the lot counter starting at 1 and
    /// advancing in lockstep with the date.
    pub fn contexts(&self) -> impl Iterator<Item = GenerationContext> + '_ {
        self.dates()
            .zip(1u32..)
            .map(|(date, lot_count)| GenerationContext::new(date, lot_count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn rejects_reversed_range() {
        let err = DateRange::new(day(2024, 1, 5), day(2024, 1, 1)).unwrap_err();
        assert!(matches!(err, Error::InvalidDateRange { .. }));
    }

    #[test]
    fn single_day_range_has_one_context() {
        let range = DateRange::new(day(2024, 2, 29), day(2024, 2, 29)).expect("range");
        let contexts: Vec<_> = range.contexts().collect();
        assert_eq!(contexts, vec![GenerationContext::new(day(2024, 2, 29), 1)]);
    }

    #[test]
    fn counter_and_date_advance_together() {
        let range = DateRange::new(day(2023, 12, 30), day(2024, 1, 2)).expect("range");
        assert_eq!(range.days(), 4);
        let contexts: Vec<_> = range.contexts().collect();
        assert_eq!(contexts.len(), 4);
        for pair in contexts.windows(2) {
            assert_eq!(pair[1].date, pair[0].date.succ_opt().expect("next"));
            assert_eq!(pair[1].lot_count, pair[0].lot_count + 1);
        }
        assert_eq!(contexts[3].date_key(), "2024-01-02");
    }
}
