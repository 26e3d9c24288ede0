use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Inclusive date interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.start, self.end)
    }
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        DateRange { start, end }
    }

    /// The band `[date - before, date + after]`, saturating at the calendar limits.
    pub fn around(date: NaiveDate, days_before: u32, days_after: u32) -> Self {
        let start = date
            .checked_sub_days(Days::new(days_before.into()))
            .unwrap_or(NaiveDate::MIN);
        let end = date
            .checked_add_days(Days::new(days_after.into()))
            .unwrap_or(NaiveDate::MAX);
        DateRange { start, end }
    }

    pub fn contains(self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    /// Smallest range covering both.
    pub fn union(self, other: DateRange) -> Self {
        DateRange {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}
