use chrono::{Datelike, NaiveDate};
use serde::Serialize;

use crate::error::DashboardError;

/// Date the DEA X-waiver requirement was removed. The chart gets a rule at this date whenever the
/// selected range runs past its month.
pub const CUTOFF_DATE: NaiveDate = match NaiveDate::from_ymd_opt(2023, 1, 17) {
    Some(d) => d,
    None => panic!("invalid cutoff date"),
};

pub fn floor_to_month(d: NaiveDate) -> NaiveDate {
    d.with_day(1).unwrap_or(d)
}

pub fn cutoff_month() -> NaiveDate {
    floor_to_month(CUTOFF_DATE)
}

/// Inclusive month range; both ends are first-of-month dates and `start <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, DashboardError> {
        let start = floor_to_month(start);
        let end = floor_to_month(end);
        if start > end {
            return Err(DashboardError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// Builds a range from a user selection. A missing end, or one that lands before the start,
    /// collapses the range to the start month.
    pub fn from_selection(start: NaiveDate, end: Option<NaiveDate>) -> Self {
        let start = floor_to_month(start);
        let end = end.map(floor_to_month).filter(|e| *e >= start).unwrap_or(start);
        Self { start, end }
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn contains(&self, month: NaiveDate) -> bool {
        self.start <= month && month <= self.end
    }

    pub fn needs_cutoff_marker(&self) -> bool {
        needs_cutoff_marker(self)
    }
}

pub fn needs_cutoff_marker(range: &DateRange) -> bool {
    range.end > cutoff_month()
}

pub fn format_month(d: NaiveDate) -> String {
    d.format("%Y-%m").to_string()
}

/// Parses a user-supplied date in `YYYY-MM` or `YYYY-MM-DD` form.
pub fn parse_date_input(s: &str) -> Result<NaiveDate, DashboardError> {
    let s = s.trim();
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(d);
    }
    NaiveDate::parse_from_str(&format!("{s}-01"), "%Y-%m-%d")
        .map_err(|_| DashboardError::InvalidDate(s.to_string()))
}
