use chrono::NaiveDate;

use crate::error::DashboardError;
use crate::range::floor_to_month;
use crate::source::RawTable;

pub const COL_FILLED_MONTH: &str = "Month, Year of Filled At";
pub const COL_GENERIC_NAME: &str = "Generic Name";
pub const COL_PHARMACY_COUNTY: &str = "Current Pharmacy County";
pub const COL_PHARMACY_COUNTY_ALT: &str = "Pharmacy County";
pub const COL_PRESCRIPTION_COUNT: &str = "Prescription Count";

/// One prescription fill observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub filled_month: NaiveDate,
    pub generic_name: String,
    pub pharmacy_county: String,
    pub prescription_count: u64,
}

impl Record {
    pub fn new(
        filled_month: NaiveDate,
        generic_name: impl Into<String>,
        pharmacy_county: impl Into<String>,
        prescription_count: Option<u64>,
    ) -> Self {
        Self {
            filled_month: floor_to_month(filled_month),
            generic_name: generic_name.into(),
            pharmacy_county: pharmacy_county.into(),
            prescription_count: prescription_count.unwrap_or(0),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Columns {
    month: usize,
    name: usize,
    county: usize,
    count: usize,
}

impl Columns {
    fn locate(columns: &[String]) -> Result<Self, DashboardError> {
        Ok(Self {
            month: header_index(columns, &[COL_FILLED_MONTH])?,
            name: header_index(columns, &[COL_GENERIC_NAME])?,
            county: header_index(columns, &[COL_PHARMACY_COUNTY, COL_PHARMACY_COUNTY_ALT])?,
            count: header_index(columns, &[COL_PRESCRIPTION_COUNT])?,
        })
    }
}

fn header_index(columns: &[String], names: &[&str]) -> Result<usize, DashboardError> {
    columns
        .iter()
        .position(|c| names.contains(&c.trim()))
        .ok_or_else(|| {
            DashboardError::malformed(0, format!("missing required column '{}'", names[0]))
        })
}

/// Decodes a fetched table into records. Any row with a missing or unreadable month, name, or
/// county fails the whole run; an empty count cell is read as zero.
pub fn records_from_table(table: &RawTable) -> Result<Vec<Record>, DashboardError> {
    let cols = Columns::locate(&table.columns)?;
    let mut out = Vec::with_capacity(table.rows.len());
    for (i, row) in table.rows.iter().enumerate() {
        let row_no = i + 1;
        let cell = |idx: usize| {
            row.get(idx)
                .and_then(|c| c.as_deref())
                .map(str::trim)
                .filter(|c| !c.is_empty())
        };
        let required = |idx: usize, label: &'static str| {
            cell(idx).ok_or_else(|| DashboardError::malformed(row_no, format!("missing {label}")))
        };

        let month_raw = required(cols.month, COL_FILLED_MONTH)?;
        let filled_month = parse_month_cell(month_raw).ok_or_else(|| {
            DashboardError::malformed(row_no, format!("unreadable month '{month_raw}'"))
        })?;
        let generic_name = required(cols.name, COL_GENERIC_NAME)?;
        let county = required(cols.county, COL_PHARMACY_COUNTY)?;
        let count = match cell(cols.count) {
            None => None,
            Some(raw) => Some(parse_count_cell(raw).ok_or_else(|| {
                DashboardError::malformed(row_no, format!("unreadable prescription count '{raw}'"))
            })?),
        };

        out.push(Record::new(filled_month, generic_name, county, count));
    }
    Ok(out)
}

/// Reads a month cell in any of the layouts spreadsheet exports produce and floors it to the
/// first of the month.
pub fn parse_month_cell(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    // Drop a trailing time component ("2023-01-01 00:00:00", "2023-01-01T00:00:00").
    let date_part = s
        .split(|c| c == 'T' || c == ' ')
        .next()
        .filter(|p| p.contains('-') || p.contains('/'))
        .unwrap_or(s);

    for fmt in ["%Y-%m-%d", "%m/%d/%Y", "%Y/%m/%d"] {
        if let Ok(d) = NaiveDate::parse_from_str(date_part, fmt) {
            return Some(floor_to_month(d));
        }
    }
    if let Ok(d) = NaiveDate::parse_from_str(&format!("{date_part}-01"), "%Y-%m-%d") {
        return Some(d);
    }
    if let Ok(d) = NaiveDate::parse_from_str(&format!("{date_part}/01"), "%m/%Y/%d") {
        return Some(d);
    }
    // "January 2023", "Jan 2023", "January, 2023"
    let words = s.replace(',', " ");
    let words = words.split_whitespace().collect::<Vec<_>>().join(" ");
    for fmt in ["%d %B %Y", "%d %b %Y"] {
        if let Ok(d) = NaiveDate::parse_from_str(&format!("1 {words}"), fmt) {
            return Some(d);
        }
    }
    // "Jan 17, 2023", "January 17 2023"
    for fmt in ["%B %d %Y", "%b %d %Y"] {
        if let Ok(d) = NaiveDate::parse_from_str(&words, fmt) {
            return Some(floor_to_month(d));
        }
    }
    None
}

/// Reads a non-negative whole count; "1,234" and "5.0" are accepted.
pub fn parse_count_cell(s: &str) -> Option<u64> {
    let cleaned: String = s.trim().chars().filter(|c| *c != ',').collect();
    if let Ok(n) = cleaned.parse::<u64>() {
        return Some(n);
    }
    let f: f64 = cleaned.parse().ok()?;
    // u64::MAX as f64 rounds up to 2^64, which does not fit.
    if f.is_finite() && f >= 0.0 && f.fract() == 0.0 && f < u64::MAX as f64 {
        Some(f as u64)
    } else {
        None
    }
}
