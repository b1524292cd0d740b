use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;

use crate::county::{CountyCodes, title_case};
use crate::record::Record;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineSeriesPoint {
    pub month: NaiveDate,
    pub generic_name: String,
    pub total_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MapRow {
    pub pharmacy_county: String,
    pub county_code: Option<u32>,
    pub total_count: u64,
}

/// Sums counts per (month, drug). Points come back sorted by month, then drug name. Totals
/// saturate at `u64::MAX`.
pub fn aggregate_for_series(records: &[Record]) -> Vec<LineSeriesPoint> {
    let mut groups: BTreeMap<(NaiveDate, &str), u64> = BTreeMap::new();
    for r in records {
        let total = groups
            .entry((r.filled_month, r.generic_name.as_str()))
            .or_default();
        *total = total.saturating_add(r.prescription_count);
    }
    groups
        .into_iter()
        .map(|((month, name), total_count)| LineSeriesPoint {
            month,
            generic_name: name.to_string(),
            total_count,
        })
        .collect()
}

/// Sums counts per title-cased county, joined to its code. Counties with no records are absent;
/// counties missing from the code table keep a `None` code. Totals saturate like the series.
pub fn aggregate_for_map(records: &[Record], county_codes: &CountyCodes) -> Vec<MapRow> {
    let mut groups: BTreeMap<(String, Option<u32>), u64> = BTreeMap::new();
    for r in records {
        let county = title_case(&r.pharmacy_county);
        let code = county_codes.code_for(&county);
        let total = groups.entry((county, code)).or_default();
        *total = total.saturating_add(r.prescription_count);
    }
    groups
        .into_iter()
        .map(|((pharmacy_county, county_code), total_count)| MapRow {
            pharmacy_county,
            county_code,
            total_count,
        })
        .collect()
}
