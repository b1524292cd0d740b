use crate::county::CountySelection;
use crate::range::DateRange;
use crate::record::Record;

/// Keeps the records whose month falls inside `range` and whose county is selected.
pub fn filter(records: &[Record], range: &DateRange, counties: &CountySelection) -> Vec<Record> {
    if counties.is_empty() {
        return Vec::new();
    }
    records
        .iter()
        .filter(|r| range.contains(r.filled_month) && counties.matches(&r.pharmacy_county))
        .cloned()
        .collect()
}
