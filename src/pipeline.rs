use chrono::NaiveDate;
use serde::Serialize;

use crate::aggregate::{LineSeriesPoint, MapRow, aggregate_for_map, aggregate_for_series};
use crate::county::{CountyCodes, CountySelection};
use crate::error::DashboardError;
use crate::export::{ExportRow, export_filename, export_rows, to_csv_bytes};
use crate::filter::filter;
use crate::range::{CUTOFF_DATE, DateRange};
use crate::record::Record;

/// First and last month present in the loaded dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DatasetBounds {
    pub min: NaiveDate,
    pub max: NaiveDate,
}

impl DatasetBounds {
    pub fn of(records: &[Record]) -> Option<Self> {
        let min = records.iter().map(|r| r.filled_month).min()?;
        let max = records.iter().map(|r| r.filled_month).max()?;
        Some(Self { min, max })
    }

    pub fn full_range(&self) -> Result<DateRange, DashboardError> {
        DateRange::new(self.min, self.max)
    }
}

/// Turns optional user endpoints into a range. No endpoints select the whole dataset; a start
/// alone collapses to that month; an end alone starts at the dataset minimum.
pub fn resolve_range(
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    bounds: Option<&DatasetBounds>,
) -> Result<Option<DateRange>, DashboardError> {
    let range = match (start, end) {
        (Some(start), end) => Some(DateRange::from_selection(start, end)),
        (None, Some(end)) => {
            let start = bounds.map(|b| b.min.min(end)).unwrap_or(end);
            Some(DateRange::from_selection(start, Some(end)))
        }
        (None, None) => bounds.map(DatasetBounds::full_range).transpose()?,
    };
    Ok(range)
}

#[derive(Debug, Clone, Serialize)]
pub struct CutoffMarker {
    pub date: NaiveDate,
    pub show: bool,
}

/// Everything a dashboard render needs for one selection.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardView {
    pub range: DateRange,
    pub counties: Vec<String>,
    pub cutoff: CutoffMarker,
    pub series: Vec<LineSeriesPoint>,
    pub map: Vec<MapRow>,
    pub rows: Vec<ExportRow>,
    pub filename: String,
}

pub fn run(
    records: &[Record],
    range: &DateRange,
    counties: &CountySelection,
    county_codes: &CountyCodes,
) -> DashboardView {
    let filtered = filter(records, range, counties);
    if filtered.is_empty() {
        tracing::warn!(
            "selection {}..{} over {} counties matched no records",
            range.start(),
            range.end(),
            counties.len()
        );
    } else {
        tracing::debug!(
            "selection matched {} of {} records",
            filtered.len(),
            records.len()
        );
    }

    DashboardView {
        range: *range,
        counties: counties.display_order(),
        cutoff: CutoffMarker {
            date: CUTOFF_DATE,
            show: range.needs_cutoff_marker(),
        },
        series: aggregate_for_series(&filtered),
        map: aggregate_for_map(&filtered, county_codes),
        rows: export_rows(&filtered),
        filename: export_filename(range),
    }
}

/// Filtered CSV download for one selection, with its conventional file name.
pub fn export(
    records: &[Record],
    range: &DateRange,
    counties: &CountySelection,
) -> Result<(String, Vec<u8>), DashboardError> {
    let filtered = filter(records, range, counties);
    let bytes = to_csv_bytes(&filtered)?;
    tracing::debug!("export of {} rows ({} bytes)", filtered.len(), bytes.len());
    Ok((export_filename(range), bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::county::{ALL_AZ_COUNTIES, CountyCodeEntry};
    use crate::record::parse_month_cell;
    use proptest::prelude::*;

    fn month(y: i32, m: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, 1).unwrap()
    }

    fn codes() -> CountyCodes {
        CountyCodes::from_entries(ALL_AZ_COUNTIES.iter().enumerate().map(|(i, c)| {
            CountyCodeEntry {
                county_name: c.to_string(),
                county_code: 4001 + 2 * i as u32,
            }
        }))
    }

    fn maricopa_code() -> u32 {
        codes().code_for("Maricopa").unwrap()
    }

    fn scenario_records() -> Vec<Record> {
        vec![
            Record::new(month(2023, 1), "DrugA", "Maricopa", Some(5)),
            Record::new(month(2023, 2), "DrugA", "Maricopa", Some(3)),
        ]
    }

    fn total_series(v: &[LineSeriesPoint]) -> u64 {
        v.iter().map(|p| p.total_count).sum()
    }

    fn total_map(v: &[MapRow]) -> u64 {
        v.iter().map(|p| p.total_count).sum()
    }

    #[test]
    fn single_county_two_months() {
        let range = DateRange::new(month(2023, 1), month(2023, 2)).unwrap();
        let view = run(
            &scenario_records(),
            &range,
            &CountySelection::new(["Maricopa"]),
            &codes(),
        );
        assert_eq!(
            view.series,
            vec![
                LineSeriesPoint {
                    month: month(2023, 1),
                    generic_name: "DrugA".into(),
                    total_count: 5,
                },
                LineSeriesPoint {
                    month: month(2023, 2),
                    generic_name: "DrugA".into(),
                    total_count: 3,
                },
            ]
        );
        assert_eq!(
            view.map,
            vec![MapRow {
                pharmacy_county: "Maricopa".into(),
                county_code: Some(maricopa_code()),
                total_count: 8,
            }]
        );
        assert_eq!(view.filename, "buprenorphine_data_2023-01_to_2023-02.csv");
        assert!(view.cutoff.show);
    }

    #[test]
    fn unselected_county_gives_empty_views() {
        let range = DateRange::new(month(2023, 1), month(2023, 2)).unwrap();
        let view = run(
            &scenario_records(),
            &range,
            &CountySelection::new(["Pima"]),
            &codes(),
        );
        assert!(view.series.is_empty());
        assert!(view.map.is_empty());
        assert!(view.rows.is_empty());
    }

    #[test]
    fn selected_county_without_records_is_omitted_from_map() {
        let range = DateRange::new(month(2023, 1), month(2023, 2)).unwrap();
        let view = run(
            &scenario_records(),
            &range,
            &CountySelection::new(["Maricopa", "Pima"]),
            &codes(),
        );
        assert_eq!(view.map.len(), 1);
        assert_eq!(view.counties, vec!["Maricopa", "Pima"]);
    }

    #[test]
    fn missing_count_contributes_zero_but_keeps_group() {
        let mut recs = scenario_records();
        recs.push(Record::new(month(2023, 1), "DrugB", "Yuma", None));
        let range = DateRange::new(month(2023, 1), month(2023, 2)).unwrap();
        let view = run(&recs, &range, &CountySelection::all(), &codes());
        assert!(
            view.series
                .iter()
                .any(|p| p.generic_name == "DrugB" && p.total_count == 0)
        );
        assert!(
            view.map
                .iter()
                .any(|m| m.pharmacy_county == "Yuma" && m.total_count == 0)
        );
    }

    #[test]
    fn export_names_the_file_after_the_range() {
        let range = DateRange::new(month(2023, 1), month(2023, 2)).unwrap();
        let (name, bytes) =
            export(&scenario_records(), &range, &CountySelection::new(["maricopa"])).unwrap();
        assert_eq!(name, "buprenorphine_data_2023-01_to_2023-02.csv");
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(text.lines().count(), 3);

        let (_, bytes) = export(&scenario_records(), &range, &CountySelection::default()).unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap().lines().count(), 1);
    }

    #[test]
    fn range_resolution_defaults() {
        let bounds = DatasetBounds::of(&scenario_records()).unwrap();
        assert_eq!(
            resolve_range(None, None, Some(&bounds)).unwrap(),
            Some(DateRange::new(month(2023, 1), month(2023, 2)).unwrap())
        );
        assert_eq!(
            resolve_range(NaiveDate::from_ymd_opt(2023, 3, 15), None, Some(&bounds)).unwrap(),
            Some(DateRange::from_selection(month(2023, 3), None))
        );
        assert_eq!(
            resolve_range(None, Some(month(2023, 1)), Some(&bounds)).unwrap(),
            Some(DateRange::from_selection(month(2023, 1), None))
        );
        assert_eq!(resolve_range(None, None, None).unwrap(), None);
        assert_eq!(DatasetBounds::of(&[]), None);
    }

    #[test]
    fn inverted_bounds_are_an_invalid_range() {
        let bounds = DatasetBounds {
            min: month(2023, 5),
            max: month(2023, 2),
        };
        assert!(matches!(
            resolve_range(None, None, Some(&bounds)),
            Err(DashboardError::InvalidRange { .. })
        ));
    }

    const DRUGS: [&str; 3] = ["Buprenorphine", "Buprenorphine-Naloxone", "Naltrexone"];

    fn arb_record() -> impl Strategy<Value = Record> {
        (
            0u32..36,
            0usize..DRUGS.len(),
            0usize..ALL_AZ_COUNTIES.len(),
            any::<bool>(),
            prop::option::of(0u64..10_000),
        )
            .prop_map(|(offset, drug, county, upper, count)| {
                let m = month(2021 + (offset / 12) as i32, offset % 12 + 1);
                let county = ALL_AZ_COUNTIES[county];
                let county = if upper {
                    county.to_uppercase()
                } else {
                    county.to_string()
                };
                Record::new(m, DRUGS[drug], county, count)
            })
    }

    fn arb_range() -> impl Strategy<Value = DateRange> {
        (0u32..36, 0u32..36).prop_map(|(a, b)| {
            let (a, b) = (a.min(b), a.max(b));
            DateRange::new(
                month(2021 + (a / 12) as i32, a % 12 + 1),
                month(2021 + (b / 12) as i32, b % 12 + 1),
            )
            .unwrap()
        })
    }

    fn arb_selection() -> impl Strategy<Value = CountySelection> {
        prop::collection::btree_set(0usize..ALL_AZ_COUNTIES.len(), 0..ALL_AZ_COUNTIES.len())
            .prop_map(|idx| CountySelection::new(idx.into_iter().map(|i| ALL_AZ_COUNTIES[i])))
    }

    proptest! {
        #[test]
        fn filter_is_idempotent(
            recs in prop::collection::vec(arb_record(), 0..60),
            range in arb_range(),
            sel in arb_selection(),
        ) {
            let once = filter(&recs, &range, &sel);
            let twice = filter(&once, &range, &sel);
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn widening_never_lowers_the_total(
            recs in prop::collection::vec(arb_record(), 0..60),
            range in arb_range(),
            sel in arb_selection(),
            extra in 0usize..ALL_AZ_COUNTIES.len(),
        ) {
            let narrow = run(&recs, &range, &sel, &codes());
            let wide_range = DateRange::new(month(2021, 1), month(2023, 12)).unwrap();
            let wider_dates = run(&recs, &wide_range, &sel, &codes());

            let mut names = sel.display_order();
            names.push(ALL_AZ_COUNTIES[extra].to_string());
            let wider_counties = run(&recs, &range, &CountySelection::new(names), &codes());

            prop_assert!(total_series(&wider_dates.series) >= total_series(&narrow.series));
            prop_assert!(total_series(&wider_counties.series) >= total_series(&narrow.series));
        }

        #[test]
        fn series_and_map_totals_agree(
            recs in prop::collection::vec(arb_record(), 0..60),
            range in arb_range(),
            sel in arb_selection(),
        ) {
            let view = run(&recs, &range, &sel, &codes());
            let filtered_total: u64 = filter(&recs, &range, &sel)
                .iter()
                .map(|r| r.prescription_count)
                .sum();
            prop_assert_eq!(total_series(&view.series), total_map(&view.map));
            prop_assert_eq!(total_series(&view.series), filtered_total);
        }

        #[test]
        fn exported_csv_refilters_to_the_same_row_count(
            recs in prop::collection::vec(arb_record(), 0..60),
            range in arb_range(),
            sel in arb_selection(),
        ) {
            let filtered = filter(&recs, &range, &sel);
            let bytes = to_csv_bytes(&filtered).unwrap();

            let mut reader = csv::Reader::from_reader(bytes.as_slice());
            let mut decoded = Vec::new();
            for row in reader.records() {
                let row = row.unwrap();
                let m = parse_month_cell(&row[0]).unwrap();
                let count: u64 = row[3].parse().unwrap();
                decoded.push(Record::new(m, &row[1], &row[2], Some(count)));
            }
            prop_assert_eq!(filter(&decoded, &range, &sel).len(), filtered.len());
        }
    }
}
