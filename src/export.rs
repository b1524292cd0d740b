use std::path::PathBuf;

use anyhow::Context;
use serde::Serialize;

use crate::cli::ExportArgs;
use crate::county::CountySelection;
use crate::error::DashboardError;
use crate::pipeline::{self, DatasetBounds, resolve_range};
use crate::range::{DateRange, format_month, parse_date_input};
use crate::record::Record;
use crate::source::SourceContext;

/// A filtered record as it is shown in the table and written to the download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportRow {
    #[serde(rename = "Month, Year of Filled At")]
    pub month: String,
    #[serde(rename = "Generic Name")]
    pub generic_name: String,
    #[serde(rename = "Pharmacy County")]
    pub pharmacy_county: String,
    #[serde(rename = "Prescription Count")]
    pub prescription_count: u64,
}

impl From<&Record> for ExportRow {
    fn from(r: &Record) -> Self {
        Self {
            month: format_month(r.filled_month),
            generic_name: r.generic_name.clone(),
            pharmacy_county: r.pharmacy_county.clone(),
            prescription_count: r.prescription_count,
        }
    }
}

pub fn export_rows(records: &[Record]) -> Vec<ExportRow> {
    records.iter().map(ExportRow::from).collect()
}

pub fn to_csv_bytes(records: &[Record]) -> Result<Vec<u8>, DashboardError> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    // Header is written explicitly so an empty selection still downloads a valid table.
    writer.write_record([
        "Month, Year of Filled At",
        "Generic Name",
        "Pharmacy County",
        "Prescription Count",
    ])?;
    for r in records {
        writer.serialize(ExportRow::from(r))?;
    }
    writer
        .into_inner()
        .map_err(|e| DashboardError::Encoding(csv::Error::from(e.into_error())))
}

pub fn export_filename(range: &DateRange) -> String {
    format!(
        "buprenorphine_data_{}_to_{}.csv",
        format_month(range.start()),
        format_month(range.end())
    )
}

/// `export` command: fetch, filter, and write the CSV download into the output directory.
pub async fn run(opts: ExportArgs) -> anyhow::Result<()> {
    let ctx = SourceContext::open(&opts.source).context("open data source")?;
    let records = ctx.load_records().await.context("load dataset")?;
    let bounds = DatasetBounds::of(&records);

    let start = opts.start.as_deref().map(parse_date_input).transpose()?;
    let end = opts.end.as_deref().map(parse_date_input).transpose()?;
    let range =
        resolve_range(start, end, bounds.as_ref())?.ok_or(DashboardError::EmptyDataset)?;

    let counties = if opts.county.is_empty() {
        CountySelection::all()
    } else {
        CountySelection::from_user_input(&opts.county)
    };

    let (filename, bytes) = pipeline::export(&records, &range, &counties)?;

    let out_dir = PathBuf::from(&opts.out_dir);
    tokio::fs::create_dir_all(&out_dir)
        .await
        .with_context(|| format!("create {}", out_dir.display()))?;
    let out_path = out_dir.join(&filename);
    tokio::fs::write(&out_path, &bytes)
        .await
        .with_context(|| format!("write {}", out_path.display()))?;

    tracing::info!("Wrote {} bytes to {}", bytes.len(), out_path.display());
    Ok(())
}
