use chrono::NaiveDate;

#[derive(Debug, thiserror::Error)]
pub enum DashboardError {
    #[error("data fetch failed for query {query}: {message}")]
    DataFetch { query: String, message: String },

    #[error("malformed record at data row {row}: {reason}")]
    MalformedRecord { row: usize, reason: String },

    #[error("invalid date range: start {start} is after end {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },

    #[error("invalid date input '{0}' (expected YYYY-MM or YYYY-MM-DD)")]
    InvalidDate(String),

    #[error("dataset has no records")]
    EmptyDataset,

    #[error("csv encoding failed: {0}")]
    Encoding(#[from] csv::Error),
}

impl DashboardError {
    pub fn fetch(query: &str, err: impl std::fmt::Display) -> Self {
        DashboardError::DataFetch {
            query: query.to_string(),
            message: format!("{err:#}"),
        }
    }

    pub fn malformed(row: usize, reason: impl Into<String>) -> Self {
        DashboardError::MalformedRecord {
            row,
            reason: reason.into(),
        }
    }
}
