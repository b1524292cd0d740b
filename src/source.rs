use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, anyhow};
use duckdb::Connection;
use tokio::sync::Mutex;

use crate::cache::CachedSource;
use crate::cli::SourceArgs;
use crate::county::CountyCodes;
use crate::download;
use crate::error::DashboardError;
use crate::record::{Record, records_from_table};
use crate::storage::StoragePaths;

/// Materialized query result: column names plus rows of nullable text cells.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

pub trait DataSource: Send + Sync {
    fn execute(
        &self,
        query: &str,
    ) -> impl Future<Output = Result<RawTable, DashboardError>> + Send;
}

/// Query that reads a whole sheet (or local CSV), addressed by its quoted location.
pub fn table_query(location: &str) -> String {
    format!("SELECT * FROM \"{}\"", location.replace('"', "\"\""))
}

/// Runs queries on an in-memory DuckDB. A double-quoted table name that is an http(s) URL or a
/// `.csv` path is read as CSV; URLs are downloaded first (Google Sheets via their CSV export).
pub struct SpreadsheetSource {
    conn: Mutex<Connection>,
    client: reqwest::Client,
    paths: StoragePaths,
}

impl SpreadsheetSource {
    pub fn open(paths: StoragePaths) -> anyhow::Result<Self> {
        paths.ensure_dirs().context("create data directories")?;
        let conn = Connection::open_in_memory().context("open in-memory duckdb")?;
        Ok(Self {
            conn: Mutex::new(conn),
            client: reqwest::Client::new(),
            paths,
        })
    }

    async fn resolve_tables(&self, query: &str) -> anyhow::Result<String> {
        let mut sql = String::with_capacity(query.len());
        let mut rest = query;
        while let Some((before, quoted, after)) = next_quoted(rest) {
            sql.push_str(before);
            match self.local_csv_for(&quoted).await? {
                Some(path) => sql.push_str(&format!(
                    "read_csv('{}', header = true, all_varchar = true)",
                    sql_quote_path(&path)
                )),
                None => {
                    sql.push('"');
                    sql.push_str(&quoted.replace('"', "\"\""));
                    sql.push('"');
                }
            }
            rest = after;
        }
        sql.push_str(rest);
        Ok(sql)
    }

    async fn local_csv_for(&self, location: &str) -> anyhow::Result<Option<PathBuf>> {
        if location.starts_with("https://") || location.starts_with("http://") {
            let dest = self.paths.sheet_csv(location);
            download::fetch_sheet_csv(&self.client, location, &dest).await?;
            return Ok(Some(dest));
        }
        let path = PathBuf::from(location);
        let is_csv = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("csv"))
            .unwrap_or(false);
        if !is_csv {
            return Ok(None);
        }
        if !path.is_file() {
            return Err(anyhow!("source file not found: {}", path.display()));
        }
        Ok(Some(path))
    }
}

impl DataSource for SpreadsheetSource {
    async fn execute(&self, query: &str) -> Result<RawTable, DashboardError> {
        let sql = self
            .resolve_tables(query)
            .await
            .map_err(|e| DashboardError::fetch(query, e))?;
        let db = self.conn.lock().await;
        run_query(&db, &sql).map_err(|e| DashboardError::fetch(query, e))
    }
}

/// Splits off the first double-quoted identifier, unescaping doubled quotes.
fn next_quoted(s: &str) -> Option<(&str, String, &str)> {
    let open = s.find('"')?;
    let body = &s[open + 1..];
    let mut out = String::new();
    let mut chars = body.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if c == '"' {
            if matches!(chars.peek(), Some((_, '"'))) {
                out.push('"');
                chars.next();
                continue;
            }
            return Some((&s[..open], out, &body[i + 1..]));
        }
        out.push(c);
    }
    None
}

fn run_query(conn: &Connection, sql: &str) -> anyhow::Result<RawTable> {
    let sql = sql.trim().trim_end_matches(';');

    let columns = {
        let mut stmt = conn
            .prepare(&format!("DESCRIBE {sql}"))
            .context("describe query")?;
        let rows = stmt.query_map([], |row| row.get::<usize, String>(0))?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        out
    };

    let n = columns.len();
    let mut stmt = conn
        .prepare(&format!("SELECT COLUMNS(*)::VARCHAR FROM ({sql}) AS src"))
        .context("prepare query")?;
    let rows = stmt.query_map([], |row| {
        let mut cells = Vec::with_capacity(n);
        for i in 0..n {
            cells.push(row.get::<usize, Option<String>>(i)?);
        }
        Ok(cells)
    })?;
    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }

    Ok(RawTable { columns, rows: out })
}

fn sql_quote_path(path: &Path) -> String {
    // DuckDB expects single-quoted string literals; escape embedded single quotes.
    path.display().to_string().replace('\'', "''")
}

/// Everything a command needs to fetch and join the dataset.
pub struct SourceContext {
    pub source: CachedSource<SpreadsheetSource>,
    pub query: String,
    pub location: String,
    pub county_codes: CountyCodes,
}

impl SourceContext {
    pub fn open(opts: &SourceArgs) -> anyhow::Result<Self> {
        let location = match (&opts.sheet_url, &opts.source_file) {
            (Some(url), _) => url.clone(),
            (None, Some(file)) => file.clone(),
            (None, None) => {
                return Err(anyhow!(
                    "no data source: pass --sheet-url (or set PUBLIC_GSHEETS_URL) or --source-file"
                ));
            }
        };

        let county_codes = CountyCodes::load(Path::new(&opts.county_codes))?;
        let inner = SpreadsheetSource::open(StoragePaths::new(&opts.data_dir))?;
        let source = CachedSource::new(inner, Duration::from_secs(opts.cache_ttl_secs));

        tracing::info!(
            "data source: {} (cache ttl {}s)",
            location,
            opts.cache_ttl_secs
        );
        Ok(Self {
            source,
            query: table_query(&location),
            location,
            county_codes,
        })
    }

    /// Fetches (through the cache) and decodes the full record set.
    pub async fn load_records(&self) -> Result<Vec<Record>, DashboardError> {
        let table = self.source.execute(&self.query).await?;
        records_from_table(&table)
    }
}
