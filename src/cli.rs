use clap::{Parser, Subcommand};

const DEFAULT_DATA_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/data");
const DEFAULT_COUNTY_CODES: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/data/county_codes.csv");

#[derive(Parser, Debug)]
#[command(name = "rx-dashboard")]
#[command(about = "Arizona buprenorphine fills dashboard backend (Sheets + DuckDB)", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the dashboard HTTP API.
    Serve(ServeArgs),
    /// Write the filtered CSV download for one selection.
    Export(ExportArgs),
}

#[derive(clap::Args, Debug, Clone)]
pub struct SourceArgs {
    /// Published Google Sheets URL with the fill records.
    #[arg(long, env = "PUBLIC_GSHEETS_URL", conflicts_with = "source_file")]
    pub sheet_url: Option<String>,

    /// Local CSV with the same columns as the sheet (used instead of --sheet-url).
    #[arg(long)]
    pub source_file: Option<String>,

    /// Working directory for downloaded sheet snapshots.
    #[arg(long, default_value = DEFAULT_DATA_DIR)]
    pub data_dir: String,

    /// County name -> county code table (CSV with county,county_code).
    #[arg(long, default_value = DEFAULT_COUNTY_CODES)]
    pub county_codes: String,

    /// How long a fetched sheet is reused before it is queried again.
    #[arg(long, default_value_t = 600)]
    pub cache_ttl_secs: u64,
}

#[derive(clap::Args, Debug, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    #[arg(long, default_value_t = 8787)]
    pub port: u16,
}

#[derive(clap::Args, Debug, Clone)]
pub struct ExportArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// First month (YYYY-MM or YYYY-MM-DD). Defaults to the earliest month in the data.
    #[arg(long)]
    pub start: Option<String>,

    /// Last month (YYYY-MM or YYYY-MM-DD). Omit with --start to export a single month.
    #[arg(long)]
    pub end: Option<String>,

    /// Pharmacy county to include; repeat for several. Defaults to every Arizona county.
    #[arg(long)]
    pub county: Vec<String>,

    /// Directory the CSV is written into.
    #[arg(long, default_value = ".")]
    pub out_dir: String,
}
