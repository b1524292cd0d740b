mod aggregate;
mod cache;
mod cli;
mod county;
mod download;
mod error;
mod export;
mod filter;
mod pipeline;
mod range;
mod record;
mod server;
mod source;
mod storage;

use anyhow::Context;
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = cli::Args::parse();

    match args.cmd {
        cli::Command::Serve(cmd) => server::run(cmd).await.context("serve failed"),
        cli::Command::Export(cmd) => export::run(cmd).await.context("export failed"),
    }
}
