use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use tokio::io::AsyncWriteExt;

use crate::storage::file_present_nonempty;

const SHEETS_BASE: &str = "https://docs.google.com/spreadsheets/d";

/// Document id of a Google Sheets URL (`.../spreadsheets/d/<id>/...`).
pub fn sheet_id(url: &str) -> Option<&str> {
    let rest = url.split("/spreadsheets/d/").nth(1)?;
    let id = rest.split(['/', '?', '#']).next()?;
    if id.is_empty() { None } else { Some(id) }
}

/// Tab id from a `gid=` query parameter or fragment.
pub fn sheet_gid(url: &str) -> Option<&str> {
    let (_, rest) = url.split_once("gid=")?;
    let gid = rest.split(['&', '#']).next()?;
    if !gid.is_empty() && gid.chars().all(|c| c.is_ascii_digit()) {
        Some(gid)
    } else {
        None
    }
}

/// CSV export URL for a published sheet; non-Sheets URLs are fetched as given.
pub fn sheet_export_url(url: &str) -> String {
    let Some(id) = sheet_id(url) else {
        return url.to_string();
    };
    match sheet_gid(url) {
        Some(gid) => format!("{SHEETS_BASE}/{id}/export?format=csv&gid={gid}"),
        None => format!("{SHEETS_BASE}/{id}/export?format=csv"),
    }
}

/// Downloads the sheet as CSV into `dest`, replacing any previous snapshot.
pub async fn fetch_sheet_csv(
    client: &reqwest::Client,
    sheet_url: &str,
    dest: &Path,
) -> anyhow::Result<()> {
    let url = sheet_export_url(sheet_url);
    download_to(client, &url, dest).await?;
    if !file_present_nonempty(dest) {
        return Err(anyhow!("sheet export at {} was empty", url));
    }
    Ok(())
}

async fn download_to(client: &reqwest::Client, url: &str, dest: &Path) -> anyhow::Result<()> {
    let tmp = tmp_path(dest);
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await.ok();
    }

    tracing::info!("Downloading {} -> {}", url, dest.display());

    let resp = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("GET {url}"))?;

    if !resp.status().is_success() {
        return Err(anyhow!("Download failed ({}): {}", resp.status(), url));
    }

    let mut file = tokio::fs::File::create(&tmp)
        .await
        .with_context(|| format!("create {}", tmp.display()))?;

    let mut downloaded: u64 = 0;
    let mut stream = resp.bytes_stream();
    use futures_util::StreamExt;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.with_context(|| format!("read body chunk from {url}"))?;
        downloaded += chunk.len() as u64;
        file.write_all(&chunk).await?;
    }

    file.flush().await?;
    drop(file);

    tokio::fs::rename(&tmp, dest)
        .await
        .with_context(|| format!("rename {} -> {}", tmp.display(), dest.display()))?;

    tracing::info!("Downloaded {} KB from {}", downloaded / 1024, url);
    Ok(())
}

fn tmp_path(dest: &Path) -> PathBuf {
    let fname = dest
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("download");
    dest.with_file_name(format!("{fname}.part"))
}
