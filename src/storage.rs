use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct StoragePaths {
    pub download_dir: PathBuf,
}

impl StoragePaths {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir: PathBuf = data_dir.into();
        Self {
            download_dir: data_dir.join("downloads"),
        }
    }

    /// Local snapshot path for a sheet URL. Sheets are keyed by document id and tab gid.
    pub fn sheet_csv(&self, url: &str) -> PathBuf {
        let stem = match crate::download::sheet_id(url) {
            Some(id) => match crate::download::sheet_gid(url) {
                Some(gid) => format!("sheet_{id}_{gid}"),
                None => format!("sheet_{id}"),
            },
            None => sanitize_file_stem(url),
        };
        self.download_dir.join(format!("{stem}.csv"))
    }

    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.download_dir)?;
        Ok(())
    }
}

fn sanitize_file_stem(s: &str) -> String {
    let s = s
        .trim_start_matches("https://")
        .trim_start_matches("http://");
    let mut out: String = s
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(96)
        .collect();
    if out.is_empty() {
        out.push_str("download");
    }
    out
}

pub fn file_present_nonempty(path: &Path) -> bool {
    match std::fs::metadata(path) {
        Ok(m) => m.is_file() && m.len() > 0,
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sheet_snapshots_are_keyed_by_id_and_gid() {
        let paths = StoragePaths::new("/tmp/rx");
        let p = paths.sheet_csv("https://docs.google.com/spreadsheets/d/abc123/edit#gid=42");
        assert_eq!(p, PathBuf::from("/tmp/rx/downloads/sheet_abc123_42.csv"));
        let p = paths.sheet_csv("https://docs.google.com/spreadsheets/d/abc123/edit");
        assert_eq!(p, PathBuf::from("/tmp/rx/downloads/sheet_abc123.csv"));
    }

    #[test]
    fn other_urls_get_a_sanitized_name() {
        let paths = StoragePaths::new("/tmp/rx");
        let p = paths.sheet_csv("https://example.org/data/fills.csv?x=1");
        assert_eq!(
            p,
            PathBuf::from("/tmp/rx/downloads/example_org_data_fills_csv_x_1.csv")
        );
    }
}
