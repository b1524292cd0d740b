use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use anyhow::{Context, anyhow};
use serde::Deserialize;

/// Arizona counties, sorted descending by population. The order is for display only.
pub const ALL_AZ_COUNTIES: [&str; 15] = [
    "Maricopa",
    "Pima",
    "Pinal",
    "Yavapai",
    "Mohave",
    "Yuma",
    "Coconino",
    "Cochise",
    "Navajo",
    "Apache",
    "Gila",
    "Santa Cruz",
    "Graham",
    "La Paz",
    "Greenlee",
];

/// Normalizes a county name: trims, collapses inner whitespace, and upper-cases the first letter
/// of every word while lower-casing the rest ("  SANTA   cruz" -> "Santa Cruz").
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for (i, word) in s.split_whitespace().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let mut prev_alpha = false;
        for ch in word.chars() {
            if ch.is_alphabetic() {
                if prev_alpha {
                    out.extend(ch.to_lowercase());
                } else {
                    out.extend(ch.to_uppercase());
                }
                prev_alpha = true;
            } else {
                out.push(ch);
                prev_alpha = false;
            }
        }
    }
    out
}

/// Set of selected county names, stored title-cased.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CountySelection {
    names: BTreeSet<String>,
}

impl CountySelection {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let names = names
            .into_iter()
            .map(|n| title_case(n.as_ref()))
            .filter(|n| !n.is_empty())
            .collect();
        Self { names }
    }

    /// The "select all" reset.
    pub fn all() -> Self {
        Self::new(ALL_AZ_COUNTIES)
    }

    /// Builds a selection from user input, dropping names outside the Arizona county list.
    pub fn from_user_input<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let known = Self::all();
        let mut out = Self::default();
        for name in names {
            let name = title_case(name.as_ref());
            if known.contains(&name) {
                out.names.insert(name);
            } else {
                tracing::debug!("ignoring unknown county '{}'", name);
            }
        }
        out
    }

    pub fn contains(&self, title_cased: &str) -> bool {
        self.names.contains(title_cased)
    }

    pub fn matches(&self, raw_county: &str) -> bool {
        self.contains(&title_case(raw_county))
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Selected names in display (population) order; names outside the Arizona list go last.
    pub fn display_order(&self) -> Vec<String> {
        let mut out: Vec<String> = ALL_AZ_COUNTIES
            .iter()
            .filter(|c| self.names.contains(**c))
            .map(|c| c.to_string())
            .collect();
        out.extend(
            self.names
                .iter()
                .filter(|n| !ALL_AZ_COUNTIES.contains(&n.as_str()))
                .cloned(),
        );
        out
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct CountyCodeEntry {
    #[serde(rename = "county")]
    pub county_name: String,
    pub county_code: u32,
}

/// Immutable county name -> code lookup, keyed by title-cased name.
#[derive(Debug, Clone, Default)]
pub struct CountyCodes {
    by_name: HashMap<String, u32>,
}

impl CountyCodes {
    pub fn from_entries(entries: impl IntoIterator<Item = CountyCodeEntry>) -> Self {
        let by_name = entries
            .into_iter()
            .map(|e| (title_case(&e.county_name), e.county_code))
            .collect();
        Self { by_name }
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_path(path)
            .with_context(|| format!("open county codes {}", path.display()))?;
        let mut entries = Vec::new();
        for (i, row) in reader.deserialize::<CountyCodeEntry>().enumerate() {
            let entry = row.with_context(|| format!("county codes row {}", i + 1))?;
            entries.push(entry);
        }
        if entries.is_empty() {
            return Err(anyhow!("county codes file {} has no rows", path.display()));
        }
        let codes = Self::from_entries(entries);
        tracing::info!("Loaded {} county codes from {}", codes.len(), path.display());
        Ok(codes)
    }

    pub fn code_for(&self, title_cased: &str) -> Option<u32> {
        self.by_name.get(title_cased).copied()
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }
}
