// =============================================================================
// Entity Resolution — maps free text to ticker symbols
// =============================================================================
//
// Two matching rules:
//   1. `$TICKER` cashtags are accepted as-is, uppercased, with no check
//      against the alias table.  Only the first five letters after `$` count,
//      so `$ABCDEFG` resolves to ABCDE.
//   2. Company names and aliases from the alias table are matched
//      case-insensitively on word boundaries ("for" never matches "Ford").
//
// The alias table is a JSON array of `{ symbol, name, aliases[] }`.  Several
// candidate files may be configured; the first one that exists wins.
// =============================================================================

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use regex::Regex;
use serde::Deserialize;
use tracing::{info, warn};

/// Resolves ticker mentions in text.
pub trait EntityResolver: Send + Sync {
    fn resolve(&self, text: &str) -> BTreeSet<String>;
}

/// One row of the alias table.
#[derive(Debug, Clone, Deserialize)]
pub struct CompanyEntry {
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
}

/// Alias-table resolver with precompiled word-boundary patterns.
pub struct AliasTable {
    cashtag: Regex,
    aliases: Vec<(Regex, String)>,
}

impl AliasTable {
    /// Build from in-memory entries. Rows without a symbol are skipped.
    pub fn from_entries(entries: &[CompanyEntry]) -> Result<Self> {
        let cashtag = Regex::new(r"\$([A-Za-z]{1,5})").context("invalid cashtag pattern")?;

        let mut aliases = Vec::new();
        for entry in entries {
            let Some(symbol) = entry.symbol.as_deref().filter(|s| !s.is_empty()) else {
                continue;
            };
            let names = entry.name.iter().chain(entry.aliases.iter());
            for alias in names {
                let alias = alias.trim().to_lowercase();
                if alias.is_empty() {
                    continue;
                }
                let pattern = format!(r"\b{}\b", regex::escape(&alias));
                let re = Regex::new(&pattern)
                    .with_context(|| format!("invalid alias pattern for {symbol}: {alias}"))?;
                aliases.push((re, symbol.to_string()));
            }
        }

        Ok(Self { cashtag, aliases })
    }

    /// Load the first alias file that exists. No file at all yields an empty
    /// table (cashtags still resolve).
    pub fn load(candidates: &[PathBuf]) -> Result<Self> {
        for path in candidates {
            if path.exists() {
                let entries = read_entries(path)?;
                let table = Self::from_entries(&entries)?;
                info!(
                    path = %path.display(),
                    companies = entries.len(),
                    aliases = table.alias_count(),
                    "alias table loaded"
                );
                return Ok(table);
            }
        }
        warn!(?candidates, "no alias table found — resolving cashtags only");
        Self::from_entries(&[])
    }

    pub fn alias_count(&self) -> usize {
        self.aliases.len()
    }
}

impl EntityResolver for AliasTable {
    fn resolve(&self, text: &str) -> BTreeSet<String> {
        let mut found = BTreeSet::new();

        for cap in self.cashtag.captures_iter(text) {
            if let Some(m) = cap.get(1) {
                found.insert(m.as_str().to_uppercase());
            }
        }

        let lowered = text.to_lowercase();
        for (re, symbol) in &self.aliases {
            if re.is_match(&lowered) {
                found.insert(symbol.clone());
            }
        }

        found
    }
}

fn read_entries(path: &Path) -> Result<Vec<CompanyEntry>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read alias table {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("failed to parse alias table {}", path.display()))
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> AliasTable {
        let entries: Vec<CompanyEntry> = serde_json::from_str(
            r#"[
                {"symbol": "AAPL", "name": "Apple Inc", "aliases": ["iphone", "macbook", "apple"]},
                {"symbol": "TSLA", "name": "Tesla", "aliases": ["cybertruck", "model 3"]},
                {"symbol": "NVO", "name": "Novo Nordisk", "aliases": ["ozempic", "wegovy"]},
                {"symbol": "F", "name": "Ford", "aliases": []},
                {"name": "No Symbol Corp", "aliases": ["nosym"]}
            ]"#,
        )
        .unwrap();
        AliasTable::from_entries(&entries).unwrap()
    }

    #[test]
    fn resolves_aliases_and_cashtags() {
        let t = table();
        let found = t.resolve("I just bought a new iPhone and it's amazing! $AAPL");
        assert_eq!(found, BTreeSet::from(["AAPL".to_string()]));

        let found = t.resolve("Ozempic is changing everything.");
        assert_eq!(found, BTreeSet::from(["NVO".to_string()]));
    }

    #[test]
    fn cashtags_are_uppercased_without_table_check() {
        let t = table();
        let found = t.resolve("loading up on $gme and $Amc");
        assert!(found.contains("GME"));
        assert!(found.contains("AMC"));
    }

    #[test]
    fn matching_respects_word_boundaries() {
        let t = table();
        assert!(t.resolve("this is for the fans").is_empty());
        assert!(t.resolve("pineapples everywhere").is_empty());
        assert!(t.resolve("new Ford truck").contains("F"));
    }

    #[test]
    fn multi_word_aliases_match() {
        let t = table();
        assert!(t.resolve("Delivered my MODEL 3 today").contains("TSLA"));
    }

    #[test]
    fn overlong_cashtags_keep_their_first_five_letters() {
        let t = table();
        let found = t.resolve("$ABCDEFG to the moon");
        assert_eq!(found, BTreeSet::from(["ABCDE".to_string()]));
    }

    #[test]
    fn rows_without_symbol_are_skipped() {
        let t = table();
        assert!(t.resolve("nosym rally").is_empty());
    }

    #[test]
    fn first_existing_file_wins() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("sp500.json");
        let manual = dir.path().join("companies.json");
        std::fs::write(&manual, r#"[{"symbol": "OC", "name": "Owens Corning"}]"#).unwrap();

        let t = AliasTable::load(&[missing, manual]).unwrap();
        assert_eq!(t.alias_count(), 1);
        assert!(t.resolve("owens corning shingles").contains("OC"));
    }

    #[test]
    fn no_table_still_resolves_cashtags() {
        let dir = tempfile::tempdir().unwrap();
        let t = AliasTable::load(&[dir.path().join("missing.json")]).unwrap();
        assert_eq!(t.alias_count(), 0);
        assert!(t.resolve("$TSLA").contains("TSLA"));
    }
}
