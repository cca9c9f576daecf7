//! Oil reference sheet import
//!
//! Reads `*.csv` sheets with one oil per line:
//! `name, sap, ins, lauric, myristic, palmitic, stearic, ricinoleic, oleic, linoleic, linolenic`
//! Commas or semicolons separate fields. `#` starts a comment line and a
//! leading header line is skipped.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use regex::Regex;
use rusqlite::Connection;
use walkdir::WalkDir;

use crate::db;
use crate::models::{FattyAcid, FattyAcidProfile, OilSpec};

const FIELD_COUNT: usize = 3 + FattyAcid::ALL.len();

/// One parsed line of an oil sheet
#[derive(Debug, PartialEq)]
enum SheetLine {
    Oil(OilSpec),
    Header,
    Malformed(String),
}

/// Find all oil sheets under a directory
pub fn find_oil_sheets(dir: &Path) -> Vec<PathBuf> {
    let mut sheets: Vec<PathBuf> = WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .map(|e| e.into_path())
        .filter(|p| {
            p.is_file() && p.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
        })
        .collect();
    sheets.sort();
    sheets
}

fn parse_line(separator: &Regex, line: &str, first: bool) -> SheetLine {
    let fields: Vec<&str> = separator.split(line.trim()).collect();
    if fields.len() != FIELD_COUNT {
        return SheetLine::Malformed(format!(
            "expected {} fields, found {}",
            FIELD_COUNT,
            fields.len()
        ));
    }

    let numbers: Result<Vec<f64>, _> = fields[1..].iter().map(|f| f.parse::<f64>()).collect();
    let numbers = match numbers {
        Ok(n) => n,
        Err(_) if first => return SheetLine::Header,
        Err(e) => return SheetLine::Malformed(e.to_string()),
    };

    let name = fields[0].trim_matches('"');
    if name.is_empty() {
        return SheetLine::Malformed("empty oil name".to_string());
    }

    let mut fatty_acids = FattyAcidProfile::default();
    for (acid, value) in FattyAcid::ALL.iter().zip(&numbers[2..]) {
        *fatty_acids.get_mut(*acid) = *value;
    }

    SheetLine::Oil(OilSpec {
        name: name.to_string(),
        sap: numbers[0],
        ins: numbers[1],
        fatty_acids,
    })
}

/// Parse an oil sheet's text, returning the oils and the number of bad lines
fn parse_sheet(content: &str) -> Result<(Vec<OilSpec>, usize)> {
    let separator = Regex::new(r"\s*[,;]\s*")?;
    let mut oils = Vec::new();
    let mut malformed = 0;
    let mut first = true;

    for (number, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        match parse_line(&separator, trimmed, first) {
            SheetLine::Oil(oil) => oils.push(oil),
            SheetLine::Header => {}
            SheetLine::Malformed(reason) => {
                log::warn!("  line {}: {}", number + 1, reason);
                malformed += 1;
            }
        }
        first = false;
    }

    Ok((oils, malformed))
}

/// Import every oil sheet under a directory into the database
pub fn import_to_database(conn: &Connection, dir: &Path) -> Result<ImportStats> {
    let mut stats = ImportStats::default();

    log::info!("Scanning {} for oil sheets...", dir.display());
    let sheets = find_oil_sheets(dir);
    log::info!("Found {} oil sheets", sheets.len());

    for path in &sheets {
        let parsed = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))
            .and_then(|content| parse_sheet(&content));

        match parsed {
            Ok((oils, malformed)) => {
                for oil in &oils {
                    db::upsert_oil(conn, oil)?;
                }
                log::info!(
                    "  Parsed: {} ({} oils, {} malformed lines)",
                    path.display(),
                    oils.len(),
                    malformed
                );
                stats.sheets += 1;
                stats.oils += oils.len();
                stats.malformed += malformed;
            }
            Err(e) => {
                log::error!("  Error reading {}: {:#}", path.display(), e);
                stats.errors += 1;
            }
        }
    }

    Ok(stats)
}

#[derive(Debug, Default)]
pub struct ImportStats {
    pub sheets: usize,
    pub oils: usize,
    pub malformed: usize,
    pub errors: usize,
}

impl std::fmt::Display for ImportStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Imported {} oils from {} sheets. Malformed lines: {}, Errors: {}",
            self.oils, self.sheets, self.malformed, self.errors
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHEET: &str = "\
name, sap, ins, lauric, myristic, palmitic, stearic, ricinoleic, oleic, linoleic, linolenic
# hard oils
Coconut Oil, 0.183, 258, 48, 19, 9, 3, 0, 8, 2, 0
Castor Oil; 0.128; 95; 0; 0; 0; 0; 90; 4; 4; 0
Broken Oil, 0.1, lots, 0, 0, 0, 0, 0, 0, 0, 0
Short Oil, 0.1, 100
";

    #[test]
    fn parses_oils_and_counts_bad_lines() {
        let (oils, malformed) = parse_sheet(SHEET).unwrap();

        assert_eq!(oils.len(), 2);
        assert_eq!(malformed, 2);
        assert_eq!(oils[0].name, "Coconut Oil");
        assert_eq!(oils[0].fatty_acids.lauric, 48.0);
        assert_eq!(oils[1].sap, 0.128);
        assert_eq!(oils[1].fatty_acids.ricinoleic, 90.0);
    }

    #[test]
    fn header_only_skipped_on_first_line() {
        let sheet = "Olive Oil, 0.135, 109, 0, 0, 14, 3, 0, 69, 12, 1\n\
                     name, sap, ins, a, b, c, d, e, f, g, h\n";
        let (oils, malformed) = parse_sheet(sheet).unwrap();
        assert_eq!(oils.len(), 1);
        assert_eq!(malformed, 1);
    }

    #[test]
    fn imports_sheets_from_nested_directories() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("butters")).unwrap();
        fs::write(dir.path().join("liquid.csv"), SHEET).unwrap();
        fs::write(
            dir.path().join("butters/shea.CSV"),
            "Shea Butter, 0.128, 116, 0, 0, 5, 40, 0, 48, 6, 0\n",
        )
        .unwrap();
        fs::write(dir.path().join("notes.txt"), "not an oil sheet").unwrap();

        let conn = Connection::open_in_memory().unwrap();
        db::init_schema(&conn).unwrap();
        let stats = import_to_database(&conn, dir.path()).unwrap();

        assert_eq!(stats.sheets, 2);
        assert_eq!(stats.oils, 3);
        assert_eq!(stats.malformed, 2);
        assert!(db::get_oil(&conn, "Shea Butter").unwrap().is_some());
        assert_eq!(db::list_oils(&conn).unwrap().len(), 3);
    }
}
