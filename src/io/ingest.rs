//! Catalog and interval-table ingest.
//!
//! This module turns the two tabular inputs of a batch run into typed values:
//!
//! - the stellar catalog (comma-separated, one row per star)
//! - the iron-line interval table (tab-separated, loaded once per run)
//!
//! Design goals:
//! - **Strict schema** for required columns (clear errors + exit code 2)
//! - **Row-level validation** for the catalog (skip bad rows, but report them)
//! - the interval table is all-or-nothing, since it defines the fit itself

use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::StringRecord;
use tracing::warn;

use crate::domain::{Interval, StarRecord};
use crate::error::VsiniError;

const CATALOG_COLUMNS: [&str; 9] = [
    "star_name", "fits_name", "Teff", "eTeff", "logg", "feh", "efeh", "vtur", "instr_broad",
];
const INTERVAL_COLUMNS: [&str; 4] = ["ll_li", "ll_lf", "ll_si", "ll_sf"];

/// A catalog row that could not be used.
#[derive(Debug, Clone)]
pub struct RowError {
    pub line: usize,
    pub message: String,
}

/// Parsed catalog plus any rejected rows.
#[derive(Debug, Clone)]
pub struct Catalog {
    pub stars: Vec<StarRecord>,
    pub row_errors: Vec<RowError>,
}

pub fn load_catalog(path: &Path) -> Result<Catalog, VsiniError> {
    let file = open(path)?;
    read_catalog(file)
}

pub fn read_catalog<R: Read>(reader: R) -> Result<Catalog, VsiniError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let headers = reader
        .headers()
        .map_err(|e| VsiniError::Catalog(format!("cannot read catalog header: {e}")))?
        .clone();
    ensure_columns(&headers, &CATALOG_COLUMNS)?;

    let mut stars = Vec::new();
    let mut row_errors = Vec::new();
    for (idx, result) in reader.deserialize::<StarRecord>().enumerate() {
        // +2: header is line 1, records are 1-based.
        let line = idx + 2;
        match result {
            Ok(star) if star.name.is_empty() => row_errors.push(RowError {
                line,
                message: "empty star_name".to_string(),
            }),
            Ok(star) => stars.push(star),
            Err(e) => row_errors.push(RowError {
                line,
                message: e.to_string(),
            }),
        }
    }

    for err in &row_errors {
        warn!(line = err.line, "skipping catalog row: {}", err.message);
    }

    Ok(Catalog { stars, row_errors })
}

pub fn load_intervals(path: &Path) -> Result<Vec<Interval>, VsiniError> {
    let file = open(path)?;
    read_intervals(file)
}

/// Parse a tab-separated interval table, preserving row order.
pub fn read_intervals<R: Read>(reader: R) -> Result<Vec<Interval>, VsiniError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .trim(csv::Trim::All)
        .from_reader(reader);
    let headers = reader
        .headers()
        .map_err(|e| VsiniError::Catalog(format!("cannot read interval header: {e}")))?
        .clone();
    ensure_columns(&headers, &INTERVAL_COLUMNS)?;

    let mut intervals = Vec::new();
    for (idx, result) in reader.deserialize::<Interval>().enumerate() {
        let line = idx + 2;
        let interval = result.map_err(|e| VsiniError::Catalog(format!("interval line {line}: {e}")))?;
        if !interval.is_nested() {
            return Err(VsiniError::Catalog(format!(
                "interval line {line}: small window [{}, {}] is not nested in [{}, {}]",
                interval.small_start, interval.small_end, interval.large_start, interval.large_end
            )));
        }
        intervals.push(interval);
    }

    if intervals.is_empty() {
        return Err(VsiniError::Catalog("interval table has no rows".to_string()));
    }
    Ok(intervals)
}

fn open(path: &Path) -> Result<File, VsiniError> {
    File::open(path).map_err(|e| VsiniError::Catalog(format!("cannot open '{}': {e}", path.display())))
}

fn ensure_columns(headers: &StringRecord, required: &[&str]) -> Result<(), VsiniError> {
    let missing: Vec<&str> = required
        .iter()
        .copied()
        .filter(|col| !headers.iter().any(|h| normalize_header_name(h) == *col))
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(VsiniError::Catalog(format!("missing column(s): {}", missing.join(", "))))
    }
}

fn normalize_header_name(name: &str) -> &str {
    // Spreadsheet exports sometimes prefix the first header with a BOM.
    name.trim().trim_start_matches('\u{feff}')
}
