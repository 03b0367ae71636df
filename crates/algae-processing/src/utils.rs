//! Shared parsing helpers for spreadsheet-derived cells.
//!
//! Spreadsheet exports carry stray spaces, percent signs and error
//! markers such as `#N/A`; these helpers turn such cells into typed values
//! or into "missing".

use chrono::{NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;

// =============================================================================
// Numeric Cells
// =============================================================================

/// Characters commonly used in numeric formatting that should be stripped.
///
/// Commas are left alone; a cell containing one does not parse.
pub const NUMERIC_FORMAT_CHARS: [char; 3] = ['%', ' ', '\u{a0}'];

/// Common error/missing value markers in data.
pub const ERROR_MARKERS: [&str; 10] = [
    "error", "unknown", "n/a", "na", "nan", "null", "missing", "none", "#n/a", "-",
];

/// Clean a string for numeric parsing by removing formatting characters.
pub fn clean_numeric_string(s: &str) -> String {
    let mut result = s.trim().to_string();
    for c in NUMERIC_FORMAT_CHARS {
        result = result.replace(c, "");
    }
    result
}

/// Check if a string is an error/missing value marker.
pub fn is_error_marker(s: &str) -> bool {
    let lower = s.trim().to_ascii_lowercase();
    ERROR_MARKERS.iter().any(|&marker| lower == marker)
}

/// Parse a numeric cell, returning `None` for anything that is not a
/// finite number.
pub fn parse_numeric_cell(s: &str) -> Option<f64> {
    if is_error_marker(s) {
        return None;
    }
    let cleaned = clean_numeric_string(s);
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parse an integer cell such as a year, tolerating a trailing `.0`.
pub fn parse_integer_cell(s: &str) -> Option<i32> {
    let value = parse_numeric_cell(s)?;
    if value.fract() != 0.0 || value < i32::MIN as f64 || value > i32::MAX as f64 {
        return None;
    }
    Some(value as i32)
}

// =============================================================================
// Date Cells
// =============================================================================

static ISO_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}[-/]\d{1,2}[-/]\d{1,2}").expect("Invalid regex: YYYY-MM-DD"));
static DAY_FIRST_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{1,2}[-/]\d{1,2}[-/]\d{4}").expect("Invalid regex: DD-MM-YYYY"));

/// Parse a date cell.
///
/// Accepts `YYYY-MM-DD`, `YYYY/MM/DD`, either with a trailing time
/// (`YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DDTHH:MM:SS`), and day-first
/// `DD/MM/YYYY` as used by the source spreadsheets.
pub fn parse_date_cell(s: &str) -> Option<NaiveDate> {
    let trimmed = s.trim();
    if trimmed.is_empty() || is_error_marker(trimmed) {
        return None;
    }

    if ISO_DATE.is_match(trimmed) {
        let normalized = trimmed.replace('/', "-");
        if let Ok(date) = NaiveDate::parse_from_str(&normalized, "%Y-%m-%d") {
            return Some(date);
        }
        for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"] {
            if let Ok(datetime) = NaiveDateTime::parse_from_str(&normalized, format) {
                return Some(datetime.date());
            }
        }
        return None;
    }

    if DAY_FIRST_DATE.is_match(trimmed) {
        let normalized = trimmed.replace('-', "/");
        return NaiveDate::parse_from_str(&normalized, "%d/%m/%Y").ok();
    }

    None
}

// =============================================================================
// Header Cells
// =============================================================================

/// Normalize a header for alias matching: lowercase, trimmed, with spaces
/// and dashes folded into underscores.
pub fn normalize_header(header: &str) -> String {
    header
        .trim()
        .to_ascii_lowercase()
        .replace([' ', '-'], "_")
}
