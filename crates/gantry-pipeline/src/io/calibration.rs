//! External calibration table.
//!
//! One image per line: `key X Y Z [a1 a2 a3]`, separated by commas or
//! whitespace. Blank lines and `#` comments are ignored, as is a header line
//! whose coordinate columns are not numeric.

use std::fs;
use std::path::Path;

use crate::stages::ingest::CalibrationRow;

use super::DataError;

fn split_fields(line: &str) -> Vec<&str> {
    if line.contains(',') {
        line.split(',').map(str::trim).collect()
    } else {
        line.split_whitespace().collect()
    }
}

fn looks_like_header(fields: &[&str]) -> bool {
    fields[1..4].iter().all(|f| f.parse::<f64>().is_err())
}

/// Parse the table into rows. Numeric fields stay textual; ingestion decides
/// what to do with values that do not parse.
pub fn parse_calibration_table(text: &str) -> Vec<CalibrationRow> {
    let mut rows = Vec::new();
    let mut seen_data = false;
    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fields = split_fields(line);
        if fields.len() < 4 {
            log::warn!("calibration line {}: expected at least 4 fields", lineno + 1);
            continue;
        }
        if !seen_data && looks_like_header(&fields) {
            log::debug!("calibration line {}: skipping header", lineno + 1);
            seen_data = true;
            continue;
        }
        seen_data = true;
        rows.push(CalibrationRow {
            key: fields[0].to_string(),
            fields: fields[1..].iter().map(|f| f.to_string()).collect(),
        });
    }
    rows
}

pub fn load_calibration_table(path: &Path) -> Result<Vec<CalibrationRow>, DataError> {
    let text = fs::read_to_string(path).map_err(|e| DataError::io(path, e))?;
    let rows = parse_calibration_table(&text);
    log::info!("read {} calibration rows from {}", rows.len(), path.display());
    Ok(rows)
}
