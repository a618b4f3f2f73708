//! Visual-match CSV.
//!
//! ```text
//! Landmark,Angle,Step01,Step02,Step03
//! mast,123.5,4159,5210,
//! gate,201.0,Gantry-2024-4188_pt.jpg,5240,6011
//! ```
//!
//! The angle column may be named `Angle`, `AngularPosition` or
//! `Angular position`. A legacy `ImageName` column matches its image in any
//! sequence. Every other column is a sequence id.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::{ReaderBuilder, Trim};

use crate::stages::visual::{ImageRef, MatchTarget, VisualMatch, VisualMatchTable};

use super::DataError;

const ANGLE_COLUMNS: [&str; 3] = ["angle", "angularposition", "angular position"];
const LANDMARK_COLUMNS: [&str; 2] = ["landmark", "label"];
const LEGACY_IMAGE_COLUMN: &str = "imagename";

enum Column {
    Angle,
    Landmark,
    LegacyImage,
    Sequence(String),
}

fn classify(header: &str) -> Column {
    let lower = header.trim().to_ascii_lowercase();
    if ANGLE_COLUMNS.contains(&lower.as_str()) {
        Column::Angle
    } else if LANDMARK_COLUMNS.contains(&lower.as_str()) {
        Column::Landmark
    } else if lower == LEGACY_IMAGE_COLUMN {
        Column::LegacyImage
    } else {
        Column::Sequence(header.trim().to_string())
    }
}

/// Read a match table from `reader`; `path` only labels errors.
pub fn parse_visual_matches<R: Read>(
    reader: R,
    path: &Path,
) -> Result<VisualMatchTable, DataError> {
    let mut csv = ReaderBuilder::new()
        .flexible(true)
        .trim(Trim::All)
        .from_reader(reader);
    let columns: Vec<Column> = csv
        .headers()
        .map_err(|e| DataError::csv(path, e))?
        .iter()
        .map(classify)
        .collect();
    if !columns.iter().any(|c| matches!(c, Column::Angle)) {
        return Err(DataError::MissingColumn {
            path: path.to_path_buf(),
            column: "Angle".to_string(),
        });
    }

    let mut table = VisualMatchTable::default();
    for (row, record) in csv.records().enumerate() {
        let record = record.map_err(|e| DataError::csv(path, e))?;
        let mut angle = None;
        let mut landmark = None;
        let mut legacy = None;
        let mut per_sequence = BTreeMap::new();

        for (column, cell) in columns.iter().zip(record.iter()) {
            match column {
                Column::Angle => angle = Some(cell),
                Column::Landmark => landmark = Some(cell).filter(|c| !c.is_empty()),
                Column::LegacyImage => {
                    legacy = Some(cell)
                        .filter(|c| !c.is_empty())
                        .map(|c| ImageRef::Filename(c.to_string()))
                }
                Column::Sequence(id) => {
                    if let Some(r) = ImageRef::parse(cell) {
                        per_sequence.insert(id.clone(), r);
                    }
                }
            }
        }

        let Some(angle) = angle.and_then(|a| a.parse::<f64>().ok()).filter(|a| a.is_finite())
        else {
            log::warn!("{}: row {}: unreadable angle, skipped", path.display(), row + 2);
            continue;
        };
        let target = match legacy {
            Some(image) => MatchTarget::AnySequence(image),
            None if !per_sequence.is_empty() => MatchTarget::PerSequence(per_sequence),
            None => {
                log::warn!("{}: row {}: references no image", path.display(), row + 2);
                continue;
            }
        };
        table.matches.push(VisualMatch {
            landmark: landmark.map(str::to_string),
            angle,
            target,
        });
    }
    Ok(table)
}

pub fn load_visual_matches(path: &Path) -> Result<VisualMatchTable, DataError> {
    let file = File::open(path).map_err(|e| DataError::io(path, e))?;
    let table = parse_visual_matches(file, path)?;
    log::info!(
        "read {} visual matches from {}",
        table.matches.len(),
        path.display()
    );
    Ok(table)
}
