//! Calibration ingestion.
//!
//! Merges externally measured poses into the record set. Every record is
//! relabelled on each run: matched records become `original`, everything
//! else becomes `uncalibrated` and loses its derived pose.

use std::collections::{HashMap, HashSet};

use gantry_core::{AngleConvention, Opk, Pt3, Real, SequenceSet, Status, Ypr};
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::{Stage, StageDiagnostic, report};

/// Pattern extracting the image number from names like
/// `Gantry-2024-4159_pt.jpg`.
pub const DEFAULT_ID_PATTERN: &str = r"2024-(\d+)_";

/// How external rows are matched to image records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ImageKey {
    /// Extract an image number with `pattern` (first capture group).
    /// Keys that are plain integers are used as-is.
    ImageNumber { pattern: String },
    /// Match the key literally against `Filename`.
    Filename,
}

impl Default for ImageKey {
    fn default() -> Self {
        ImageKey::ImageNumber {
            pattern: DEFAULT_ID_PATTERN.to_string(),
        }
    }
}

/// What to do with a row whose numeric field does not parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MalformedPolicy {
    /// Treat the field as `0.0`.
    #[default]
    DefaultZero,
    /// Drop the whole row.
    RejectRow,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestOptions {
    pub key: ImageKey,
    pub malformed: MalformedPolicy,
    /// Convention of the three angle columns.
    pub angles: AngleConvention,
}

/// One row of the external calibration table, kept as text until ingestion
/// applies the malformed-field policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationRow {
    /// Filename or image number.
    pub key: String,
    /// `X, Y, Z` followed by up to three angles.
    pub fields: Vec<String>,
}

impl CalibrationRow {
    pub fn from_pose(key: impl Into<String>, position: Pt3, angles: [Real; 3]) -> Self {
        Self {
            key: key.into(),
            fields: [position.x, position.y, position.z]
                .into_iter()
                .chain(angles)
                .map(|v| v.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestSummary {
    pub rows: usize,
    pub rejected_rows: usize,
    /// Rows whose key matched no image record.
    pub unmatched_rows: usize,
    pub original: usize,
    pub uncalibrated: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Key {
    Number(u64),
    Name(String),
}

struct Matcher {
    pattern: Option<Regex>,
}

impl Matcher {
    fn new(key: &ImageKey) -> Result<Self, regex::Error> {
        let pattern = match key {
            ImageKey::ImageNumber { pattern } => Some(Regex::new(pattern)?),
            ImageKey::Filename => None,
        };
        Ok(Self { pattern })
    }

    fn row_key(&self, raw: &str) -> Option<Key> {
        let raw = raw.trim();
        match &self.pattern {
            None => Some(Key::Name(raw.to_string())),
            Some(re) => {
                if let Ok(id) = raw.parse::<u64>() {
                    return Some(Key::Number(id));
                }
                re.captures(raw)
                    .and_then(|c| c.get(1))
                    .and_then(|m| m.as_str().parse().ok())
                    .map(Key::Number)
            }
        }
    }

    fn record_key(&self, id: u64, filename: &str) -> Key {
        match self.pattern {
            Some(_) => Key::Number(id),
            None => Key::Name(filename.trim().to_string()),
        }
    }
}

/// Parse one numeric field. `Err` carries the offending text.
fn parse_field(fields: &[String], idx: usize) -> Result<Real, String> {
    match fields.get(idx) {
        None => Ok(0.0),
        Some(text) => match text.trim().parse::<Real>() {
            Ok(v) if v.is_finite() => Ok(v),
            _ => Err(text.clone()),
        },
    }
}

fn parse_pose(row: &CalibrationRow, opts: &IngestOptions) -> Result<(Pt3, Opk), String> {
    let mut values = [0.0; 6];
    for (idx, value) in values.iter_mut().enumerate() {
        match parse_field(&row.fields, idx) {
            Ok(v) => *value = v,
            Err(text) => match opts.malformed {
                MalformedPolicy::DefaultZero => {
                    log::debug!("{}: field {} `{}` defaulted to 0.0", row.key, idx + 1, text);
                    *value = 0.0;
                }
                MalformedPolicy::RejectRow => {
                    return Err(format!("field {} `{}` is not a number", idx + 1, text));
                }
            },
        }
    }
    let position = Pt3::new(values[0], values[1], values[2]);
    let orientation = match opts.angles {
        AngleConvention::Opk => Opk::new(values[3], values[4], values[5]),
        AngleConvention::Ypr => Ypr::new(values[3], values[4], values[5]).to_opk(),
    };
    Ok((position, orientation))
}

/// Merge `rows` into `set`, relabelling every record.
///
/// Fails only when the configured key pattern does not compile.
pub fn ingest_calibration(
    set: &mut SequenceSet,
    rows: &[CalibrationRow],
    opts: &IngestOptions,
    diagnostics: &mut Vec<StageDiagnostic>,
) -> Result<IngestSummary, regex::Error> {
    let matcher = Matcher::new(&opts.key)?;
    let mut summary = IngestSummary {
        rows: rows.len(),
        ..Default::default()
    };

    let mut poses: HashMap<Key, (Pt3, Opk)> = HashMap::with_capacity(rows.len());
    for row in rows {
        if row.fields.len() < 3 {
            summary.rejected_rows += 1;
            report(
                diagnostics,
                Stage::Ingest,
                None,
                format!("row `{}` has fewer than 3 coordinates", row.key),
            );
            continue;
        }
        let Some(key) = matcher.row_key(&row.key) else {
            summary.rejected_rows += 1;
            report(
                diagnostics,
                Stage::Ingest,
                None,
                format!("no image number in key `{}`", row.key),
            );
            continue;
        };
        match parse_pose(row, opts) {
            Ok(pose) => {
                if poses.insert(key, pose).is_some() {
                    log::debug!("duplicate calibration row for `{}`, keeping the last", row.key);
                }
            }
            Err(msg) => {
                summary.rejected_rows += 1;
                report(
                    diagnostics,
                    Stage::Ingest,
                    None,
                    format!("rejected row `{}`: {msg}", row.key),
                );
            }
        }
    }

    for seq in set.iter_mut() {
        for record in seq.items.iter_mut() {
            let key = matcher.record_key(record.id, &record.filename);
            match poses.get(&key) {
                Some((position, orientation)) => {
                    record.position = Some(*position);
                    record.orientation = Some(*orientation);
                    record.angular_position = None;
                    record.relabel(Status::Original);
                    summary.original += 1;
                }
                None => {
                    record.position = None;
                    record.orientation = None;
                    record.angular_position = None;
                    record.relabel(Status::Uncalibrated);
                    summary.uncalibrated += 1;
                }
            }
            record.cluster_id = None;
        }
    }

    // several records may share a key (same image number in two sequences)
    let matched_keys = set
        .records()
        .map(|r| matcher.record_key(r.id, &r.filename))
        .filter(|k| poses.contains_key(k))
        .collect::<HashSet<_>>()
        .len();
    summary.unmatched_rows = poses.len() - matched_keys;
    if summary.unmatched_rows > 0 {
        log::warn!(
            "{} calibration rows matched no image record",
            summary.unmatched_rows
        );
    }

    log::info!(
        "ingested {} rows: {} records original, {} uncalibrated, {} rows rejected",
        summary.rows,
        summary.original,
        summary.uncalibrated,
        summary.rejected_rows
    );
    Ok(summary)
}
