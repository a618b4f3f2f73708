//! Visual calibration from manual landmark correspondences.
//!
//! A landmark seen in several sequences pins each matching image to a known
//! polar angle. Matched records below `visually calibrated` are placed on
//! their sequence circle at that angle.

use std::collections::{BTreeMap, BTreeSet};

use gantry_core::{ImageRecord, Pt3, Real, SequenceSet, Status, angle_to_xy, wrap_360};
use serde::{Deserialize, Serialize};

use super::{Stage, StageDiagnostic, report};

/// Reference to an image inside one sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageRef {
    Number(u64),
    Filename(String),
}

impl ImageRef {
    /// Integers become [`ImageRef::Number`], anything else a filename.
    pub fn parse(cell: &str) -> Option<Self> {
        let cell = cell.trim();
        if cell.is_empty() {
            return None;
        }
        Some(match cell.parse::<u64>() {
            Ok(n) => ImageRef::Number(n),
            Err(_) => ImageRef::Filename(cell.to_string()),
        })
    }

    pub fn matches(&self, record: &ImageRecord) -> bool {
        match self {
            ImageRef::Number(n) => record.id == *n,
            ImageRef::Filename(name) => record.filename.trim() == name,
        }
    }
}

/// Images a landmark row refers to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MatchTarget {
    /// One image per sequence id.
    PerSequence(BTreeMap<String, ImageRef>),
    /// The same image reference, looked up in every sequence.
    AnySequence(ImageRef),
}

/// One landmark correspondence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualMatch {
    pub landmark: Option<String>,
    /// Polar angle of the landmark (degrees).
    pub angle: Real,
    pub target: MatchTarget,
}

impl VisualMatch {
    fn target_in(&self, sequence: &str) -> Option<&ImageRef> {
        match &self.target {
            MatchTarget::PerSequence(map) => map.get(sequence),
            MatchTarget::AnySequence(r) => Some(r),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VisualMatchTable {
    pub matches: Vec<VisualMatch>,
}

impl VisualMatchTable {
    /// Sequence ids referenced by per-sequence rows.
    pub fn sequence_ids(&self) -> BTreeSet<&str> {
        self.matches
            .iter()
            .filter_map(|m| match &m.target {
                MatchTarget::PerSequence(map) => Some(map.keys().map(String::as_str)),
                MatchTarget::AnySequence(_) => None,
            })
            .flatten()
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisualSummary {
    pub applied: usize,
    /// References that named no record of their sequence.
    pub unresolved: usize,
    /// Matched records that already had an equal or better tier.
    pub already_calibrated: usize,
}

/// Apply `table` to every sequence with a known circle.
pub fn apply_visual_matches(
    set: &mut SequenceSet,
    table: &VisualMatchTable,
    diagnostics: &mut Vec<StageDiagnostic>,
) -> VisualSummary {
    let mut summary = VisualSummary::default();

    for id in table.sequence_ids() {
        if set.get(id).is_none() {
            report(
                diagnostics,
                Stage::VisualCalibration,
                Some(id),
                "visual matches reference an unknown sequence",
            );
        }
    }

    for seq in set.iter_mut() {
        let targets: Vec<(&VisualMatch, &ImageRef)> = table
            .matches
            .iter()
            .filter_map(|m| m.target_in(&seq.id).map(|r| (m, r)))
            .collect();
        if targets.is_empty() {
            continue;
        }
        let Some((center, radius)) = seq.circle() else {
            report(
                diagnostics,
                Stage::VisualCalibration,
                Some(&seq.id),
                format!("no center/radius, {} visual matches ignored", targets.len()),
            );
            continue;
        };
        let z_reference = seq.z_reference;

        for (m, image) in targets {
            if !m.angle.is_finite() {
                continue;
            }
            let Some(record) = seq.items.iter_mut().find(|r| image.matches(r)) else {
                summary.unresolved += 1;
                log::debug!("{}: visual match {:?} names no image", seq.id, image);
                continue;
            };
            if record.status >= Status::VisuallyCalibrated {
                summary.already_calibrated += 1;
                log::debug!(
                    "{}: image {} is already {}, visual match ignored",
                    seq.id,
                    record.id,
                    record.status
                );
                continue;
            }

            let xy = angle_to_xy(m.angle, radius, &center);
            let z = record
                .position
                .map(|p| p.z)
                .or(z_reference)
                .unwrap_or_default();
            record.position = Some(Pt3::new(xy.x, xy.y, z));
            record.angular_position = Some(wrap_360(m.angle));
            record.promote(Status::VisuallyCalibrated);
            summary.applied += 1;
            log::debug!(
                "{}: image {} -> {:.3} deg ({:.3}, {:.3})",
                seq.id,
                record.id,
                m.angle,
                xy.x,
                xy.y
            );
        }
    }

    log::info!(
        "visual calibration: {} applied, {} unresolved, {} already calibrated",
        summary.applied,
        summary.unresolved,
        summary.already_calibrated
    );
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_core::{Pt2, SequenceInfo};

    fn sequence(id: &str, with_circle: bool) -> SequenceInfo {
        let mut seq = SequenceInfo::new(id);
        for n in 1..=4u64 {
            seq.items.push(
                ImageRecord::builder()
                    .id(n)
                    .filename(format!("{id}_{n}.jpg"))
                    .sequence_id(id)
                    .build()
                    .unwrap(),
            );
        }
        seq.items[0].relabel(Status::Original);
        if with_circle {
            seq.center = Some(Pt2::origin());
            seq.radius = Some(50.0);
            seq.z_reference = Some(2.5);
        }
        seq
    }

    fn landmark(angle: Real, refs: &[(&str, u64)]) -> VisualMatch {
        VisualMatch {
            landmark: Some("L".into()),
            angle,
            target: MatchTarget::PerSequence(
                refs.iter()
                    .map(|(s, n)| (s.to_string(), ImageRef::Number(*n)))
                    .collect(),
            ),
        }
    }

    #[test]
    fn places_matched_images_on_circle() {
        let mut set = SequenceSet::new();
        set.insert(sequence("Step01", true));
        let table = VisualMatchTable {
            matches: vec![landmark(45.0, &[("Step01", 2)]), landmark(90.0, &[("Step01", 1)])],
        };
        let mut diags = Vec::new();
        let summary = apply_visual_matches(&mut set, &table, &mut diags);

        assert_eq!(summary.applied, 1);
        assert_eq!(summary.already_calibrated, 1);
        let r = &set.get("Step01").unwrap().items[1];
        assert_eq!(r.status, Status::VisuallyCalibrated);
        let p = r.position.unwrap();
        assert!((p.x - 35.355339).abs() < 1e-5 && (p.y - 35.355339).abs() < 1e-5);
        assert_eq!(p.z, 2.5);
        assert_eq!(r.angular_position, Some(45.0));
    }

    #[test]
    fn sequences_without_circle_are_skipped() {
        let mut set = SequenceSet::new();
        set.insert(sequence("Step01", false));
        let table = VisualMatchTable {
            matches: vec![landmark(10.0, &[("Step01", 3), ("Step09", 3)])],
        };
        let mut diags = Vec::new();
        let summary = apply_visual_matches(&mut set, &table, &mut diags);
        assert_eq!(summary.applied, 0);
        assert_eq!(diags.len(), 2);
        assert!(set.records().all(|r| r.status != Status::VisuallyCalibrated));
    }

    #[test]
    fn filename_rows_apply_to_every_sequence() {
        let mut set = SequenceSet::new();
        set.insert(sequence("Step01", true));
        set.insert(sequence("Step02", true));
        let table = VisualMatchTable {
            matches: vec![VisualMatch {
                landmark: None,
                angle: -90.0,
                target: MatchTarget::AnySequence(ImageRef::Filename("Step02_3.jpg".into())),
            }],
        };
        let mut diags = Vec::new();
        let summary = apply_visual_matches(&mut set, &table, &mut diags);
        assert_eq!(summary.applied, 1);
        assert_eq!(summary.unresolved, 1);
        let r = &set.get("Step02").unwrap().items[2];
        assert_eq!(r.angular_position, Some(270.0));
    }

    #[test]
    fn image_refs_parse() {
        assert_eq!(ImageRef::parse(" 4159 "), Some(ImageRef::Number(4159)));
        assert_eq!(
            ImageRef::parse("a.jpg"),
            Some(ImageRef::Filename("a.jpg".into()))
        );
        assert_eq!(ImageRef::parse("  "), None);
    }
}
