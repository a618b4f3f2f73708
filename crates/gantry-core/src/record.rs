//! Typed per-image records and per-sequence containers.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{Opk, Pt2, Pt3, Real, planar};

/// Provenance / confidence tier of an image pose.
///
/// Variants are declared from least to most trusted, so the derived `Ord`
/// ranks confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum Status {
    /// No pose could be determined.
    #[default]
    #[serde(rename = "uncalibrated")]
    Uncalibrated,
    /// Pose interpolated between calibrated neighbours.
    #[serde(rename = "estimated")]
    Estimated,
    /// Angle taken from a manual landmark correspondence.
    #[serde(rename = "visually calibrated")]
    VisuallyCalibrated,
    /// Pose measured by the external photogrammetry tool.
    #[serde(rename = "original", alias = "calibrated")]
    Original,
}

impl Status {
    pub const ALL: [Status; 4] = [
        Status::Original,
        Status::VisuallyCalibrated,
        Status::Estimated,
        Status::Uncalibrated,
    ];

    /// Whether the tier can bound an interpolation run.
    pub fn is_calibrated(self) -> bool {
        matches!(self, Status::Original | Status::VisuallyCalibrated)
    }

    pub fn label(self) -> &'static str {
        match self {
            Status::Original => "original",
            Status::VisuallyCalibrated => "visually calibrated",
            Status::Estimated => "estimated",
            Status::Uncalibrated => "uncalibrated",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("image record is missing required field `{0}`")]
    MissingField(&'static str),
    #[error("image record {id} has an empty filename")]
    EmptyFilename { id: u64 },
}

/// One captured image and everything the pipeline knows about its pose.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    /// Stable image number.
    pub id: u64,
    pub filename: String,
    /// Capture time; `None` when the source value could not be parsed.
    #[serde(with = "crate::time::serde_opt", default)]
    pub timestamp: Option<NaiveDateTime>,
    pub sequence_id: String,
    /// Contiguous sub-run index, assigned by clustering.
    #[serde(default)]
    pub cluster_id: Option<u32>,
    #[serde(default)]
    pub position: Option<Pt3>,
    #[serde(default)]
    pub orientation: Option<Opk>,
    /// Polar angle around the sequence center in `[0, 360)`.
    #[serde(default)]
    pub angular_position: Option<Real>,
    #[serde(default)]
    pub status: Status,
}

impl ImageRecord {
    pub fn builder() -> ImageRecordBuilder {
        ImageRecordBuilder::default()
    }

    pub fn planar_position(&self) -> Option<Pt2> {
        self.position.as_ref().map(planar)
    }

    /// Raise the status tier. Returns `false` (and leaves the record
    /// untouched) when `status` is less trusted than the current tier.
    pub fn promote(&mut self, status: Status) -> bool {
        if status < self.status {
            return false;
        }
        self.status = status;
        true
    }

    /// Unconditionally set the status. Only ingestion, which starts a run,
    /// relabels records.
    pub fn relabel(&mut self, status: Status) {
        self.status = status;
    }

    /// Ordering used for every per-sequence walk: image number, then
    /// timestamp with unknown timestamps last.
    pub fn sequence_order(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id).then_with(|| match (&self.timestamp, &other.timestamp) {
            (Some(a), Some(b)) => a.cmp(b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
    }
}

/// Builder enforcing the fields every ground-truth entry must carry.
#[derive(Debug, Clone, Default)]
pub struct ImageRecordBuilder {
    id: Option<u64>,
    filename: Option<String>,
    timestamp: Option<NaiveDateTime>,
    sequence_id: Option<String>,
    cluster_id: Option<u32>,
    position: Option<Pt3>,
    orientation: Option<Opk>,
    angular_position: Option<Real>,
    status: Status,
}

impl ImageRecordBuilder {
    pub fn id(mut self, id: u64) -> Self {
        self.id = Some(id);
        self
    }

    pub fn filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn timestamp(mut self, timestamp: Option<NaiveDateTime>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn sequence_id(mut self, sequence_id: impl Into<String>) -> Self {
        self.sequence_id = Some(sequence_id.into());
        self
    }

    pub fn cluster_id(mut self, cluster_id: Option<u32>) -> Self {
        self.cluster_id = cluster_id;
        self
    }

    pub fn position(mut self, position: Option<Pt3>) -> Self {
        self.position = position;
        self
    }

    pub fn orientation(mut self, orientation: Option<Opk>) -> Self {
        self.orientation = orientation;
        self
    }

    pub fn angular_position(mut self, angular_position: Option<Real>) -> Self {
        self.angular_position = angular_position;
        self
    }

    pub fn status(mut self, status: Status) -> Self {
        self.status = status;
        self
    }

    pub fn build(self) -> Result<ImageRecord, RecordError> {
        let id = self.id.ok_or(RecordError::MissingField("ImageNumber"))?;
        let filename = self.filename.ok_or(RecordError::MissingField("Filename"))?;
        if filename.trim().is_empty() {
            return Err(RecordError::EmptyFilename { id });
        }
        let sequence_id = self
            .sequence_id
            .ok_or(RecordError::MissingField("Sequence"))?;
        Ok(ImageRecord {
            id,
            filename,
            timestamp: self.timestamp,
            sequence_id,
            cluster_id: self.cluster_id,
            position: self.position,
            orientation: self.orientation,
            angular_position: self.angular_position,
            status: self.status,
        })
    }
}

/// One physical sweep of the camera around the pivot.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SequenceInfo {
    pub id: String,
    /// Pivot point, fitted or configured.
    #[serde(default)]
    pub center: Option<Pt2>,
    /// Track radius fitted from `original` images.
    #[serde(default)]
    pub radius: Option<Real>,
    /// Representative camera height.
    #[serde(default)]
    pub z_reference: Option<Real>,
    pub items: Vec<ImageRecord>,
}

impl SequenceInfo {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Center and radius when both are known.
    pub fn circle(&self) -> Option<(Pt2, Real)> {
        match (self.center, self.radius) {
            (Some(c), Some(r)) => Some((c, r)),
            _ => None,
        }
    }

    /// Sort items by image number then timestamp.
    pub fn sort_items(&mut self) {
        self.items.sort_by(|a, b| a.sequence_order(b));
    }

    pub fn originals(&self) -> impl Iterator<Item = &ImageRecord> {
        self.items.iter().filter(|r| r.status == Status::Original)
    }

    pub fn status_counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for item in &self.items {
            counts.add(item.status);
        }
        counts
    }
}

/// Number of records per status tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatusCounts {
    pub original: usize,
    pub visually_calibrated: usize,
    pub estimated: usize,
    pub uncalibrated: usize,
}

impl StatusCounts {
    pub fn add(&mut self, status: Status) {
        match status {
            Status::Original => self.original += 1,
            Status::VisuallyCalibrated => self.visually_calibrated += 1,
            Status::Estimated => self.estimated += 1,
            Status::Uncalibrated => self.uncalibrated += 1,
        }
    }

    pub fn get(&self, status: Status) -> usize {
        match status {
            Status::Original => self.original,
            Status::VisuallyCalibrated => self.visually_calibrated,
            Status::Estimated => self.estimated,
            Status::Uncalibrated => self.uncalibrated,
        }
    }

    pub fn total(&self) -> usize {
        self.original + self.visually_calibrated + self.estimated + self.uncalibrated
    }

    pub fn merge(&mut self, other: &StatusCounts) {
        self.original += other.original;
        self.visually_calibrated += other.visually_calibrated;
        self.estimated += other.estimated;
        self.uncalibrated += other.uncalibrated;
    }
}

/// All sequences of a dataset, keyed (and iterated) by sequence id.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SequenceSet {
    pub sequences: BTreeMap<String, SequenceInfo>,
}

impl SequenceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Group records by `sequence_id`, sorting each sequence.
    pub fn from_records(records: impl IntoIterator<Item = ImageRecord>) -> Self {
        let mut set = Self::new();
        for record in records {
            set.sequences
                .entry(record.sequence_id.clone())
                .or_insert_with_key(|id| SequenceInfo::new(id.clone()))
                .items
                .push(record);
        }
        set.sort_all();
        set
    }

    pub fn insert(&mut self, sequence: SequenceInfo) {
        self.sequences.insert(sequence.id.clone(), sequence);
    }

    pub fn get(&self, id: &str) -> Option<&SequenceInfo> {
        self.sequences.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut SequenceInfo> {
        self.sequences.get_mut(id)
    }

    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SequenceInfo> {
        self.sequences.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut SequenceInfo> {
        self.sequences.values_mut()
    }

    pub fn records(&self) -> impl Iterator<Item = &ImageRecord> {
        self.sequences.values().flat_map(|s| s.items.iter())
    }

    pub fn records_mut(&mut self) -> impl Iterator<Item = &mut ImageRecord> {
        self.sequences.values_mut().flat_map(|s| s.items.iter_mut())
    }

    pub fn num_records(&self) -> usize {
        self.sequences.values().map(|s| s.items.len()).sum()
    }

    pub fn sort_all(&mut self) {
        for seq in self.sequences.values_mut() {
            seq.sort_items();
        }
    }

    pub fn status_counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for seq in self.sequences.values() {
            counts.merge(&seq.status_counts());
        }
        counts
    }
}
