//! Record JSON: an object keyed by sequence id.
//!
//! ```json
//! {
//!   "Step01": {
//!     "axis_center": { "x": 44.21, "y": -29.13 },
//!     "calculated_radius": 49.46,
//!     "calculated_z": 5.6,
//!     "items": [
//!       { "ImageNumber": 4159, "Filename": "Gantry-2024-4159_pt.jpg",
//!         "Timestamp": "2024:05:17 10:42:01", "Sequence": "Step01",
//!         "Cluster": "Cluster03", "X": 1.0, "Y": 2.0, "Z": 5.6,
//!         "Omega": 0.4, "Phi": -1.1, "Kappa": 113.0,
//!         "Calibration_Status": "original", "Angular position": 23.5 }
//!     ]
//!   }
//! }
//! ```
//!
//! Entries without `ImageNumber` or `Filename` are dropped with a warning.
//! Numbers written as strings are accepted.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use gantry_core::{
    ImageRecord, Opk, Pt2, Pt3, Real, SequenceInfo, SequenceSet, Status, format_timestamp,
    parse_timestamp,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::DataError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct WireCenter {
    x: Real,
    y: Real,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct WireSequence {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    axis_center: Option<WireCenter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    calculated_radius: Option<Real>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    calculated_z: Option<Real>,
    #[serde(default)]
    items: Vec<WireItem>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct WireItem {
    #[serde(rename = "ImageNumber", default, skip_serializing_if = "Option::is_none")]
    image_number: Option<Value>,
    #[serde(rename = "Filename", default, skip_serializing_if = "Option::is_none")]
    filename: Option<Value>,
    #[serde(rename = "Timestamp", default, skip_serializing_if = "Option::is_none")]
    timestamp: Option<Value>,
    #[serde(rename = "Sequence", default, skip_serializing_if = "Option::is_none")]
    sequence: Option<Value>,
    #[serde(rename = "Cluster", default, skip_serializing_if = "Option::is_none")]
    cluster: Option<Value>,
    #[serde(rename = "X", default, skip_serializing_if = "Option::is_none")]
    x: Option<Value>,
    #[serde(rename = "Y", default, skip_serializing_if = "Option::is_none")]
    y: Option<Value>,
    #[serde(rename = "Z", default, skip_serializing_if = "Option::is_none")]
    z: Option<Value>,
    #[serde(rename = "Omega", default, skip_serializing_if = "Option::is_none")]
    omega: Option<Value>,
    #[serde(rename = "Phi", default, skip_serializing_if = "Option::is_none")]
    phi: Option<Value>,
    #[serde(rename = "Kappa", default, skip_serializing_if = "Option::is_none")]
    kappa: Option<Value>,
    #[serde(rename = "Calibration_Status", default, skip_serializing_if = "Option::is_none")]
    status: Option<Value>,
    #[serde(rename = "Angular position", default, skip_serializing_if = "Option::is_none")]
    angular_position: Option<Value>,
}

fn as_real(v: &Option<Value>) -> Option<Real> {
    match v.as_ref()? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
    .filter(|x: &Real| x.is_finite())
}

fn as_u64(v: &Option<Value>) -> Option<u64> {
    match v.as_ref()? {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0 && f.fract() == 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_text(v: &Option<Value>) -> Option<String> {
    match v.as_ref()? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// `"Cluster07"`, `"7"` and `7` all read as 7.
fn as_cluster(v: &Option<Value>) -> Option<u32> {
    match v.as_ref()? {
        Value::Number(n) => n.as_u64().and_then(|c| u32::try_from(c).ok()),
        Value::String(s) => s
            .trim()
            .trim_start_matches(|c: char| !c.is_ascii_digit())
            .parse()
            .ok(),
        _ => None,
    }
}

fn as_status(v: &Option<Value>, id: u64) -> Status {
    match v {
        None | Some(Value::Null) => Status::Uncalibrated,
        Some(value) => serde_json::from_value(value.clone()).unwrap_or_else(|_| {
            log::warn!("image {id}: unknown status {value}, treated as uncalibrated");
            Status::Uncalibrated
        }),
    }
}

fn item_to_record(
    item: &WireItem,
    sequence: &str,
    z_fallback: Option<Real>,
) -> Option<ImageRecord> {
    let id = as_u64(&item.image_number);
    let builder = ImageRecord::builder()
        .sequence_id(sequence)
        .timestamp(as_text(&item.timestamp).as_deref().and_then(parse_timestamp))
        .cluster_id(as_cluster(&item.cluster))
        .angular_position(as_real(&item.angular_position))
        .status(as_status(&item.status, id.unwrap_or_default()));

    let builder = match id {
        Some(id) => builder.id(id),
        None => builder,
    };
    let builder = match as_text(&item.filename) {
        Some(name) => builder.filename(name.trim()),
        None => builder,
    };

    let position = match (as_real(&item.x), as_real(&item.y)) {
        (Some(x), Some(y)) => Some(Pt3::new(
            x,
            y,
            as_real(&item.z).or(z_fallback).unwrap_or_default(),
        )),
        _ => None,
    };
    let orientation = match (as_real(&item.omega), as_real(&item.phi), as_real(&item.kappa)) {
        (Some(o), Some(p), Some(k)) => Some(Opk::new(o, p, k)),
        _ => None,
    };

    if let Some(declared) = as_text(&item.sequence) {
        if declared != sequence {
            log::debug!("item declares sequence {declared} but is listed under {sequence}");
        }
    }

    match builder.position(position).orientation(orientation).build() {
        Ok(record) => Some(record),
        Err(err) => {
            log::warn!("{sequence}: dropping entry: {err}");
            None
        }
    }
}

fn record_to_item(record: &ImageRecord) -> WireItem {
    WireItem {
        image_number: Some(Value::from(record.id)),
        filename: Some(Value::from(record.filename.clone())),
        timestamp: record.timestamp.as_ref().map(|t| Value::from(format_timestamp(t))),
        sequence: Some(Value::from(record.sequence_id.clone())),
        cluster: record.cluster_id.map(|c| Value::from(format!("Cluster{c:02}"))),
        x: record.position.map(|p| Value::from(p.x)),
        y: record.position.map(|p| Value::from(p.y)),
        z: record.position.map(|p| Value::from(p.z)),
        omega: record.orientation.map(|o| Value::from(o.omega)),
        phi: record.orientation.map(|o| Value::from(o.phi)),
        kappa: record.orientation.map(|o| Value::from(o.kappa)),
        status: Some(Value::from(record.status.label())),
        angular_position: record.angular_position.map(Value::from),
    }
}

/// Parse a record JSON document.
pub fn records_from_json(text: &str) -> Result<SequenceSet, serde_json::Error> {
    let wire: BTreeMap<String, WireSequence> = serde_json::from_str(text)?;
    let mut set = SequenceSet::new();
    for (id, ws) in wire {
        let mut seq = SequenceInfo::new(id.clone());
        seq.center = ws.axis_center.map(|c| Pt2::new(c.x, c.y));
        seq.radius = ws.calculated_radius;
        seq.z_reference = ws.calculated_z;
        seq.items = ws
            .items
            .iter()
            .filter_map(|item| item_to_record(item, &id, ws.calculated_z))
            .collect();
        set.insert(seq);
    }
    set.sort_all();
    Ok(set)
}

/// Serialize `set` to the record JSON shape.
pub fn records_to_json(set: &SequenceSet) -> Result<String, serde_json::Error> {
    let wire: BTreeMap<&str, WireSequence> = set
        .iter()
        .map(|seq| {
            (
                seq.id.as_str(),
                WireSequence {
                    axis_center: seq.center.map(|c| WireCenter { x: c.x, y: c.y }),
                    calculated_radius: seq.radius,
                    calculated_z: seq.z_reference,
                    items: seq.items.iter().map(record_to_item).collect(),
                },
            )
        })
        .collect();
    serde_json::to_string_pretty(&wire)
}

pub fn load_records(path: &Path) -> Result<SequenceSet, DataError> {
    let text = fs::read_to_string(path).map_err(|e| DataError::io(path, e))?;
    let set = records_from_json(&text).map_err(|e| DataError::json(path, e))?;
    log::info!(
        "loaded {} records in {} sequences from {}",
        set.num_records(),
        set.len(),
        path.display()
    );
    Ok(set)
}

pub fn save_records(path: &Path, set: &SequenceSet) -> Result<(), DataError> {
    let json = records_to_json(set).map_err(|e| DataError::json(path, e))?;
    fs::write(path, json).map_err(|e| DataError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "Step02": {
            "axis_center": {"x": 44.2, "y": -29.1},
            "calculated_radius": 47.5,
            "calculated_z": 5.5,
            "items": [
                {"ImageNumber": "4161", "Filename": "G-2024-4161_pt.jpg",
                 "Timestamp": "2024:05:17 10:42:03", "Sequence": "Step02",
                 "X": 1.0, "Y": "2.5", "Calibration_Status": "calibrated"},
                {"ImageNumber": 4160, "Filename": "G-2024-4160_pt.jpg",
                 "Timestamp": "not a time", "Cluster": "Cluster04",
                 "Calibration_Status": "estimated", "Angular position": 12.5},
                {"Filename": "orphan.jpg"},
                {"ImageNumber": 4170}
            ]
        },
        "Step01": {"items": []}
    }"#;

    #[test]
    fn parses_wire_records() {
        let set = records_from_json(SAMPLE).unwrap();
        assert_eq!(set.len(), 2);
        let seq = set.get("Step02").unwrap();
        assert_eq!(seq.circle(), Some((Pt2::new(44.2, -29.1), 47.5)));
        assert_eq!(seq.items.len(), 2);

        let first = &seq.items[0];
        assert_eq!(first.id, 4160);
        assert!(first.timestamp.is_none());
        assert_eq!(first.cluster_id, Some(4));
        assert_eq!(first.status, Status::Estimated);

        let second = &seq.items[1];
        assert_eq!(second.status, Status::Original);
        assert_eq!(second.position, Some(Pt3::new(1.0, 2.5, 5.5)));
        assert!(second.orientation.is_none());
    }

    #[test]
    fn written_records_read_back() {
        let set = records_from_json(SAMPLE).unwrap();
        let json = records_to_json(&set).unwrap();
        assert!(json.contains("\"Cluster\": \"Cluster04\""));
        assert!(json.contains("\"Calibration_Status\": \"original\""));
        assert!(json.contains("\"Timestamp\": \"2024:05:17 10:42:03\""));
        let back = records_from_json(&json).unwrap();
        assert_eq!(back, set);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = load_records(Path::new("/nonexistent/records.json")).unwrap_err();
        assert!(matches!(err, DataError::Io { .. }));
    }
}
