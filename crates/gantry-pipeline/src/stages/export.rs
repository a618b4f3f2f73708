//! Confidence tiers and tabular export rows.

use gantry_core::{Opk, Pt3, Real, SequenceSet, Status};
use serde::{Deserialize, Serialize};

/// Which records appear in the export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExportMode {
    /// Only poses the pipeline derived: `visually calibrated` and `estimated`.
    #[default]
    Derived,
    /// Every tier except `uncalibrated`.
    Resolved,
    All,
}

impl ExportMode {
    pub fn includes(self, status: Status) -> bool {
        match self {
            ExportMode::Derived => {
                matches!(status, Status::VisuallyCalibrated | Status::Estimated)
            }
            ExportMode::Resolved => status != Status::Uncalibrated,
            ExportMode::All => true,
        }
    }
}

/// Horizontal / vertical position uncertainty in metres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sigma {
    pub horizontal: Real,
    pub vertical: Real,
}

impl Sigma {
    pub const fn new(horizontal: Real, vertical: Real) -> Self {
        Self {
            horizontal,
            vertical,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SigmaTable {
    pub original: Sigma,
    pub visually_calibrated: Sigma,
    pub estimated: Sigma,
    pub uncalibrated: Sigma,
}

impl Default for SigmaTable {
    fn default() -> Self {
        Self {
            original: Sigma::new(0.5, 0.2),
            visually_calibrated: Sigma::new(1.0, 0.3),
            estimated: Sigma::new(2.0, 0.5),
            uncalibrated: Sigma::new(5.0, 1.0),
        }
    }
}

impl SigmaTable {
    pub fn get(&self, status: Status) -> Sigma {
        match status {
            Status::Original => self.original,
            Status::VisuallyCalibrated => self.visually_calibrated,
            Status::Estimated => self.estimated,
            Status::Uncalibrated => self.uncalibrated,
        }
    }

    /// Check that sigmas are positive and never shrink as confidence drops.
    pub fn validate(&self) -> Result<(), String> {
        // most trusted first
        let tiers = Status::ALL.map(|s| (s, self.get(s)));
        for (status, sigma) in &tiers {
            if !(sigma.horizontal.is_finite() && sigma.horizontal > 0.0)
                || !(sigma.vertical.is_finite() && sigma.vertical > 0.0)
            {
                return Err(format!("sigma for `{status}` must be positive and finite"));
            }
        }
        for pair in tiers.windows(2) {
            let (better, b) = pair[0];
            let (worse, w) = pair[1];
            if w.horizontal < b.horizontal || w.vertical < b.vertical {
                return Err(format!(
                    "sigma for `{worse}` is tighter than for `{better}`"
                ));
            }
        }
        Ok(())
    }
}

/// Flat-earth mapping from local metres to geographic degrees around a
/// surveyed site origin: `lat = latitude + y * scale`,
/// `lon = longitude + x * scale`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoReference {
    pub latitude: Real,
    pub longitude: Real,
    /// Degrees per metre.
    #[serde(default = "GeoReference::default_scale")]
    pub scale: Real,
}

impl GeoReference {
    pub const DEFAULT_SCALE: Real = 1e-5;

    fn default_scale() -> Real {
        Self::DEFAULT_SCALE
    }

    pub fn new(latitude: Real, longitude: Real) -> Self {
        Self {
            latitude,
            longitude,
            scale: Self::DEFAULT_SCALE,
        }
    }

    pub fn to_lat_lon(&self, position: &Pt3) -> LatLon {
        LatLon {
            latitude: self.latitude + position.y * self.scale,
            longitude: self.longitude + position.x * self.scale,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if !(self.latitude.is_finite() && self.latitude.abs() <= 90.0) {
            return Err(format!("latitude {} outside [-90, 90]", self.latitude));
        }
        if !(self.longitude.is_finite() && self.longitude.abs() <= 180.0) {
            return Err(format!("longitude {} outside [-180, 180]", self.longitude));
        }
        if !(self.scale.is_finite() && self.scale > 0.0) {
            return Err(format!("scale must be positive, got {}", self.scale));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLon {
    pub latitude: Real,
    pub longitude: Real,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportOptions {
    pub mode: ExportMode,
    pub sigmas: SigmaTable,
    /// Adds latitude/longitude to every positioned row.
    pub geo: Option<GeoReference>,
}

/// One exported image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportRow {
    pub image: String,
    pub sequence: String,
    pub status: Status,
    pub position: Option<Pt3>,
    pub orientation: Option<Opk>,
    pub sigma: Sigma,
    #[serde(default)]
    pub geo: Option<LatLon>,
}

/// Rows for every record selected by `opts.mode`, in sequence order.
pub fn export_rows(set: &SequenceSet, opts: &ExportOptions) -> Vec<ExportRow> {
    let rows: Vec<ExportRow> = set
        .records()
        .filter(|r| opts.mode.includes(r.status))
        .map(|r| ExportRow {
            image: r.filename.clone(),
            sequence: r.sequence_id.clone(),
            status: r.status,
            position: r.position,
            orientation: r.orientation,
            sigma: opts.sigmas.get(r.status),
            geo: opts
                .geo
                .as_ref()
                .zip(r.position.as_ref())
                .map(|(g, p)| g.to_lat_lon(p)),
        })
        .collect();
    let incomplete = rows
        .iter()
        .filter(|r| r.position.is_none() || r.orientation.is_none())
        .count();
    if incomplete > 0 {
        log::warn!("{incomplete} exported rows lack a position or orientation");
    }
    rows
}
