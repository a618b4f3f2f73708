//! Stage algorithms of the pose completion pipeline.
//!
//! Each stage mutates a [`SequenceSet`](gantry_core::SequenceSet) in place and
//! returns a small summary. Per-sequence precondition failures never abort a
//! stage; they are logged and pushed as [`StageDiagnostic`]s.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod angles;
pub mod circle;
pub mod cluster;
pub mod export;
pub mod ingest;
pub mod interpolate;
pub mod orientation;
pub mod visual;

/// Pipeline stages in dependency order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Ingest,
    FitCircles,
    AssignAngles,
    VisualCalibration,
    Cluster,
    Interpolate,
    Orientation,
    Finalize,
}

impl Stage {
    pub const ALL: [Stage; 8] = [
        Stage::Ingest,
        Stage::FitCircles,
        Stage::AssignAngles,
        Stage::VisualCalibration,
        Stage::Cluster,
        Stage::Interpolate,
        Stage::Orientation,
        Stage::Finalize,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Stage::Ingest => "ingest",
            Stage::FitCircles => "fit_circles",
            Stage::AssignAngles => "assign_angles",
            Stage::VisualCalibration => "visual_calibration",
            Stage::Cluster => "cluster",
            Stage::Interpolate => "interpolate",
            Stage::Orientation => "orientation",
            Stage::Finalize => "finalize",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown stage `{0}` (expected one of: ingest, fit_circles, assign_angles, visual_calibration, cluster, interpolate, orientation, finalize)")]
pub struct UnknownStage(pub String);

impl FromStr for Stage {
    type Err = UnknownStage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
        Stage::ALL
            .into_iter()
            .find(|stage| stage.name() == wanted)
            .ok_or_else(|| UnknownStage(s.to_string()))
    }
}

/// A stage skipped (part of) its work for a sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageDiagnostic {
    pub stage: Stage,
    /// Affected sequence, `None` for dataset-wide events.
    pub sequence: Option<String>,
    pub message: String,
}

impl fmt::Display for StageDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.sequence {
            Some(seq) => write!(f, "[{}] {}: {}", self.stage, seq, self.message),
            None => write!(f, "[{}] {}", self.stage, self.message),
        }
    }
}

/// Log a diagnostic at warn level and record it.
pub(crate) fn report(
    diagnostics: &mut Vec<StageDiagnostic>,
    stage: Stage,
    sequence: Option<&str>,
    message: impl Into<String>,
) {
    let diag = StageDiagnostic {
        stage,
        sequence: sequence.map(str::to_string),
        message: message.into(),
    };
    log::warn!("{diag}");
    diagnostics.push(diag);
}
