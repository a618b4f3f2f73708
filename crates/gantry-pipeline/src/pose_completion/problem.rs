//! Pose completion problem definition.

use std::collections::BTreeMap;

use anyhow::{Result, bail, ensure};
use gantry_core::{SequenceSet, StatusCounts};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::session::{InvalidationPolicy, ProblemType};
use crate::stages::circle::{CenterStrategy, CircleOptions};
use crate::stages::cluster::ClusterOptions;
use crate::stages::export::{ExportOptions, ExportRow, export_rows};
use crate::stages::ingest::{CalibrationRow, ImageKey, IngestOptions};
use crate::stages::interpolate::InterpolationOptions;
use crate::stages::orientation::OrientationOptions;
use crate::stages::visual::VisualMatchTable;

// ─────────────────────────────────────────────────────────────────────────────
// Config
// ─────────────────────────────────────────────────────────────────────────────

/// Every tunable of the pipeline. `Default` is the reference behaviour.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PoseCompletionConfig {
    pub ingest: IngestOptions,
    pub circle: CircleOptions,
    pub cluster: ClusterOptions,
    pub interpolation: InterpolationOptions,
    pub orientation: OrientationOptions,
    pub export: ExportOptions,
}

// ─────────────────────────────────────────────────────────────────────────────
// Input / Output / Export
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseCompletionInput {
    /// Ground truth records. Poses already present are replaced on ingest.
    pub sequences: SequenceSet,
    /// Externally measured poses.
    #[serde(default)]
    pub calibration: Vec<CalibrationRow>,
    #[serde(default)]
    pub visual: Option<VisualMatchTable>,
}

impl PoseCompletionInput {
    pub fn new(sequences: SequenceSet, calibration: Vec<CalibrationRow>) -> Self {
        Self {
            sequences,
            calibration,
            visual: None,
        }
    }

    pub fn with_visual(mut self, visual: VisualMatchTable) -> Self {
        self.visual = Some(visual);
        self
    }
}

/// Record counts per status tier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub per_sequence: BTreeMap<String, StatusCounts>,
    pub total: StatusCounts,
}

impl RunSummary {
    pub fn from_set(set: &SequenceSet) -> Self {
        let per_sequence: BTreeMap<String, StatusCounts> = set
            .iter()
            .map(|seq| (seq.id.clone(), seq.status_counts()))
            .collect();
        let mut total = StatusCounts::default();
        for counts in per_sequence.values() {
            total.merge(counts);
        }
        Self {
            per_sequence,
            total,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseCompletionOutput {
    /// Completed records.
    pub sequences: SequenceSet,
    pub summary: RunSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseCompletionExport {
    pub rows: Vec<ExportRow>,
    pub summary: RunSummary,
}

// ─────────────────────────────────────────────────────────────────────────────
// Problem
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct PoseCompletionProblem;

fn validate_key(key: &ImageKey) -> Result<()> {
    if let ImageKey::ImageNumber { pattern } = key {
        let re = Regex::new(pattern)
            .map_err(|e| anyhow::anyhow!("ingest.key.pattern does not compile: {e}"))?;
        ensure!(
            re.captures_len() > 1,
            "ingest.key.pattern must have a capture group for the image number"
        );
    }
    Ok(())
}

fn validate_circle(opts: &CircleOptions) -> Result<()> {
    ensure!(
        opts.min_points >= 3,
        "circle.min_points must be at least 3, got {}",
        opts.min_points
    );
    ensure!(opts.solver.max_iters > 0, "circle.solver.max_iters must be positive");
    if let Err(msg) = opts.loss.validate() {
        bail!("circle.loss: {msg}");
    }
    if let CenterStrategy::Fixed { center, radii } = &opts.center {
        ensure!(
            center.x.is_finite() && center.y.is_finite(),
            "circle.center must be finite"
        );
        for (seq, r) in radii {
            ensure!(
                r.is_finite() && *r > 0.0,
                "circle radius for {seq} must be positive, got {r}"
            );
        }
    }
    Ok(())
}

impl ProblemType for PoseCompletionProblem {
    type Config = PoseCompletionConfig;
    type Input = PoseCompletionInput;
    type State = super::state::PoseCompletionState;
    type Output = PoseCompletionOutput;
    type Export = PoseCompletionExport;

    fn name() -> &'static str {
        "pose_completion"
    }

    fn validate_input(input: &Self::Input) -> Result<()> {
        if input.sequences.num_records() == 0 {
            bail!("input contains no image records");
        }
        Ok(())
    }

    fn validate_config(config: &Self::Config) -> Result<()> {
        validate_key(&config.ingest.key)?;
        validate_circle(&config.circle)?;
        let threshold = config.cluster.time_threshold_s;
        ensure!(
            threshold.is_finite() && threshold > 0.0,
            "cluster.time_threshold_s must be positive, got {threshold}"
        );
        if let Err(msg) = config.export.sigmas.validate() {
            bail!("export.sigmas: {msg}");
        }
        if let Some(Err(msg)) = config.export.geo.as_ref().map(|g| g.validate()) {
            bail!("export.geo: {msg}");
        }
        Ok(())
    }

    fn on_config_change() -> InvalidationPolicy {
        InvalidationPolicy::CLEAR_COMPUTED
    }

    fn export(output: &Self::Output, config: &Self::Config) -> Result<Self::Export> {
        Ok(PoseCompletionExport {
            rows: export_rows(&output.sequences, &config.export),
            summary: output.summary.clone(),
        })
    }
}
