//! Intermediate state for pose completion.

use gantry_core::SequenceSet;
use serde::{Deserialize, Serialize};

use crate::stages::circle::CircleSummary;
use crate::stages::ingest::IngestSummary;
use crate::stages::interpolate::InterpolationSummary;
use crate::stages::orientation::OrientationSummary;
use crate::stages::visual::VisualSummary;
use crate::stages::{Stage, StageDiagnostic};

/// Working records plus what each stage reported.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PoseCompletionState {
    /// Records as modified by the stages run so far.
    pub working: Option<SequenceSet>,

    /// Stages run since the last ingest, in execution order.
    pub completed: Vec<Stage>,

    /// Skipped sequences and other non-fatal events.
    pub diagnostics: Vec<StageDiagnostic>,

    // ─────────────────────────────────────────────────────────────────────────
    // Per-stage summaries
    // ─────────────────────────────────────────────────────────────────────────
    pub ingest: Option<IngestSummary>,
    pub circles: Option<Vec<CircleSummary>>,
    /// Records that received an angle from their measured position.
    pub angles_assigned: Option<usize>,
    pub visual: Option<VisualSummary>,
    pub num_clusters: Option<u32>,
    pub interpolation: Option<InterpolationSummary>,
    pub orientation: Option<Vec<OrientationSummary>>,
}

impl PoseCompletionState {
    pub fn has_working(&self) -> bool {
        self.working.is_some()
    }

    pub fn has_run(&self, stage: Stage) -> bool {
        self.completed.contains(&stage)
    }

    /// Diagnostics raised by `stage`.
    pub fn diagnostics_for(&self, stage: Stage) -> impl Iterator<Item = &StageDiagnostic> {
        self.diagnostics.iter().filter(move |d| d.stage == stage)
    }

    /// Forget everything derived from the records, keeping `working`.
    pub fn clear_summaries(&mut self) {
        *self = Self {
            working: self.working.take(),
            ..Self::default()
        };
    }
}
