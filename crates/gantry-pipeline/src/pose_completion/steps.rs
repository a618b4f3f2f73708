//! Step functions for pose completion.
//!
//! Each step runs one stage on the session's working record set and logs a
//! one-line summary. Steps are meant to run in [`Stage::ALL`] order, but any
//! of them can be run alone: without a working set the input records are
//! used as they are.

use anyhow::{Context, Result, anyhow};
use gantry_core::{SequenceSet, Status};

use crate::session::CalibrationSession;
use crate::stages::angles::assign_angles;
use crate::stages::circle::fit_circles;
use crate::stages::cluster::assign_clusters;
use crate::stages::ingest::ingest_calibration;
use crate::stages::interpolate::interpolate_angles;
use crate::stages::orientation::propagate_orientation;
use crate::stages::visual::apply_visual_matches;
use crate::stages::{Stage, StageDiagnostic};

use super::problem::{
    PoseCompletionConfig, PoseCompletionOutput, PoseCompletionProblem, RunSummary,
};
use super::state::PoseCompletionState;

type Session = CalibrationSession<PoseCompletionProblem>;

// ─────────────────────────────────────────────────────────────────────────────
// Helper Functions
// ─────────────────────────────────────────────────────────────────────────────

/// Config, working set and diagnostics, seeding the working set from the
/// input when no stage has run yet.
fn working_parts(
    session: &mut Session,
) -> Result<(
    &PoseCompletionConfig,
    &mut SequenceSet,
    &mut Vec<StageDiagnostic>,
)> {
    if session.state.working.is_none() {
        let seed = session.require_input()?.sequences.clone();
        session.state.working = Some(seed);
    }
    let state = &mut session.state;
    let set = state
        .working
        .as_mut()
        .ok_or_else(|| anyhow!("working set missing"))?;
    Ok((&session.config, set, &mut state.diagnostics))
}

fn finish(session: &mut Session, stage: Stage, diagnostics_before: usize, notes: String) {
    let raised = session.state.diagnostics.len() - diagnostics_before;
    let notes = if raised > 0 {
        format!("{notes} ({raised} diagnostics)")
    } else {
        notes
    };
    log::info!("{stage}: {notes}");
    session.state.completed.push(stage);
    session.log_success_with_notes(stage.name(), notes);
}

// ─────────────────────────────────────────────────────────────────────────────
// Step Functions
// ─────────────────────────────────────────────────────────────────────────────

/// Reset the working set to the input records and merge the calibration
/// table into it.
///
/// Clears every previous summary and diagnostic.
///
/// # Errors
///
/// Fails if the session does not validate.
pub fn step_ingest(session: &mut Session) -> Result<()> {
    session.validate()?;
    let input = session.require_input()?;
    let sequences = input.sequences.clone();
    let rows = input.calibration.clone();

    session.state = PoseCompletionState {
        working: Some(sequences),
        ..PoseCompletionState::default()
    };
    let (config, set, diagnostics) = working_parts(session)?;
    let summary = ingest_calibration(set, &rows, &config.ingest, diagnostics)
        .context("calibration ingestion failed")?;

    let notes = format!(
        "{} rows: {} original, {} uncalibrated, {} rejected, {} unmatched",
        summary.rows,
        summary.original,
        summary.uncalibrated,
        summary.rejected_rows,
        summary.unmatched_rows
    );
    session.state.ingest = Some(summary);
    finish(session, Stage::Ingest, 0, notes);
    Ok(())
}

/// Fit or assign the circle of every sequence.
///
/// # Errors
///
/// Fails if the session has no input.
pub fn step_fit_circles(session: &mut Session) -> Result<()> {
    let before = session.state.diagnostics.len();
    let (config, set, diagnostics) = working_parts(session)?;
    let summaries = fit_circles(set, &config.circle, diagnostics);
    let sequences = set.len();

    let notes = format!("{} of {} sequences have a circle", summaries.len(), sequences);
    session.state.circles = Some(summaries);
    finish(session, Stage::FitCircles, before, notes);
    Ok(())
}

/// Derive polar angles of records with a measured position.
///
/// # Errors
///
/// Fails if the session has no input.
pub fn step_assign_angles(session: &mut Session) -> Result<()> {
    let before = session.state.diagnostics.len();
    let (_, set, diagnostics) = working_parts(session)?;
    let assigned = assign_angles(set, diagnostics);

    session.state.angles_assigned = Some(assigned);
    finish(session, Stage::AssignAngles, before, format!("{assigned} angles"));
    Ok(())
}

/// Apply landmark correspondences, if the input has any.
///
/// # Errors
///
/// Fails if the session has no input.
pub fn step_visual_calibration(session: &mut Session) -> Result<()> {
    let before = session.state.diagnostics.len();
    let Some(table) = session.require_input()?.visual.clone() else {
        // Nothing to apply, but later stages still expect a working set.
        working_parts(session)?;
        finish(
            session,
            Stage::VisualCalibration,
            before,
            "no visual matches".to_string(),
        );
        return Ok(());
    };
    let (_, set, diagnostics) = working_parts(session)?;
    let summary = apply_visual_matches(set, &table, diagnostics);

    let notes = format!(
        "{} applied, {} unresolved, {} already calibrated",
        summary.applied, summary.unresolved, summary.already_calibrated
    );
    session.state.visual = Some(summary);
    finish(session, Stage::VisualCalibration, before, notes);
    Ok(())
}

/// Split every sequence into temporal clusters.
///
/// # Errors
///
/// Fails if the session has no input.
pub fn step_cluster(session: &mut Session) -> Result<()> {
    let before = session.state.diagnostics.len();
    let (config, set, _) = working_parts(session)?;
    let clusters = assign_clusters(set, &config.cluster);

    session.state.num_clusters = Some(clusters);
    finish(session, Stage::Cluster, before, format!("{clusters} clusters"));
    Ok(())
}

/// Estimate positions of uncalibrated runs between calibrated anchors.
///
/// # Errors
///
/// Fails if the session has no input.
pub fn step_interpolate(session: &mut Session) -> Result<()> {
    let before = session.state.diagnostics.len();
    let (config, set, diagnostics) = working_parts(session)?;
    let summary = interpolate_angles(set, &config.interpolation, diagnostics);

    let notes = format!(
        "{} interpolated, {} one-sided, {} unresolved",
        summary.interpolated, summary.one_sided, summary.unresolved
    );
    session.state.interpolation = Some(summary);
    finish(session, Stage::Interpolate, before, notes);
    Ok(())
}

/// Derive orientations of positioned non-`original` records.
///
/// # Errors
///
/// Fails if the session has no input.
pub fn step_propagate_orientation(session: &mut Session) -> Result<()> {
    let before = session.state.diagnostics.len();
    let (config, set, diagnostics) = working_parts(session)?;
    let summaries = propagate_orientation(set, &config.orientation, diagnostics);

    let updated: usize = summaries.iter().map(|s| s.updated).sum();
    let notes = format!("{updated} records in {} sequences", summaries.len());
    session.state.orientation = Some(summaries);
    finish(session, Stage::Orientation, before, notes);
    Ok(())
}

/// Store the working set as the session output.
///
/// # Errors
///
/// Fails if the session has no input.
pub fn step_finalize(session: &mut Session) -> Result<()> {
    let (_, set, _) = working_parts(session)?;
    let sequences = set.clone();
    let summary = RunSummary::from_set(&sequences);

    let notes = Status::ALL
        .iter()
        .map(|s| format!("{} {}", summary.total.get(*s), s))
        .collect::<Vec<_>>()
        .join(", ");
    session.set_output(PoseCompletionOutput { sequences, summary });
    let before = session.state.diagnostics.len();
    finish(session, Stage::Finalize, before, notes);
    Ok(())
}

/// Run a single stage, logging a failure entry if it errors.
///
/// # Errors
///
/// Propagates the stage error.
pub fn run_stage(session: &mut Session, stage: Stage) -> Result<()> {
    let result = match stage {
        Stage::Ingest => step_ingest(session),
        Stage::FitCircles => step_fit_circles(session),
        Stage::AssignAngles => step_assign_angles(session),
        Stage::VisualCalibration => step_visual_calibration(session),
        Stage::Cluster => step_cluster(session),
        Stage::Interpolate => step_interpolate(session),
        Stage::Orientation => step_propagate_orientation(session),
        Stage::Finalize => step_finalize(session),
    };
    if let Err(err) = &result {
        session.log_failure(stage.name(), format!("{err:#}"));
    }
    result.with_context(|| format!("stage `{stage}` failed"))
}

/// Run every stage in order.
///
/// Per-sequence problems do not stop the run; they end up in
/// `session.state.diagnostics`.
///
/// # Errors
///
/// Fails on invalid input or config.
pub fn run_pipeline(session: &mut Session) -> Result<()> {
    for stage in Stage::ALL {
        run_stage(session, stage)?;
    }
    let diagnostics = session.state.diagnostics.len();
    if diagnostics > 0 {
        log::warn!("pipeline finished with {diagnostics} diagnostics");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose_completion::PoseCompletionInput;
    use crate::stages::ingest::CalibrationRow;
    use gantry_core::synthetic::sweep::{SweepSpec, strip_poses, sweep};

    /// A sweep whose every third image is measured.
    fn session_with_gaps() -> Session {
        let truth = sweep(&SweepSpec {
            num_images: 10,
            ..SweepSpec::default()
        });
        let rows: Vec<CalibrationRow> = truth
            .items
            .iter()
            .step_by(3)
            .map(|r| {
                let o = r.orientation.unwrap();
                let angles = [o.omega, o.phi, o.kappa];
                CalibrationRow::from_pose(r.filename.clone(), r.position.unwrap(), angles)
            })
            .collect();
        let mut set = SequenceSet::new();
        set.insert(strip_poses(&truth));
        Session::with_input(PoseCompletionInput::new(set, rows)).unwrap()
    }

    #[test]
    fn pipeline_completes_every_record() {
        let mut session = session_with_gaps();
        run_pipeline(&mut session).unwrap();

        assert_eq!(session.state.completed, Stage::ALL.to_vec());
        assert_eq!(session.log.len(), Stage::ALL.len());
        assert!(session.log.iter().all(|e| e.success));
        assert!(session.state.diagnostics.is_empty(), "{:?}", session.state.diagnostics);

        let output = session.require_output().unwrap();
        assert_eq!(output.summary.total.get(Status::Original), 4);
        assert_eq!(output.summary.total.get(Status::Estimated), 6);
        assert!(
            output
                .sequences
                .records()
                .all(|r| r.position.is_some() && r.orientation.is_some())
        );
    }

    #[test]
    fn single_stage_uses_input_verbatim() {
        let mut session = session_with_gaps();
        run_stage(&mut session, Stage::Cluster).unwrap();
        assert_eq!(session.state.num_clusters, Some(1));
        assert!(session.state.ingest.is_none());
        assert!(session.state.has_working());
    }

    #[test]
    fn ingest_resets_previous_run() {
        let mut session = session_with_gaps();
        run_pipeline(&mut session).unwrap();
        step_ingest(&mut session).unwrap();
        assert_eq!(session.state.completed, vec![Stage::Ingest]);
        assert!(session.state.circles.is_none());
    }

    #[test]
    fn failures_are_logged() {
        let mut session = Session::new();
        let err = run_stage(&mut session, Stage::Ingest).unwrap_err();
        assert!(format!("{err:#}").contains("input not set"));
        assert_eq!(session.log.len(), 1);
        assert!(!session.log[0].success);
        assert_eq!(session.log[0].operation, "ingest");
    }
}
