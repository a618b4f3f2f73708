//! Pose completion for gantry camera sweeps.
//!
//! Takes image records of one or more circular sweeps, a table of
//! externally measured poses for a subset of images, and optionally a set
//! of landmark correspondences, then estimates a pose for every remaining
//! image.
//!
//! Pipeline:
//! 1. [`step_ingest`]: merge measured poses, relabel every record.
//! 2. [`step_fit_circles`]: pivot center and track radius per sequence.
//! 3. [`step_assign_angles`]: polar angle of each measured image.
//! 4. [`step_visual_calibration`]: place landmark-matched images.
//! 5. [`step_cluster`]: split sequences into contiguous runs.
//! 6. [`step_interpolate`]: fill gaps between anchors along the arc.
//! 7. [`step_propagate_orientation`]: orientations from the travel tangent.
//! 8. [`step_finalize`]: store the completed records as output.

mod problem;
mod state;
mod steps;

pub use problem::{
    PoseCompletionConfig, PoseCompletionExport, PoseCompletionInput, PoseCompletionOutput,
    PoseCompletionProblem, RunSummary,
};
pub use state::PoseCompletionState;
pub use steps::{
    run_pipeline, run_stage, step_assign_angles, step_cluster, step_finalize, step_fit_circles,
    step_ingest, step_interpolate, step_propagate_orientation, step_visual_calibration,
};
