//! Entry crate for gantry pose completion.
//!
//! A gantry camera travels circular sweeps around a pivot. An external
//! photogrammetry tool measures the pose of some images; this crate
//! estimates poses for the rest and grades every pose by confidence.
//!
//! # Quick Start
//!
//! ```no_run
//! # fn main() -> anyhow::Result<()> {
//! # let input = unimplemented!();
//! use gantry::prelude::*;
//!
//! let mut session = CalibrationSession::<PoseCompletionProblem>::new();
//! session.set_input(input)?;
//! let mut config = session.config.clone();
//! config.cluster.time_threshold_s = 8.0;
//! session.set_config(config)?;
//! run_pipeline(&mut session)?;
//!
//! for diag in &session.state.diagnostics {
//!     println!("{diag}");
//! }
//! let export = session.export()?;
//! # Ok(())
//! # }
//! ```
//!
//! # Module Organization
//!
//! - [`session`]: session container and problem trait
//! - [`pose_completion`]: the problem type and its step functions
//! - [`stages`]: stage algorithms working directly on a `SequenceSet`
//! - [`io`]: file formats
//! - [`core`], [`optim`]: foundation crates

// ═══════════════════════════════════════════════════════════════════════════════
// Session Framework
// ═══════════════════════════════════════════════════════════════════════════════

pub mod session {
    pub use gantry_pipeline::session::{
        CalibrationSession, ExportRecord, InvalidationPolicy, LogEntry, ProblemType,
        SessionMetadata,
    };
}

/// Pose completion pipeline.
///
/// # Steps
/// 1. `step_ingest` - merge measured poses
/// 2. `step_fit_circles` - pivot center and radii
/// 3. `step_assign_angles` - polar angles of measured images
/// 4. `step_visual_calibration` - landmark correspondences
/// 5. `step_cluster` - temporal runs
/// 6. `step_interpolate` - positions along the arc
/// 7. `step_propagate_orientation` - orientations from the tangent
/// 8. `step_finalize` - store the output
pub mod pose_completion {
    pub use gantry_pipeline::pose_completion::{
        PoseCompletionConfig, PoseCompletionExport, PoseCompletionInput, PoseCompletionOutput,
        PoseCompletionProblem, PoseCompletionState, RunSummary, run_pipeline, run_stage,
        step_assign_angles, step_cluster, step_finalize, step_fit_circles, step_ingest,
        step_interpolate, step_propagate_orientation, step_visual_calibration,
    };
}

pub mod stages {
    pub use gantry_pipeline::stages::*;
}

pub mod io {
    pub use gantry_pipeline::io::*;
}

// ═══════════════════════════════════════════════════════════════════════════════
// Foundation Crates
// ═══════════════════════════════════════════════════════════════════════════════

/// Angles, Euler conventions, records and timestamps.
pub mod core {
    pub use gantry_core::*;
}

/// Least squares backend and circle fit.
pub mod optim {
    pub use gantry_optim::*;
}

/// Synthetic sweeps for tests and demos.
pub mod synthetic {
    pub use gantry_core::synthetic::*;
}

pub mod prelude {
    pub use crate::pose_completion::{
        PoseCompletionConfig, PoseCompletionInput, PoseCompletionProblem, run_pipeline,
        run_stage,
    };
    pub use crate::session::{CalibrationSession, ProblemType};
    pub use gantry_core::{ImageRecord, Opk, Pt2, Pt3, SequenceInfo, SequenceSet, Status};
    pub use gantry_pipeline::stages::{Stage, StageDiagnostic};
}
