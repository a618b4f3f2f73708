//! Session-driven pose completion for gantry camera sweeps.
//!
//! - [`stages`]: the stage algorithms, each operating on a
//!   [`SequenceSet`](gantry_core::SequenceSet).
//! - [`session`]: the generic session container.
//! - [`pose_completion`]: the problem type and its step functions.
//! - [`io`]: record JSON, calibration table, visual-match CSV, export CSV.

pub mod io;
pub mod pose_completion;
pub mod session;
pub mod stages;

pub use io::DataError;
pub use pose_completion::{
    PoseCompletionConfig, PoseCompletionExport, PoseCompletionInput, PoseCompletionOutput,
    PoseCompletionProblem, run_pipeline, run_stage,
};
pub use session::{CalibrationSession, ProblemType};
pub use stages::{Stage, StageDiagnostic};

pub type PoseCompletionSession = CalibrationSession<PoseCompletionProblem>;
