//! Session framework.
//!
//! A [`CalibrationSession`] is a mutable container holding config, input,
//! intermediate state and a single output for one [`ProblemType`]. Step
//! functions mutate it in place:
//!
//! ```no_run
//! use gantry_pipeline::session::CalibrationSession;
//! use gantry_pipeline::pose_completion::{PoseCompletionProblem, run_pipeline};
//! # fn main() -> anyhow::Result<()> {
//! # let input = unimplemented!();
//! let mut session = CalibrationSession::<PoseCompletionProblem>::new();
//! session.set_input(input)?;
//! run_pipeline(&mut session)?;
//! let export = session.export()?;
//! # Ok(())
//! # }
//! ```

pub mod calibsession;
pub mod problem_type;
pub mod types;

pub use calibsession::CalibrationSession;
pub use problem_type::{InvalidationPolicy, ProblemType};
pub use types::{ExportRecord, LogEntry, SessionMetadata, current_timestamp};
