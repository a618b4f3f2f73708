//! Non-linear least squares for gantry pose completion.
//!
//! A small dense NLLS layer (`NllsProblem` + backend), IRLS robust losses
//! and the geometric circle fit built on them.

pub mod backend_lm;
pub mod circle;
pub mod robust;
mod traits;

pub use crate::backend_lm::LmBackend;
pub use crate::circle::{
    CircleFit, CircleFitError, CircleFitOptions, CircleFitProblem, fit_circle, fit_circle_with,
    mean_distance,
};
pub use crate::robust::RobustLoss;
pub use crate::traits::{NllsProblem, NllsSolverBackend, SolveOptions, SolveReport};
