//! Core records and geometry primitives for `gantry`.
//!
//! This crate contains:
//! - linear algebra type aliases (`Real`, `Pt2`, `Pt3`, ...),
//! - degree-based angle helpers for motion on a circle,
//! - Omega/Phi/Kappa and Yaw/Pitch/Roll conventions,
//! - typed image records grouped into sequences.
//!
//! Pose model:
//! `xy = center + radius * (cos θ, sin θ)`, heading = tangent(θ) + offset

/// Degree-based planar angle helpers.
mod angle;
/// Euler-angle conventions.
mod euler;
/// Linear algebra type aliases and small statistics helpers.
mod math;
/// Image records and sequences.
mod record;
/// Deterministic synthetic sweeps for tests and examples.
pub mod synthetic;
/// EXIF timestamp handling.
pub mod time;

pub use angle::*;
pub use euler::*;
pub use math::*;
pub use record::*;
pub use time::{TIMESTAMP_FORMAT, format_timestamp, parse_timestamp, seconds_between};
