//! Deterministic synthetic data generation helpers.
//!
//! Building blocks for constructing gantry datasets used in tests and
//! benchmarks:
//! - circular sweeps with known poses,
//! - deterministic track jitter.
//!
//! # Example
//!
//! ```
//! use gantry_core::synthetic::sweep::{strip_poses, sweep, SweepSpec};
//!
//! let truth = sweep(&SweepSpec::default());
//! let ground_truth = strip_poses(&truth);
//! assert_eq!(truth.items.len(), ground_truth.items.len());
//! ```

pub mod noise;
pub mod sweep;
