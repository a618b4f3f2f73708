//! Problem type trait for pipeline sessions.

use anyhow::Result;
use serde::{Serialize, de::DeserializeOwned};
use std::fmt::Debug;

/// What a session drops when its input or config is replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidationPolicy {
    pub clear_state: bool,
    pub clear_output: bool,
    pub clear_exports: bool,
}

impl InvalidationPolicy {
    pub const KEEP_ALL: Self = Self {
        clear_state: false,
        clear_output: false,
        clear_exports: false,
    };

    /// Drop state and output, keep previous exports.
    pub const CLEAR_COMPUTED: Self = Self {
        clear_state: true,
        clear_output: true,
        clear_exports: false,
    };

    pub const CLEAR_ALL: Self = Self {
        clear_state: true,
        clear_output: true,
        clear_exports: true,
    };
}

impl Default for InvalidationPolicy {
    fn default() -> Self {
        Self::KEEP_ALL
    }
}

/// A problem driven through a [`CalibrationSession`](super::CalibrationSession).
///
/// The trait only carries types, validation and export. The actual work
/// lives in free step functions taking `&mut CalibrationSession<Self>`, so
/// callers can run, skip or repeat individual stages.
///
/// - **Config**: thresholds and strategies, with a reference `Default`.
/// - **Input**: data loaded from disk.
/// - **State**: intermediate results between steps.
/// - **Output**: the final result.
/// - **Export**: what gets written for downstream tools.
pub trait ProblemType: Sized + 'static {
    type Config: Clone + Default + Serialize + DeserializeOwned + Debug;
    type Input: Clone + Serialize + DeserializeOwned + Debug;
    type State: Clone + Default + Serialize + DeserializeOwned + Debug;
    type Output: Clone + Serialize + DeserializeOwned + Debug;
    type Export: Clone + Serialize + DeserializeOwned + Debug;

    /// Stable snake_case identifier stored in session files.
    fn name() -> &'static str;

    /// Sessions written with a newer schema are rejected on load.
    fn schema_version() -> u32 {
        1
    }

    fn validate_input(_input: &Self::Input) -> Result<()> {
        Ok(())
    }

    fn validate_config(_config: &Self::Config) -> Result<()> {
        Ok(())
    }

    /// Checks that need both input and config.
    fn validate_input_config(_input: &Self::Input, _config: &Self::Config) -> Result<()> {
        Ok(())
    }

    fn on_input_change() -> InvalidationPolicy {
        InvalidationPolicy::CLEAR_COMPUTED
    }

    fn on_config_change() -> InvalidationPolicy {
        InvalidationPolicy::KEEP_ALL
    }

    /// Convert the output into the export format.
    fn export(output: &Self::Output, config: &Self::Config) -> Result<Self::Export>;
}
