//! Data contracts exchanged with external tools.
//!
//! - record JSON (ground truth in, completed records out),
//! - the external calibration table,
//! - the visual-match CSV,
//! - the export CSV.

use std::path::{Path, PathBuf};

use thiserror::Error;

pub mod calibration;
pub mod export_csv;
pub mod records;
pub mod visual;

pub use calibration::{load_calibration_table, parse_calibration_table};
pub use export_csv::{EXPORT_HEADER, GEO_COLUMNS, save_export_csv, write_export_csv};
pub use records::{load_records, records_from_json, records_to_json, save_records};
pub use visual::{load_visual_matches, parse_visual_matches};

#[derive(Debug, Error)]
pub enum DataError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid CSV in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("{path} has no `{column}` column")]
    MissingColumn { path: PathBuf, column: String },
}

impl DataError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        DataError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn json(path: &Path, source: serde_json::Error) -> Self {
        DataError::Json {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn csv(path: &Path, source: csv::Error) -> Self {
        DataError::Csv {
            path: path.to_path_buf(),
            source,
        }
    }
}
