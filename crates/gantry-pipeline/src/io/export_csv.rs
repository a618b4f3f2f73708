//! Export CSV consumed by photogrammetry tools.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use csv::WriterBuilder;
use gantry_core::Real;

use crate::stages::export::ExportRow;

use super::DataError;

pub const EXPORT_HEADER: &str = "#Image,X,Y,Z,Omega,Phi,Kappa,SigmaHoriz,SigmaVert";
/// Columns appended when any row carries geographic coordinates.
pub const GEO_COLUMNS: &str = "Latitude,Longitude";

fn cell(value: Option<Real>) -> String {
    value.map(|v| format!("{v:.6}")).unwrap_or_default()
}

fn degrees(value: Option<Real>) -> String {
    value.map(|v| format!("{v:.9}")).unwrap_or_default()
}

/// Write the header line and one line per row. Unknown pose values are
/// left empty. Latitude/longitude columns are written only if some row has
/// them.
pub fn write_export_csv<W: Write>(mut out: W, rows: &[ExportRow]) -> Result<(), csv::Error> {
    let with_geo = rows.iter().any(|r| r.geo.is_some());
    if with_geo {
        writeln!(out, "{EXPORT_HEADER},{GEO_COLUMNS}")?;
    } else {
        writeln!(out, "{EXPORT_HEADER}")?;
    }
    let mut writer = WriterBuilder::new().has_headers(false).from_writer(out);
    for row in rows {
        let mut record = vec![
            row.image.clone(),
            cell(row.position.map(|p| p.x)),
            cell(row.position.map(|p| p.y)),
            cell(row.position.map(|p| p.z)),
            cell(row.orientation.map(|o| o.omega)),
            cell(row.orientation.map(|o| o.phi)),
            cell(row.orientation.map(|o| o.kappa)),
            cell(Some(row.sigma.horizontal)),
            cell(Some(row.sigma.vertical)),
        ];
        if with_geo {
            record.push(degrees(row.geo.map(|g| g.latitude)));
            record.push(degrees(row.geo.map(|g| g.longitude)));
        }
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn save_export_csv(path: &Path, rows: &[ExportRow]) -> Result<(), DataError> {
    let file = File::create(path).map_err(|e| DataError::io(path, e))?;
    write_export_csv(file, rows).map_err(|e| DataError::csv(path, e))?;
    log::info!("wrote {} export rows to {}", rows.len(), path.display());
    Ok(())
}
