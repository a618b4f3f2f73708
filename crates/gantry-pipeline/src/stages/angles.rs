//! Angular assignment for `original` records.

use gantry_core::{SequenceSet, Status, polar_angle};

use super::{Stage, StageDiagnostic, report};

/// Set `angular_position` of every positioned `original` record from its
/// planar position. Returns the number of records assigned.
pub fn assign_angles(set: &mut SequenceSet, diagnostics: &mut Vec<StageDiagnostic>) -> usize {
    let mut assigned = 0;
    for seq in set.iter_mut() {
        let Some(center) = seq.center else {
            if seq.originals().next().is_some() {
                report(
                    diagnostics,
                    Stage::AssignAngles,
                    Some(&seq.id),
                    "no axis center, original records keep no angle",
                );
            }
            continue;
        };
        for record in seq.items.iter_mut() {
            if record.status != Status::Original {
                continue;
            }
            if let Some(p) = record.planar_position() {
                record.angular_position = Some(polar_angle(&center, &p));
                assigned += 1;
            }
        }
    }
    log::info!("assigned angular positions to {assigned} original records");
    assigned
}
