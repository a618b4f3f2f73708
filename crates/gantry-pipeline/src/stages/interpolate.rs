//! Angular interpolation inside clusters.
//!
//! Angles, not X/Y, are interpolated so every estimate stays on the circle.
//! Runs of records below `visually calibrated` are filled from the
//! calibrated records that bound them inside the same cluster.

use std::collections::BTreeMap;

use gantry_core::{
    ImageRecord, Pt2, Pt3, Real, SequenceInfo, SequenceSet, Status, angle_to_xy, continuation,
    wrap_360,
};
use serde::{Deserialize, Serialize};

use super::{Stage, StageDiagnostic, report};

/// How the far boundary angle is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ArcMode {
    /// Use both boundary angles as stored: `θa + k·(θb − θa)/(n + 1)`.
    #[default]
    AsRecorded,
    /// Re-express `θb` as its continuation closest to `θa` so the run
    /// follows the short arc across the 0/360 seam.
    ShortArc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InterpolationOptions {
    pub arc: ArcMode,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterpolationSummary {
    /// Records placed between two boundaries.
    pub interpolated: usize,
    /// Records copied from a single boundary at a run end.
    pub one_sided: usize,
    /// Records left without any boundary.
    pub unresolved: usize,
}

/// Boundary of a run: calibrated record with a known angle.
#[derive(Debug, Clone, Copy)]
struct Anchor {
    angle: Real,
    z: Option<Real>,
}

fn anchor(record: &ImageRecord) -> Option<Anchor> {
    if !record.status.is_calibrated() {
        return None;
    }
    record.angular_position.map(|angle| Anchor {
        angle,
        z: record.position.map(|p| p.z),
    })
}

/// Angles of the `n` interior records of a run bounded by `a` and `b`.
pub fn interior_angles(theta_a: Real, theta_b: Real, n: usize, arc: ArcMode) -> Vec<Real> {
    let theta_b = match arc {
        ArcMode::AsRecorded => theta_b,
        ArcMode::ShortArc => continuation(theta_a, theta_b),
    };
    let step = (theta_b - theta_a) / (n + 1) as Real;
    (1..=n).map(|k| theta_a + k as Real * step).collect()
}

struct Circle {
    center: Pt2,
    radius: Real,
    z_reference: Option<Real>,
}

impl Circle {
    fn place(&self, record: &mut ImageRecord, angle: Real, z: Option<Real>) {
        let xy = angle_to_xy(angle, self.radius, &self.center);
        let z = z.or(self.z_reference).unwrap_or_default();
        record.position = Some(Pt3::new(xy.x, xy.y, z));
        record.angular_position = Some(wrap_360(angle));
        record.promote(Status::Estimated);
    }
}

/// Fill one cluster, given as indices into `items` in sequence order.
fn fill_cluster(
    items: &mut [ImageRecord],
    indices: &[usize],
    circle: &Circle,
    arc: ArcMode,
    summary: &mut InterpolationSummary,
) {
    let mut pos = 0;
    while pos < indices.len() {
        if items[indices[pos]].status.is_calibrated() {
            pos += 1;
            continue;
        }
        let start = pos;
        while pos < indices.len() && !items[indices[pos]].status.is_calibrated() {
            pos += 1;
        }
        let run = &indices[start..pos];
        let left = start
            .checked_sub(1)
            .and_then(|i| anchor(&items[indices[i]]));
        let right = indices.get(pos).and_then(|&i| anchor(&items[i]));

        match (left, right) {
            (Some(a), Some(b)) => {
                let n = run.len();
                let angles = interior_angles(a.angle, b.angle, n, arc);
                for (k, (&idx, angle)) in run.iter().zip(angles).enumerate() {
                    // 1-indexed position k+1; ties go to the left boundary
                    let z = if k + 1 <= n - k { a.z } else { b.z };
                    circle.place(&mut items[idx], angle, z);
                }
                summary.interpolated += n;
            }
            (Some(edge), None) | (None, Some(edge)) => {
                for &idx in run {
                    circle.place(&mut items[idx], edge.angle, edge.z);
                }
                summary.one_sided += run.len();
            }
            (None, None) => summary.unresolved += run.len(),
        }
    }
}

fn interpolate_sequence(
    seq: &mut SequenceInfo,
    opts: &InterpolationOptions,
    diagnostics: &mut Vec<StageDiagnostic>,
) -> Option<InterpolationSummary> {
    let Some((center, radius)) = seq.circle() else {
        report(
            diagnostics,
            Stage::Interpolate,
            Some(&seq.id),
            "no center/radius, interpolation skipped",
        );
        return None;
    };
    if seq.items.iter().any(|r| r.cluster_id.is_none()) {
        report(
            diagnostics,
            Stage::Interpolate,
            Some(&seq.id),
            "records are not clustered, interpolation skipped",
        );
        return None;
    }

    seq.sort_items();
    let mut clusters: BTreeMap<u32, Vec<usize>> = BTreeMap::new();
    for (i, r) in seq.items.iter().enumerate() {
        if let Some(c) = r.cluster_id {
            clusters.entry(c).or_default().push(i);
        }
    }

    let circle = Circle {
        center,
        radius,
        z_reference: seq.z_reference,
    };
    let mut summary = InterpolationSummary::default();
    for indices in clusters.values() {
        fill_cluster(&mut seq.items, indices, &circle, opts.arc, &mut summary);
    }
    log::debug!(
        "{}: {} interpolated, {} one-sided, {} unresolved",
        seq.id,
        summary.interpolated,
        summary.one_sided,
        summary.unresolved
    );
    Some(summary)
}

/// Interpolate every clustered sequence with a known circle.
pub fn interpolate_angles(
    set: &mut SequenceSet,
    opts: &InterpolationOptions,
    diagnostics: &mut Vec<StageDiagnostic>,
) -> InterpolationSummary {
    let mut total = InterpolationSummary::default();
    for seq in set.iter_mut() {
        if let Some(s) = interpolate_sequence(seq, opts, diagnostics) {
            total.interpolated += s.interpolated;
            total.one_sided += s.one_sided;
            total.unresolved += s.unresolved;
        }
    }
    log::info!(
        "interpolation: {} between boundaries, {} one-sided, {} unresolved",
        total.interpolated,
        total.one_sided,
        total.unresolved
    );
    total
}
