//! Orientation propagation from `original` records.
//!
//! Two models are available:
//! - **Offset**: the camera heading keeps a constant deviation from the
//!   ideal tangent of the circle. `kappa = tangent(p) + median(κ_i − tangent_i)`,
//!   omega/phi are the plain medians of the originals.
//! - **Circular interpolation**: omega/phi/kappa are sampled at the
//!   originals' polar angles and interpolated with period 360.
//!
//! The tangent side follows the travel direction, which is measured from
//! time-adjacent originals unless configured.

use gantry_core::{
    ImageRecord, Opk, Pt2, Real, SequenceInfo, SequenceSet, Status, TravelDirection, ideal_tangent,
    lerp_short_arc, median, polar_angle, short_arc_delta, wrap_180, wrap_360,
};
use serde::{Deserialize, Serialize};

use super::{Stage, StageDiagnostic, report};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OrientationModel {
    #[default]
    Offset,
    CircularInterpolation,
}

/// Travel direction used for the ideal tangent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TravelSetting {
    /// Measure from the originals of each sequence.
    #[default]
    Auto,
    Counterclockwise,
    Clockwise,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OrientationOptions {
    pub model: OrientationModel,
    pub travel: TravelSetting,
}

/// Per-sequence outcome of orientation propagation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrientationSummary {
    pub sequence: String,
    pub direction: TravelDirection,
    /// Median kappa deviation from the ideal tangent (offset model).
    pub kappa_offset: Option<Real>,
    pub omega: Option<Real>,
    pub phi: Option<Real>,
    pub num_originals: usize,
    pub updated: usize,
}

/// One `original` record reduced to what the models need.
#[derive(Debug, Clone, Copy)]
struct Sample {
    angle: Real,
    opk: Opk,
}

/// Sum of short-arc angle steps between time-adjacent originals.
///
/// Originals without timestamp or angle are ignored. Returns `None` when
/// the sweep is zero and no direction can be decided.
pub fn travel_direction(seq: &SequenceInfo) -> Option<TravelDirection> {
    let mut timed: Vec<_> = seq
        .originals()
        .filter_map(|r| Some((r.timestamp?, r.angular_position?, r.id)))
        .collect();
    timed.sort_by(|a, b| a.0.cmp(&b.0).then(a.2.cmp(&b.2)));
    let sweep: Real = timed
        .windows(2)
        .map(|w| short_arc_delta(w[0].1, w[1].1))
        .sum();
    TravelDirection::from_signed_sweep(sweep)
}

enum Model {
    Broadcast(Opk),
    Offset { offset: Real, omega: Real, phi: Real },
    Circular(Vec<Sample>),
}

fn record_angle(center: &Pt2, record: &ImageRecord) -> Option<Real> {
    record
        .planar_position()
        .map(|p| polar_angle(center, &p))
        .or(record.angular_position)
}

/// Interpolate orientation at `angle` from samples sorted by angle.
fn interpolate_circular(samples: &[Sample], angle: Real) -> Opk {
    let n = samples.len();
    let upper = samples.partition_point(|s| s.angle <= angle);
    // lower is the last sample at or before `angle`, wrapping to the end
    let lo = if upper == 0 { n - 1 } else { upper - 1 };
    let hi = (lo + 1) % n;
    let (a, b) = (samples[lo], samples[hi]);

    let span = wrap_360(b.angle - a.angle);
    let t = if span > 0.0 {
        wrap_360(angle - a.angle) / span
    } else {
        0.0
    };
    Opk::new(
        wrap_180(lerp_short_arc(a.opk.omega, b.opk.omega, t)),
        wrap_180(lerp_short_arc(a.opk.phi, b.opk.phi, t)),
        wrap_360(lerp_short_arc(a.opk.kappa, b.opk.kappa, t)),
    )
}

fn is_target(record: &ImageRecord) -> bool {
    record.status != Status::Original
        && (record.position.is_some() || record.angular_position.is_some())
}

fn propagate_sequence(
    seq: &mut SequenceInfo,
    opts: &OrientationOptions,
    diagnostics: &mut Vec<StageDiagnostic>,
) -> Option<OrientationSummary> {
    let originals: Vec<&ImageRecord> = seq
        .originals()
        .filter(|r| r.orientation.is_some_and(|o| o.is_finite()))
        .collect();
    if originals.is_empty() {
        report(
            diagnostics,
            Stage::Orientation,
            Some(&seq.id),
            "no original orientations, nothing to propagate",
        );
        return None;
    }
    let Some(center) = seq.center else {
        report(
            diagnostics,
            Stage::Orientation,
            Some(&seq.id),
            "no axis center, orientation propagation skipped",
        );
        return None;
    };

    let direction = match opts.travel {
        TravelSetting::Counterclockwise => TravelDirection::Counterclockwise,
        TravelSetting::Clockwise => TravelDirection::Clockwise,
        TravelSetting::Auto => travel_direction(seq).unwrap_or_else(|| {
            report(
                diagnostics,
                Stage::Orientation,
                Some(&seq.id),
                "travel direction undecidable, assuming counter-clockwise",
            );
            TravelDirection::Counterclockwise
        }),
    };

    let samples: Vec<Sample> = originals
        .iter()
        .filter_map(|r| {
            Some(Sample {
                angle: record_angle(&center, r)?,
                opk: r.orientation?,
            })
        })
        .collect();
    let num_originals = originals.len();

    let mut summary = OrientationSummary {
        sequence: seq.id.clone(),
        direction,
        kappa_offset: None,
        omega: None,
        phi: None,
        num_originals,
        updated: 0,
    };

    let model = if num_originals == 1 || samples.is_empty() {
        Model::Broadcast(originals[0].orientation?)
    } else {
        match opts.model {
            OrientationModel::Offset => {
                let deviations: Vec<Real> = samples
                    .iter()
                    .map(|s| wrap_180(s.opk.kappa - wrap_360(s.angle + direction.sign() * 90.0)))
                    .collect();
                let omegas: Vec<Real> = samples.iter().map(|s| s.opk.omega).collect();
                let phis: Vec<Real> = samples.iter().map(|s| s.opk.phi).collect();
                match (median(&deviations), median(&omegas), median(&phis)) {
                    (Some(offset), Some(omega), Some(phi)) => {
                        summary.kappa_offset = Some(offset);
                        summary.omega = Some(omega);
                        summary.phi = Some(phi);
                        Model::Offset { offset, omega, phi }
                    }
                    _ => return None,
                }
            }
            OrientationModel::CircularInterpolation => {
                let mut sorted = samples;
                sorted.sort_by(|a, b| a.angle.total_cmp(&b.angle));
                Model::Circular(sorted)
            }
        }
    };

    for record in seq.items.iter_mut().filter(|r| is_target(r)) {
        let opk = match &model {
            Model::Broadcast(opk) => *opk,
            Model::Offset { offset, omega, phi } => {
                let tangent = match record.planar_position() {
                    Some(p) => ideal_tangent(&center, &p, direction),
                    None => match record.angular_position {
                        Some(a) => wrap_360(a + direction.sign() * 90.0),
                        None => continue,
                    },
                };
                Opk::new(*omega, *phi, wrap_360(tangent + offset))
            }
            Model::Circular(samples) => {
                let Some(angle) = record_angle(&center, record) else {
                    continue;
                };
                interpolate_circular(samples, angle)
            }
        };
        record.orientation = Some(opk);
        summary.updated += 1;
    }

    log::debug!(
        "{}: {:?} travel, offset {:?}, {} orientations from {} originals",
        summary.sequence,
        summary.direction,
        summary.kappa_offset,
        summary.updated,
        summary.num_originals
    );
    Some(summary)
}

/// Derive orientations for every positioned non-`original` record.
pub fn propagate_orientation(
    set: &mut SequenceSet,
    opts: &OrientationOptions,
    diagnostics: &mut Vec<StageDiagnostic>,
) -> Vec<OrientationSummary> {
    let summaries: Vec<OrientationSummary> = set
        .iter_mut()
        .filter_map(|seq| propagate_sequence(seq, opts, diagnostics))
        .collect();
    let updated: usize = summaries.iter().map(|s| s.updated).sum();
    log::info!(
        "orientation: {} records updated in {} sequences",
        updated,
        summaries.len()
    );
    summaries
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_core::synthetic::sweep::{SweepSpec, sweep};
    use gantry_core::{Pt3, angle_to_xy};

    fn prepared(spec: &SweepSpec, keep_every: usize) -> (SequenceSet, SequenceInfo) {
        let truth = sweep(spec);
        let mut seq = truth.clone();
        seq.center = Some(spec.center);
        seq.radius = Some(spec.radius);
        for (i, r) in seq.items.iter_mut().enumerate() {
            if i % keep_every != 0 {
                r.relabel(Status::Estimated);
                r.orientation = None;
            }
        }
        let mut set = SequenceSet::new();
        set.insert(seq);
        (set, truth)
    }

    fn assert_matches_truth(set: &SequenceSet, truth: &SequenceInfo, tol: Real) {
        for (got, want) in set.records().zip(&truth.items) {
            let (g, w) = (got.orientation.unwrap(), want.orientation.unwrap());
            assert!(
                short_arc_delta(g.kappa, w.kappa).abs() < tol,
                "image {}: kappa {} vs {}",
                got.id,
                g.kappa,
                w.kappa
            );
            assert!((g.omega - w.omega).abs() < tol);
            assert!((g.phi - w.phi).abs() < tol);
        }
    }

    #[test]
    fn offset_model_recovers_counterclockwise_heading() {
        let spec = SweepSpec::default();
        let (mut set, truth) = prepared(&spec, 5);
        let mut diags = Vec::new();
        let summaries = propagate_orientation(&mut set, &OrientationOptions::default(), &mut diags);

        assert!(diags.is_empty(), "{diags:?}");
        let s = &summaries[0];
        assert_eq!(s.direction, TravelDirection::Counterclockwise);
        assert!((s.kappa_offset.unwrap() - spec.heading_offset).abs() < 1e-9);
        assert_eq!(s.updated, spec.num_images - s.num_originals);
        assert_matches_truth(&set, &truth, 1e-9);
    }

    #[test]
    fn travel_sign_comes_from_data() {
        // clockwise sweep: a hardcoded +90 tangent would be 180 degrees off
        let spec = SweepSpec {
            direction: TravelDirection::Clockwise,
            start_angle: 10.0,
            heading_offset: 4.0,
            ..SweepSpec::default()
        };
        let (mut set, truth) = prepared(&spec, 4);
        let seq = set.get("Step01").unwrap();
        assert_eq!(travel_direction(seq), Some(TravelDirection::Clockwise));

        let mut diags = Vec::new();
        let summaries = propagate_orientation(&mut set, &OrientationOptions::default(), &mut diags);
        assert_eq!(summaries[0].direction, TravelDirection::Clockwise);
        assert_matches_truth(&set, &truth, 1e-9);
    }

    #[test]
    fn circular_model_follows_samples() {
        let spec = SweepSpec {
            num_images: 41,
            ..SweepSpec::default()
        };
        let (mut set, truth) = prepared(&spec, 2);
        let opts = OrientationOptions {
            model: OrientationModel::CircularInterpolation,
            ..Default::default()
        };
        let mut diags = Vec::new();
        propagate_orientation(&mut set, &opts, &mut diags);
        // kappa is linear in the polar angle for a constant offset
        assert_matches_truth(&set, &truth, 1e-6);
    }

    #[test]
    fn circular_interpolation_wraps_seam() {
        let samples = [
            Sample {
                angle: 10.0,
                opk: Opk::new(0.0, 0.0, 10.0),
            },
            Sample {
                angle: 350.0,
                opk: Opk::new(0.0, 0.0, 350.0),
            },
        ];
        let mid = interpolate_circular(&samples, 0.0);
        assert!(mid.kappa.abs() < 1e-9 || (mid.kappa - 360.0).abs() < 1e-9);
        let q = interpolate_circular(&samples, 5.0);
        assert!((q.kappa - 5.0).abs() < 1e-9, "got {}", q.kappa);
        let inside = interpolate_circular(&samples, 355.0);
        assert!((inside.kappa - 355.0).abs() < 1e-9, "got {}", inside.kappa);
    }

    #[test]
    fn single_original_is_broadcast() {
        let mut seq = SequenceInfo::new("S");
        seq.center = Some(Pt2::origin());
        for (id, status) in [(1, Status::Original), (2, Status::Estimated)] {
            let xy = angle_to_xy(30.0 * id as Real, 10.0, &Pt2::origin());
            let mut r = ImageRecord::builder()
                .id(id)
                .filename(format!("{id}.jpg"))
                .sequence_id("S")
                .position(Some(Pt3::new(xy.x, xy.y, 0.0)))
                .build()
                .unwrap();
            r.relabel(status);
            seq.items.push(r);
        }
        seq.items[0].orientation = Some(Opk::new(1.0, 2.0, 3.0));
        let mut set = SequenceSet::new();
        set.insert(seq);

        let mut diags = Vec::new();
        propagate_orientation(&mut set, &OrientationOptions::default(), &mut diags);
        let items = &set.get("S").unwrap().items;
        assert_eq!(items[1].orientation, Some(Opk::new(1.0, 2.0, 3.0)));
        // no timestamps: direction undecidable
        assert_eq!(diags.len(), 1);
    }

    #[test]
    fn no_originals_is_a_skip() {
        let spec = SweepSpec::default();
        let (mut set, _) = prepared(&spec, 1);
        for r in set.records_mut() {
            r.relabel(Status::Uncalibrated);
        }
        let mut diags = Vec::new();
        let summaries = propagate_orientation(&mut set, &OrientationOptions::default(), &mut diags);
        assert!(summaries.is_empty());
        assert_eq!(diags.len(), 1);
    }
}
