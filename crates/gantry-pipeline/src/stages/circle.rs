//! Per-sequence circle fit.
//!
//! Fits the pivot center and track radius from the planar positions of the
//! `original` records, and sets each sequence's `z_reference` to the median
//! original height.

use std::collections::BTreeMap;

use gantry_core::{Pt2, Real, SequenceInfo, SequenceSet, Status, median};
use gantry_optim::{
    CircleFit, CircleFitOptions, LmBackend, RobustLoss, SolveOptions, fit_circle_with,
    mean_distance,
};
use serde::{Deserialize, Serialize};

use super::{Stage, StageDiagnostic, report};

/// Where the pivot center comes from.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum CenterStrategy {
    /// Fit an independent circle per sequence.
    PerSequence,
    /// Fit the best-populated sequence and share its center; every
    /// sequence keeps its own radius (mean distance to the shared center).
    #[default]
    SharedBest,
    /// Surveyed center. Sequences missing from `radii` get the mean
    /// distance of their originals.
    Fixed {
        center: Pt2,
        #[serde(default)]
        radii: BTreeMap<String, Real>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircleOptions {
    pub center: CenterStrategy,
    /// Minimum number of `original` points (at least 3).
    pub min_points: usize,
    /// Loss on radial residuals; a robust loss tolerates mis-measured
    /// originals.
    pub loss: RobustLoss,
    pub solver: SolveOptions,
}

impl Default for CircleOptions {
    fn default() -> Self {
        Self {
            center: CenterStrategy::default(),
            min_points: 3,
            loss: RobustLoss::None,
            solver: SolveOptions::default(),
        }
    }
}

/// How a sequence's center was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CenterSource {
    Fitted,
    Shared,
    Fixed,
}

/// Quality summary of one sequence's circle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircleSummary {
    pub sequence: String,
    pub center: Pt2,
    pub radius: Real,
    /// RMS of `|p - c| - r` over the originals.
    pub rms: Real,
    pub num_points: usize,
    /// Originals weighted below one half by the robust loss.
    #[serde(default)]
    pub downweighted: usize,
    pub converged: bool,
    pub source: CenterSource,
}

/// Weight under which an original counts as down-weighted.
const DOWNWEIGHT_THRESHOLD: Real = 0.5;

fn original_points(seq: &SequenceInfo) -> Vec<Pt2> {
    seq.items
        .iter()
        .filter(|r| r.status == Status::Original)
        .filter_map(|r| r.planar_position())
        .filter(|p| p.x.is_finite() && p.y.is_finite())
        .collect()
}

fn radial_rms(points: &[Pt2], center: &Pt2, radius: Real) -> Real {
    if points.is_empty() {
        return 0.0;
    }
    let ss: Real = points
        .iter()
        .map(|p| ((p - center).norm() - radius).powi(2))
        .sum();
    (ss / points.len() as Real).sqrt()
}

fn fit(points: &[Pt2], opts: &CircleOptions) -> Result<CircleFit, gantry_optim::CircleFitError> {
    let fit_opts = CircleFitOptions {
        min_points: opts.min_points,
        loss: opts.loss,
        solver: opts.solver,
        ..CircleFitOptions::default()
    };
    fit_circle_with(&LmBackend, points, &fit_opts)
}

fn set_circle(seq: &mut SequenceInfo, center: Pt2, radius: Real) {
    seq.center = Some(center);
    seq.radius = Some(radius);
}

/// Fit (or assign) the circle of every sequence.
pub fn fit_circles(
    set: &mut SequenceSet,
    opts: &CircleOptions,
    diagnostics: &mut Vec<StageDiagnostic>,
) -> Vec<CircleSummary> {
    let min_points = opts.min_points.max(3);
    let mut summaries = Vec::new();

    for seq in set.iter_mut() {
        seq.center = None;
        seq.radius = None;
        let heights: Vec<Real> = seq
            .originals()
            .filter_map(|r| r.position.map(|p| p.z))
            .filter(|z| z.is_finite())
            .collect();
        seq.z_reference = median(&heights);
    }

    match &opts.center {
        CenterStrategy::PerSequence => {
            for seq in set.iter_mut() {
                let points = original_points(seq);
                match fit(&points, opts) {
                    Ok(fit) => {
                        set_circle(seq, fit.center, fit.radius);
                        summaries.push(CircleSummary {
                            sequence: seq.id.clone(),
                            center: fit.center,
                            radius: fit.radius,
                            rms: fit.rms,
                            num_points: points.len(),
                            downweighted: fit.num_downweighted(DOWNWEIGHT_THRESHOLD),
                            converged: fit.report.converged,
                            source: CenterSource::Fitted,
                        });
                    }
                    Err(err) => {
                        report(diagnostics, Stage::FitCircles, Some(&seq.id), err.to_string())
                    }
                }
            }
        }
        CenterStrategy::SharedBest => {
            let best = set
                .iter()
                .map(|seq| (seq.id.clone(), original_points(seq)))
                .fold(None::<(String, Vec<Pt2>)>, |best, cand| match best {
                    Some(b) if b.1.len() >= cand.1.len() => Some(b),
                    _ => Some(cand),
                });
            let Some((best_id, best_points)) = best else {
                return summaries;
            };

            let fit = match fit(&best_points, opts) {
                Ok(fit) => fit,
                Err(err) => {
                    report(
                        diagnostics,
                        Stage::FitCircles,
                        None,
                        format!("no shared center: best sequence {best_id} failed: {err}"),
                    );
                    return summaries;
                }
            };
            log::info!(
                "shared center ({:.4}, {:.4}) from {} ({} points, rms {:.4})",
                fit.center.x,
                fit.center.y,
                best_id,
                best_points.len(),
                fit.rms
            );

            for seq in set.iter_mut() {
                if seq.id == best_id {
                    set_circle(seq, fit.center, fit.radius);
                    summaries.push(CircleSummary {
                        sequence: seq.id.clone(),
                        center: fit.center,
                        radius: fit.radius,
                        rms: fit.rms,
                        num_points: best_points.len(),
                        downweighted: fit.num_downweighted(DOWNWEIGHT_THRESHOLD),
                        converged: fit.report.converged,
                        source: CenterSource::Fitted,
                    });
                    continue;
                }
                let points = original_points(seq);
                if points.len() < min_points {
                    report(
                        diagnostics,
                        Stage::FitCircles,
                        Some(&seq.id),
                        format!(
                            "need at least {min_points} original points for a radius, got {}",
                            points.len()
                        ),
                    );
                    continue;
                }
                let Some(radius) = mean_distance(&points, &fit.center) else {
                    continue;
                };
                set_circle(seq, fit.center, radius);
                summaries.push(CircleSummary {
                    sequence: seq.id.clone(),
                    center: fit.center,
                    radius,
                    rms: radial_rms(&points, &fit.center, radius),
                    num_points: points.len(),
                    downweighted: 0,
                    converged: true,
                    source: CenterSource::Shared,
                });
            }
        }
        CenterStrategy::Fixed { center, radii } => {
            for seq in set.iter_mut() {
                let points = original_points(seq);
                let radius = match radii.get(&seq.id) {
                    Some(r) => *r,
                    None if points.len() >= min_points => match mean_distance(&points, center) {
                        Some(r) => r,
                        None => continue,
                    },
                    None => {
                        report(
                            diagnostics,
                            Stage::FitCircles,
                            Some(&seq.id),
                            format!(
                                "no configured radius and only {} original points",
                                points.len()
                            ),
                        );
                        continue;
                    }
                };
                set_circle(seq, *center, radius);
                summaries.push(CircleSummary {
                    sequence: seq.id.clone(),
                    center: *center,
                    radius,
                    rms: radial_rms(&points, center, radius),
                    num_points: points.len(),
                    downweighted: 0,
                    converged: true,
                    source: CenterSource::Fixed,
                });
            }
        }
    }

    for s in &summaries {
        if s.downweighted > 0 {
            log::warn!(
                "{}: {} of {} originals look mis-measured and were down-weighted",
                s.sequence,
                s.downweighted,
                s.num_points
            );
        }
        log::info!(
            "{}: center=({:.4}, {:.4}) r={:.4} rms={:.4} from {} points",
            s.sequence,
            s.center.x,
            s.center.y,
            s.radius,
            s.rms,
            s.num_points
        );
    }
    summaries
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_core::synthetic::sweep::{SweepSpec, sweep};
    use gantry_core::{Pt3, angle_to_xy};

    fn two_sequences() -> SequenceSet {
        let mut set = SequenceSet::new();
        set.insert(sweep(&SweepSpec {
            sequence_id: "Step01".into(),
            radius: 49.464486,
            num_images: 30,
            ..SweepSpec::default()
        }));
        set.insert(sweep(&SweepSpec {
            sequence_id: "Step02".into(),
            radius: 47.513978,
            num_images: 12,
            first_image: 5000,
            z: 4.0,
            ..SweepSpec::default()
        }));
        set
    }

    #[test]
    fn shared_center_keeps_per_sequence_radius() {
        let mut set = two_sequences();
        let mut diags = Vec::new();
        let summaries = fit_circles(&mut set, &CircleOptions::default(), &mut diags);

        assert!(diags.is_empty());
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].source, CenterSource::Fitted);
        assert_eq!(summaries[1].source, CenterSource::Shared);

        let s2 = set.get("Step02").unwrap();
        let (c, r) = s2.circle().unwrap();
        assert!((c - SweepSpec::default().center).norm() < 1e-6);
        assert!((r - 47.513978).abs() < 1e-6);
        assert_eq!(s2.z_reference, Some(4.0));
    }

    #[test]
    fn too_few_points_skips_sequence() {
        let mut set = two_sequences();
        for r in set.get_mut("Step02").unwrap().items.iter_mut().skip(2) {
            r.relabel(Status::Uncalibrated);
        }
        let opts = CircleOptions {
            center: CenterStrategy::PerSequence,
            ..Default::default()
        };
        let mut diags = Vec::new();
        let summaries = fit_circles(&mut set, &opts, &mut diags);

        assert_eq!(summaries.len(), 1);
        assert!(set.get("Step02").unwrap().circle().is_none());
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].sequence.as_deref(), Some("Step02"));
    }

    #[test]
    fn fixed_center_uses_configured_radii() {
        let mut set = two_sequences();
        let center = Pt2::new(44.21328905, -29.13029399);
        let opts = CircleOptions {
            center: CenterStrategy::Fixed {
                center,
                radii: BTreeMap::from([("Step01".to_string(), 49.464486)]),
            },
            ..Default::default()
        };
        let mut diags = Vec::new();
        fit_circles(&mut set, &opts, &mut diags);
        assert_eq!(set.get("Step01").unwrap().circle(), Some((center, 49.464486)));
        // Step02 falls back to the mean distance of its originals
        let r2 = set.get("Step02").unwrap().radius.unwrap();
        assert!((r2 - 47.513978).abs() < 1e-3);
    }

    #[test]
    fn robust_loss_ignores_misplaced_original() {
        let spec = SweepSpec {
            num_images: 30,
            step_deg: 6.0,
            ..SweepSpec::default()
        };
        let mut seq = sweep(&spec);
        // image 7 measured 3 m outside the track
        let p = angle_to_xy(spec.angle_of(7), spec.radius + 3.0, &spec.center);
        seq.items[7].position = Some(Pt3::new(p.x, p.y, spec.z));
        let mut set = SequenceSet::new();
        set.insert(seq);

        let plain = CircleOptions {
            center: CenterStrategy::PerSequence,
            ..Default::default()
        };
        let robust = CircleOptions {
            loss: RobustLoss::Huber { scale: 0.05 },
            ..plain.clone()
        };

        let mut diags = Vec::new();
        let summaries = fit_circles(&mut set.clone(), &plain, &mut diags);
        let plain_err = (summaries[0].center - spec.center).norm();
        assert_eq!(summaries[0].downweighted, 0);

        let summaries = fit_circles(&mut set, &robust, &mut diags);
        let robust_err = (summaries[0].center - spec.center).norm();
        assert!(diags.is_empty());
        assert_eq!(summaries[0].downweighted, 1);
        assert!(robust_err < 0.05, "robust center off by {robust_err}");
        assert!(
            robust_err < plain_err / 3.0,
            "robust {robust_err} vs plain {plain_err}"
        );
        let radius = set.get("Step01").unwrap().radius.unwrap();
        assert!((radius - spec.radius).abs() < 0.05, "radius {radius}");
    }

    #[test]
    fn no_originals_means_no_circle() {
        let mut set = two_sequences();
        for r in set.records_mut() {
            r.relabel(Status::Uncalibrated);
        }
        let mut diags = Vec::new();
        let summaries = fit_circles(&mut set, &CircleOptions::default(), &mut diags);
        assert!(summaries.is_empty());
        assert!(set.iter().all(|s| s.circle().is_none()));
        assert!(!diags.is_empty());
    }
}
