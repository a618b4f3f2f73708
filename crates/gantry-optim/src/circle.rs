//! Geometric circle fit in the plane.
//!
//! Minimises `Σ w_i (‖p_i − c‖ − r)²` over `(cx, cy, r)`, seeded with the
//! centroid and the mean distance to it. With a robust loss the weights are
//! refreshed from the radial residuals between solver rounds, so a few
//! mis-measured originals do not drag the pivot.

use gantry_core::{Pt2, Real, mean};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backend_lm::LmBackend;
use crate::robust::RobustLoss;
use crate::{NllsProblem, NllsSolverBackend, SolveOptions, SolveReport};

/// Below this distance a point is treated as sitting on the center.
const DIST_EPS: Real = 1e-12;
/// Reweighting stops once no weight moves by more than this.
const WEIGHT_TOL: Real = 1e-6;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CircleFitError {
    #[error("need at least {needed} points for a circle fit, got {got}")]
    TooFewPoints { needed: usize, got: usize },
    #[error("points are degenerate (mean radial distance {0:.3e})")]
    Degenerate(Real),
    #[error("circle fit produced a non-finite result")]
    NonFinite,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircleFitOptions {
    /// Clamped to at least 3.
    pub min_points: usize,
    pub loss: RobustLoss,
    /// Upper bound on solver rounds when `loss` is robust.
    pub max_rounds: usize,
    pub solver: SolveOptions,
}

impl Default for CircleFitOptions {
    fn default() -> Self {
        Self {
            min_points: 3,
            loss: RobustLoss::None,
            max_rounds: 20,
            solver: SolveOptions::default(),
        }
    }
}

/// Fitted circle with its quality summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircleFit {
    pub center: Pt2,
    pub radius: Real,
    /// Unweighted RMS of the radial residuals.
    pub rms: Real,
    /// Final weight of every input point, all 1 without a robust loss.
    pub weights: Vec<Real>,
    /// Solver rounds run.
    pub rounds: usize,
    /// Report of the last round.
    pub report: SolveReport,
}

impl CircleFit {
    /// Points whose weight fell below `threshold`.
    pub fn num_downweighted(&self, threshold: Real) -> usize {
        self.weights.iter().filter(|w| **w < threshold).count()
    }
}

/// Radial residual problem, parameters `[cx, cy, r]`.
#[derive(Debug, Clone)]
pub struct CircleFitProblem {
    pub points: Vec<Pt2>,
    scales: Option<DVector<Real>>,
}

impl CircleFitProblem {
    pub fn new(points: Vec<Pt2>) -> Self {
        Self {
            points,
            scales: None,
        }
    }

    /// Fix per-point weights for the next solve.
    pub fn with_weights(mut self, weights: &[Real]) -> Self {
        self.scales = Some(DVector::from_iterator(
            weights.len(),
            weights.iter().map(|w| w.sqrt()),
        ));
        self
    }

    /// Centroid and mean distance to it.
    pub fn initial_guess(&self) -> DVector<Real> {
        let n = self.points.len().max(1) as Real;
        let centroid = self
            .points
            .iter()
            .fold(Pt2::origin(), |acc, p| acc + p.coords / n);
        let r0 = mean_distance(&self.points, &centroid).unwrap_or(0.0);
        DVector::from_vec(vec![centroid.x, centroid.y, r0])
    }
}

impl NllsProblem for CircleFitProblem {
    fn num_params(&self) -> usize {
        3
    }

    fn num_residuals(&self) -> usize {
        self.points.len()
    }

    fn residuals_unweighted(&self, x: &DVector<Real>) -> DVector<Real> {
        let c = Pt2::new(x[0], x[1]);
        DVector::from_iterator(
            self.points.len(),
            self.points.iter().map(|p| (p - c).norm() - x[2]),
        )
    }

    fn jacobian_unweighted(&self, x: &DVector<Real>) -> DMatrix<Real> {
        let c = Pt2::new(x[0], x[1]);
        let mut j = DMatrix::zeros(self.points.len(), 3);
        for (i, p) in self.points.iter().enumerate() {
            let d = p - c;
            let dist = d.norm();
            if dist > DIST_EPS {
                j[(i, 0)] = -d.x / dist;
                j[(i, 1)] = -d.y / dist;
            }
            j[(i, 2)] = -1.0;
        }
        j
    }

    fn row_scales(&self) -> Option<&DVector<Real>> {
        self.scales.as_ref()
    }
}

/// Mean distance of `points` to `center`, `None` when empty.
pub fn mean_distance(points: &[Pt2], center: &Pt2) -> Option<Real> {
    let d: Vec<Real> = points.iter().map(|p| (p - center).norm()).collect();
    mean(&d)
}

/// Plain least-squares fit with the Levenberg–Marquardt backend.
pub fn fit_circle(points: &[Pt2], solver: &SolveOptions) -> Result<CircleFit, CircleFitError> {
    let opts = CircleFitOptions {
        solver: *solver,
        ..CircleFitOptions::default()
    };
    fit_circle_with(&LmBackend, points, &opts)
}

/// Fit a circle with an explicit backend and options.
pub fn fit_circle_with<B: NllsSolverBackend>(
    backend: &B,
    points: &[Pt2],
    opts: &CircleFitOptions,
) -> Result<CircleFit, CircleFitError> {
    let needed = opts.min_points.max(3);
    if points.len() < needed {
        return Err(CircleFitError::TooFewPoints {
            needed,
            got: points.len(),
        });
    }

    let mut problem = CircleFitProblem::new(points.to_vec());
    let x0 = problem.initial_guess();
    if x0[2].is_nan() || x0[2] <= DIST_EPS {
        return Err(CircleFitError::Degenerate(x0[2]));
    }

    let (mut x, mut report) = backend.solve(&problem, x0, &opts.solver);
    let mut weights = vec![1.0; points.len()];
    let mut rounds = 1;
    while !opts.loss.is_none() && rounds < opts.max_rounds.max(1) {
        if !x.iter().all(|v| v.is_finite()) {
            break;
        }
        // (cx, cy, r) and (cx, cy, -r) give the same residual magnitudes
        x[2] = x[2].abs();
        let next: Vec<Real> = problem
            .residuals_unweighted(&x)
            .iter()
            .map(|r| opts.loss.weight(*r))
            .collect();
        let change = next
            .iter()
            .zip(&weights)
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, Real::max);
        weights = next;
        if change < WEIGHT_TOL {
            break;
        }
        problem = problem.with_weights(&weights);
        (x, report) = backend.solve(&problem, x, &opts.solver);
        rounds += 1;
    }

    if !x.iter().all(|v| v.is_finite()) {
        return Err(CircleFitError::NonFinite);
    }
    let center = Pt2::new(x[0], x[1]);
    let radius = x[2].abs();
    let r = problem.residuals_unweighted(&DVector::from_vec(vec![x[0], x[1], radius]));
    let rms = (r.norm_squared() / r.len() as Real).sqrt();

    let fit = CircleFit {
        center,
        radius,
        rms,
        weights,
        rounds,
        report,
    };
    log::debug!(
        "circle fit: center=({:.4}, {:.4}) r={:.4} rms={:.3e} rounds={} downweighted={} converged={}",
        center.x,
        center.y,
        radius,
        rms,
        rounds,
        fit.num_downweighted(0.5),
        fit.report.converged
    );
    Ok(fit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_core::angle_to_xy;

    fn arc(center: Pt2, radius: Real, from: Real, to: Real, n: usize) -> Vec<Pt2> {
        (0..n)
            .map(|i| {
                let t = i as Real / (n - 1) as Real;
                angle_to_xy(from + t * (to - from), radius, &center)
            })
            .collect()
    }

    #[test]
    fn recovers_exact_circle() {
        let center = Pt2::new(44.21328905, -29.13029399);
        let pts = arc(center, 47.513978, 10.0, 250.0, 25);
        let fit = fit_circle(&pts, &SolveOptions::default()).unwrap();
        assert!((fit.center - center).norm() < 1e-6, "center {:?}", fit.center);
        assert!((fit.radius - 47.513978).abs() < 1e-6, "radius {}", fit.radius);
        assert!(fit.rms < 1e-6);
    }

    #[test]
    fn short_arc_still_converges() {
        let center = Pt2::new(-3.0, 8.0);
        let pts = arc(center, 12.0, 80.0, 120.0, 9);
        let fit = fit_circle(&pts, &SolveOptions::default()).unwrap();
        assert!((fit.center - center).norm() < 1e-4, "center {:?}", fit.center);
        assert!((fit.radius - 12.0).abs() < 1e-4);
    }

    #[test]
    fn fit_is_idempotent() {
        let pts = vec![
            Pt2::new(10.1, 0.0),
            Pt2::new(0.0, 9.9),
            Pt2::new(-10.0, 0.2),
            Pt2::new(0.1, -10.05),
            Pt2::new(7.0, 7.1),
        ];
        let a = fit_circle(&pts, &SolveOptions::default()).unwrap();
        let b = fit_circle(&pts, &SolveOptions::default()).unwrap();
        assert_eq!(a.center, b.center);
        assert_eq!(a.radius, b.radius);
    }

    #[test]
    fn too_few_points_is_an_error() {
        let pts = vec![Pt2::new(1.0, 0.0), Pt2::new(0.0, 1.0)];
        let err = fit_circle(&pts, &SolveOptions::default()).unwrap_err();
        assert_eq!(err, CircleFitError::TooFewPoints { needed: 3, got: 2 });
    }

    #[test]
    fn coincident_points_are_degenerate() {
        let pts = vec![Pt2::new(1.0, 1.0); 4];
        let err = fit_circle(&pts, &SolveOptions::default()).unwrap_err();
        assert!(matches!(err, CircleFitError::Degenerate(_)));
    }

    #[test]
    fn huber_loss_downweights_outlier() {
        let center = Pt2::new(5.0, -3.0);
        let mut pts = arc(center, 30.0, 0.0, 180.0, 20);
        // one original measured 4 m off the track
        pts.push(angle_to_xy(95.0, 34.0, &center));

        let plain = fit_circle(&pts, &SolveOptions::default()).unwrap();
        let robust = fit_circle_with(
            &LmBackend,
            &pts,
            &CircleFitOptions {
                loss: RobustLoss::Huber { scale: 0.05 },
                ..CircleFitOptions::default()
            },
        )
        .unwrap();

        let plain_err = (plain.center - center).norm();
        let robust_err = (robust.center - center).norm();
        assert!(robust.rounds > 1);
        assert!(robust_err < 0.05, "robust center off by {robust_err}");
        assert!(
            robust_err < plain_err / 5.0,
            "robust {robust_err} vs plain {plain_err}"
        );
        assert!((robust.radius - 30.0).abs() < 0.05, "radius {}", robust.radius);

        let outlier = robust.weights[20];
        assert!(outlier < 0.05, "outlier weight {outlier}");
        assert!(robust.weights[..20].iter().all(|w| *w > 0.99));
        assert_eq!(robust.num_downweighted(0.5), 1);
        assert!(plain.weights.iter().all(|w| *w == 1.0));
        assert_eq!(plain.rounds, 1);
    }

    #[test]
    fn mean_distance_about_fixed_center() {
        let pts = vec![Pt2::new(3.0, 4.0), Pt2::new(0.0, 5.0), Pt2::new(-6.0, 8.0)];
        let r = mean_distance(&pts, &Pt2::origin()).unwrap();
        assert!((r - 20.0 / 3.0).abs() < 1e-12);
        assert_eq!(mean_distance(&[], &Pt2::origin()), None);
    }
}
