use gantry_core::Real;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

/// Dense least-squares problem `min ½‖S·r(x)‖²` with an optional fixed
/// diagonal row scaling `S`.
pub trait NllsProblem {
    fn num_params(&self) -> usize;

    fn num_residuals(&self) -> usize;

    /// Residuals before row scaling.
    fn residuals_unweighted(&self, x: &DVector<Real>) -> DVector<Real>;

    /// Jacobian of [`Self::residuals_unweighted`].
    fn jacobian_unweighted(&self, x: &DVector<Real>) -> DMatrix<Real>;

    /// Square roots of the row weights, constant while a backend runs.
    /// `None` weights every row with 1.
    fn row_scales(&self) -> Option<&DVector<Real>> {
        None
    }

    fn residuals(&self, x: &DVector<Real>) -> DVector<Real> {
        let mut r = self.residuals_unweighted(x);
        if let Some(scales) = self.row_scales() {
            r.component_mul_assign(scales);
        }
        r
    }

    fn jacobian(&self, x: &DVector<Real>) -> DMatrix<Real> {
        let mut j = self.jacobian_unweighted(x);
        if let Some(scales) = self.row_scales() {
            for (mut row, s) in j.row_iter_mut().zip(scales.iter()) {
                row *= *s;
            }
        }
        j
    }
}

/// Termination settings shared by every backend.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolveOptions {
    /// Evaluation budget per parameter; LM stops after
    /// `max_iters * (num_params + 1)` residual evaluations.
    pub max_iters: usize,
    pub ftol: Real,
    pub gtol: Real,
    pub xtol: Real,
    /// Log every solver report at debug level.
    pub verbose: bool,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self {
            max_iters: 200,
            ftol: 1e-12,
            gtol: 1e-12,
            xtol: 1e-12,
            verbose: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolveReport {
    pub evaluations: usize,
    /// `½‖S·r‖²` at the starting point.
    pub initial_cost: Real,
    pub final_cost: Real,
    pub converged: bool,
}

pub trait NllsSolverBackend {
    fn solve<P: NllsProblem>(
        &self,
        problem: &P,
        x0: DVector<Real>,
        opts: &SolveOptions,
    ) -> (DVector<Real>, SolveReport);
}

#[cfg(test)]
mod tests {
    use super::*;

    /// `r_i = x - t_i`, weighted by `scales`.
    struct WeightedMean {
        targets: Vec<Real>,
        scales: Option<DVector<Real>>,
    }

    impl NllsProblem for WeightedMean {
        fn num_params(&self) -> usize {
            1
        }

        fn num_residuals(&self) -> usize {
            self.targets.len()
        }

        fn residuals_unweighted(&self, x: &DVector<Real>) -> DVector<Real> {
            DVector::from_iterator(self.targets.len(), self.targets.iter().map(|t| x[0] - t))
        }

        fn jacobian_unweighted(&self, _x: &DVector<Real>) -> DMatrix<Real> {
            DMatrix::from_element(self.targets.len(), 1, 1.0)
        }

        fn row_scales(&self) -> Option<&DVector<Real>> {
            self.scales.as_ref()
        }
    }

    #[test]
    fn row_scales_apply_to_residuals_and_jacobian() {
        let x = DVector::from_element(1, 1.0);
        let plain = WeightedMean {
            targets: vec![0.0, 3.0],
            scales: None,
        };
        assert_eq!(plain.residuals(&x).as_slice(), &[1.0, -2.0]);

        let scaled = WeightedMean {
            scales: Some(DVector::from_vec(vec![2.0, 0.5])),
            ..plain
        };
        assert_eq!(scaled.residuals(&x).as_slice(), &[2.0, -1.0]);
        let j = scaled.jacobian(&x);
        assert_eq!((j[(0, 0)], j[(1, 0)]), (2.0, 0.5));
    }
}
