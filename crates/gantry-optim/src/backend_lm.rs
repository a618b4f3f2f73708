use gantry_core::Real;
use levenberg_marquardt::{LeastSquaresProblem, LevenbergMarquardt};
use nalgebra::{DMatrix, DVector, Dyn, storage::Owned};

use crate::{NllsProblem, NllsSolverBackend, SolveOptions, SolveReport};

/// Adapter from [`NllsProblem`] to the `levenberg-marquardt` crate.
///
/// Non-finite residuals or Jacobians are reported as `None`, which makes
/// the solver reject the step.
struct Adapter<'a, P> {
    problem: &'a P,
    x: DVector<Real>,
}

fn finite<T: IntoIterator<Item = Real>>(values: T) -> bool {
    values.into_iter().all(Real::is_finite)
}

impl<P: NllsProblem> LeastSquaresProblem<Real, Dyn, Dyn> for Adapter<'_, P> {
    type ResidualStorage = Owned<Real, Dyn>;
    type JacobianStorage = Owned<Real, Dyn, Dyn>;
    type ParameterStorage = Owned<Real, Dyn>;

    fn set_params(&mut self, x: &DVector<Real>) {
        self.x.copy_from(x);
    }

    fn params(&self) -> DVector<Real> {
        self.x.clone()
    }

    fn residuals(&self) -> Option<DVector<Real>> {
        let r = self.problem.residuals(&self.x);
        finite(r.iter().copied()).then_some(r)
    }

    fn jacobian(&self) -> Option<DMatrix<Real>> {
        let j = self.problem.jacobian(&self.x);
        finite(j.iter().copied()).then_some(j)
    }
}

/// Levenberg–Marquardt (MINPACK port of the `levenberg-marquardt` crate).
#[derive(Debug, Default, Clone, Copy)]
pub struct LmBackend;

impl NllsSolverBackend for LmBackend {
    fn solve<P: NllsProblem>(
        &self,
        problem: &P,
        x0: DVector<Real>,
        opts: &SolveOptions,
    ) -> (DVector<Real>, SolveReport) {
        let initial_cost = 0.5 * problem.residuals(&x0).norm_squared();
        let (adapter, report) = LevenbergMarquardt::new()
            .with_ftol(opts.ftol)
            .with_xtol(opts.xtol)
            .with_gtol(opts.gtol)
            .with_patience(opts.max_iters.max(1))
            .minimize(Adapter { problem, x: x0 });

        let summary = SolveReport {
            evaluations: report.number_of_evaluations,
            initial_cost,
            final_cost: report.objective_function,
            converged: report.termination.was_successful(),
        };
        if opts.verbose {
            log::debug!("LM: {summary:?}, termination {:?}", report.termination);
        }
        (adapter.x, summary)
    }
}
