//! Robust losses expressed as IRLS row weights.
//!
//! A loss `rho(r)` enters the solver as a per-row weight `w(r)` so that
//! weighted least squares with fixed weights approximates the robust
//! objective. Weights are recomputed between solver rounds.

use gantry_core::Real;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum RobustLoss {
    /// Plain least squares.
    #[default]
    None,
    /// Quadratic up to `scale`, linear beyond.
    Huber { scale: Real },
    /// `log(1 + (r/scale)^2)`; gross outliers get weight close to zero.
    Cauchy { scale: Real },
}

impl RobustLoss {
    pub fn is_none(&self) -> bool {
        matches!(self, RobustLoss::None)
    }

    /// IRLS weight of a residual, in `(0, 1]`.
    pub fn weight(&self, r: Real) -> Real {
        let a = r.abs();
        match *self {
            RobustLoss::None => 1.0,
            RobustLoss::Huber { scale } => {
                if a <= scale {
                    1.0
                } else {
                    scale / a
                }
            }
            RobustLoss::Cauchy { scale } => {
                let u = a / scale;
                1.0 / (1.0 + u * u)
            }
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        match *self {
            RobustLoss::None => Ok(()),
            RobustLoss::Huber { scale } | RobustLoss::Cauchy { scale } => {
                if scale.is_finite() && scale > 0.0 {
                    Ok(())
                } else {
                    Err(format!("robust loss scale must be positive, got {scale}"))
                }
            }
        }
    }
}
