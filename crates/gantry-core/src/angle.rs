//! Planar angle helpers in degrees.
//!
//! Every angle the pipeline stores is in degrees. Polar angles are measured
//! counter-clockwise from the +X axis around a sequence center and live in
//! `[0, 360)`. Differences between angles are taken along the short arc and
//! live in `[-180, 180)`.

use serde::{Deserialize, Serialize};

use crate::{Pt2, Real};

/// Wrap an angle into `[0, 360)`.
pub fn wrap_360(deg: Real) -> Real {
    let r = deg.rem_euclid(360.0);
    // rem_euclid rounds tiny negative inputs up to exactly 360.0
    if r >= 360.0 { 0.0 } else { r }
}

/// Wrap an angle into `[-180, 180)`.
pub fn wrap_180(deg: Real) -> Real {
    wrap_360(deg + 180.0) - 180.0
}

/// Signed short-arc difference `to - from` in `[-180, 180)`.
pub fn short_arc_delta(from: Real, to: Real) -> Real {
    wrap_180(to - from)
}

/// Re-express `to` as the continuation of `from` along the short arc.
///
/// The result may leave `[0, 360)`; `continuation(350, 10) == 370`.
pub fn continuation(from: Real, to: Real) -> Real {
    from + short_arc_delta(from, to)
}

/// Interpolate between two angles along the short arc, `t` in `[0, 1]`.
pub fn lerp_short_arc(a: Real, b: Real, t: Real) -> Real {
    a + t * short_arc_delta(a, b)
}

/// Polar angle of `p` around `center`, in `[0, 360)`.
pub fn polar_angle(center: &Pt2, p: &Pt2) -> Real {
    wrap_360((p.y - center.y).atan2(p.x - center.x).to_degrees())
}

/// Point on the circle `(center, radius)` at polar angle `angle_deg`.
pub fn angle_to_xy(angle_deg: Real, radius: Real, center: &Pt2) -> Pt2 {
    let rad = angle_deg.to_radians();
    Pt2::new(center.x + radius * rad.cos(), center.y + radius * rad.sin())
}

/// Direction in which a sequence sweeps around its center.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TravelDirection {
    /// Polar angle increases over time.
    #[default]
    Counterclockwise,
    /// Polar angle decreases over time.
    Clockwise,
}

impl TravelDirection {
    /// `+1` for counter-clockwise travel, `-1` for clockwise.
    pub fn sign(self) -> Real {
        match self {
            TravelDirection::Counterclockwise => 1.0,
            TravelDirection::Clockwise => -1.0,
        }
    }

    /// Direction implied by an accumulated signed angle change.
    ///
    /// Returns `None` when the change is zero (or not finite) and the
    /// direction cannot be decided.
    pub fn from_signed_sweep(sweep_deg: Real) -> Option<Self> {
        if !sweep_deg.is_finite() || sweep_deg == 0.0 {
            None
        } else if sweep_deg > 0.0 {
            Some(TravelDirection::Counterclockwise)
        } else {
            Some(TravelDirection::Clockwise)
        }
    }
}

/// Heading of pure circular motion at `p`, in `[0, 360)`.
///
/// The heading is the radial direction rotated by 90° towards the direction
/// of travel.
pub fn ideal_tangent(center: &Pt2, p: &Pt2, direction: TravelDirection) -> Real {
    wrap_360(polar_angle(center, p) + direction.sign() * 90.0)
}
