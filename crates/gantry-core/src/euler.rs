//! Euler-angle conventions used by photogrammetry exports.
//!
//! - Omega/Phi/Kappa: `R = Rx(omega) * Ry(phi) * Rz(kappa)`
//! - Yaw/Pitch/Roll:  `R = Rz(yaw) * Ry(pitch) * Rx(roll)`
//!
//! All angles are in degrees. Both decompositions are singular when the
//! middle angle reaches ±90°, which a gantry camera never does.

use nalgebra::{Rotation3, Vector3};
use serde::{Deserialize, Serialize};

use crate::{Mat3, Real};

/// Omega/Phi/Kappa orientation in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Opk {
    pub omega: Real,
    pub phi: Real,
    pub kappa: Real,
}

/// Yaw/Pitch/Roll orientation in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Ypr {
    pub yaw: Real,
    pub pitch: Real,
    pub roll: Real,
}

/// Which Euler convention a table of angles is written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AngleConvention {
    #[default]
    Opk,
    Ypr,
}

fn rot_x(deg: Real) -> Rotation3<Real> {
    Rotation3::from_axis_angle(&Vector3::x_axis(), deg.to_radians())
}

fn rot_y(deg: Real) -> Rotation3<Real> {
    Rotation3::from_axis_angle(&Vector3::y_axis(), deg.to_radians())
}

fn rot_z(deg: Real) -> Rotation3<Real> {
    Rotation3::from_axis_angle(&Vector3::z_axis(), deg.to_radians())
}

impl Opk {
    pub fn new(omega: Real, phi: Real, kappa: Real) -> Self {
        Self { omega, phi, kappa }
    }

    /// Rotation matrix `Rx(omega) * Ry(phi) * Rz(kappa)`.
    pub fn rotation(&self) -> Mat3 {
        (rot_x(self.omega) * rot_y(self.phi) * rot_z(self.kappa)).into_inner()
    }

    /// Decompose a rotation matrix into Omega/Phi/Kappa.
    pub fn from_rotation(r: &Mat3) -> Self {
        let phi = r[(0, 2)].clamp(-1.0, 1.0).asin();
        let omega = (-r[(1, 2)]).atan2(r[(2, 2)]);
        let kappa = (-r[(0, 1)]).atan2(r[(0, 0)]);
        Self {
            omega: omega.to_degrees(),
            phi: phi.to_degrees(),
            kappa: kappa.to_degrees(),
        }
    }

    pub fn to_ypr(&self) -> Ypr {
        Ypr::from_rotation(&self.rotation())
    }

    pub fn is_finite(&self) -> bool {
        self.omega.is_finite() && self.phi.is_finite() && self.kappa.is_finite()
    }
}

impl Ypr {
    pub fn new(yaw: Real, pitch: Real, roll: Real) -> Self {
        Self { yaw, pitch, roll }
    }

    /// Rotation matrix `Rz(yaw) * Ry(pitch) * Rx(roll)`.
    pub fn rotation(&self) -> Mat3 {
        (rot_z(self.yaw) * rot_y(self.pitch) * rot_x(self.roll)).into_inner()
    }

    /// Decompose a rotation matrix into Yaw/Pitch/Roll.
    pub fn from_rotation(r: &Mat3) -> Self {
        let (roll, pitch, yaw) = Rotation3::from_matrix_unchecked(*r).euler_angles();
        Self {
            yaw: yaw.to_degrees(),
            pitch: pitch.to_degrees(),
            roll: roll.to_degrees(),
        }
    }

    pub fn to_opk(&self) -> Opk {
        Opk::from_rotation(&self.rotation())
    }
}

/// Convert Yaw/Pitch/Roll to Omega/Phi/Kappa describing the same rotation.
pub fn ypr_to_opk(ypr: &Ypr) -> Opk {
    ypr.to_opk()
}

/// Convert Omega/Phi/Kappa to Yaw/Pitch/Roll describing the same rotation.
pub fn opk_to_ypr(opk: &Opk) -> Ypr {
    opk.to_ypr()
}
