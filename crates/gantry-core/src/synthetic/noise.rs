//! Deterministic jitter for synthetic sweeps.
//!
//! Every value is a pure function of `(seed, channel, image index)`, so a
//! fixture is identical on every platform and never depends on an RNG
//! crate's internals.

use crate::Real;

/// How far a synthetic camera strays from the ideal track.
///
/// Radial jitter moves a camera along its radius, which leaves its polar
/// angle untouched. Heading jitter perturbs Kappa only.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TrackJitter {
    pub seed: u64,
    /// Largest radial deviation (metres).
    pub radial: Real,
    /// Largest heading deviation (degrees).
    pub heading: Real,
}

#[derive(Clone, Copy)]
enum Channel {
    Radial = 1,
    Heading = 2,
}

impl TrackJitter {
    pub fn radial(seed: u64, max_abs: Real) -> Self {
        Self {
            seed,
            radial: max_abs,
            heading: 0.0,
        }
    }

    /// Radial offset of image `index`, in `[-radial, radial)`.
    pub fn radial_offset(&self, index: usize) -> Real {
        self.radial.abs() * symmetric_unit(self.seed, Channel::Radial, index)
    }

    /// Heading offset of image `index`, in `[-heading, heading)`.
    pub fn heading_offset(&self, index: usize) -> Real {
        self.heading.abs() * symmetric_unit(self.seed, Channel::Heading, index)
    }
}

/// Uniform value in `[-1, 1)`.
fn symmetric_unit(seed: u64, channel: Channel, index: usize) -> Real {
    let mut state = seed ^ ((channel as u64) << 56) ^ index as u64;
    // first output is discarded; it stays close for adjacent indices
    splitmix64(&mut state);
    let bits = splitmix64(&mut state) >> 11;
    bits as Real / (1u64 << 53) as Real * 2.0 - 1.0
}

fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
