//! Synthetic circular sweeps.
//!
//! A sweep places `num_images` cameras on a circle at evenly spaced polar
//! angles, heading along the track with a constant offset from the ideal
//! tangent. Every generated record carries its true pose and status
//! `original`; [`strip_poses`] turns it into what a ground-truth file would
//! provide.

use chrono::{DateTime, Duration, NaiveDateTime};

use super::noise::TrackJitter;
use crate::{
    ImageRecord, Opk, Pt2, Pt3, Real, SequenceInfo, Status, TravelDirection, angle_to_xy,
    polar_angle, wrap_360,
};

/// Parameters of one synthetic sweep.
#[derive(Debug, Clone)]
pub struct SweepSpec {
    pub sequence_id: String,
    pub center: Pt2,
    pub radius: Real,
    pub z: Real,
    /// Polar angle of the first image (degrees).
    pub start_angle: Real,
    /// Absolute angular step between consecutive images (degrees).
    pub step_deg: Real,
    pub num_images: usize,
    pub first_image: u64,
    pub start_time: NaiveDateTime,
    pub frame_interval_s: i64,
    /// Extra pause inserted after the given image index (seconds).
    pub pauses: Vec<(usize, i64)>,
    pub direction: TravelDirection,
    /// Kappa minus ideal tangent heading (degrees).
    pub heading_offset: Real,
    pub omega: Real,
    pub phi: Real,
    pub jitter: TrackJitter,
}

impl Default for SweepSpec {
    fn default() -> Self {
        Self {
            sequence_id: "Step01".to_string(),
            center: Pt2::new(44.213, -29.130),
            radius: 47.5,
            z: 5.6,
            start_angle: 20.0,
            step_deg: 2.0,
            num_images: 40,
            first_image: 4100,
            start_time: DateTime::from_timestamp(1_715_940_000, 0)
                .map(|dt| dt.naive_utc())
                .unwrap_or_default(),
            frame_interval_s: 2,
            pauses: Vec::new(),
            direction: TravelDirection::Counterclockwise,
            heading_offset: -3.0,
            omega: 1.5,
            phi: -0.8,
            jitter: TrackJitter::default(),
        }
    }
}

impl SweepSpec {
    /// True polar angle of image `index`.
    pub fn angle_of(&self, index: usize) -> Real {
        wrap_360(self.start_angle + self.direction.sign() * self.step_deg * index as Real)
    }
}

/// Generate the fully-posed sweep described by `spec`.
pub fn sweep(spec: &SweepSpec) -> SequenceInfo {
    let mut seq = SequenceInfo::new(spec.sequence_id.clone());
    let mut elapsed = 0i64;

    for i in 0..spec.num_images {
        let angle = spec.angle_of(i);
        let radius = spec.radius + spec.jitter.radial_offset(i);
        let p = angle_to_xy(angle, radius, &spec.center);
        let heading = wrap_360(
            polar_angle(&spec.center, &p)
                + spec.direction.sign() * 90.0
                + spec.heading_offset
                + spec.jitter.heading_offset(i),
        );

        seq.items.push(ImageRecord {
            id: spec.first_image + i as u64,
            filename: format!("Gantry-2024-{}_pt.jpg", spec.first_image + i as u64),
            timestamp: Some(spec.start_time + Duration::seconds(elapsed)),
            sequence_id: spec.sequence_id.clone(),
            cluster_id: None,
            position: Some(Pt3::new(p.x, p.y, spec.z)),
            orientation: Some(Opk::new(spec.omega, spec.phi, heading)),
            angular_position: Some(polar_angle(&spec.center, &p)),
            status: Status::Original,
        });

        elapsed += spec.frame_interval_s;
        for (after, pause) in &spec.pauses {
            if *after == i {
                elapsed += pause;
            }
        }
    }
    seq
}

/// Drop every pose-derived field, leaving what ground truth provides.
pub fn strip_poses(seq: &SequenceInfo) -> SequenceInfo {
    let mut stripped = SequenceInfo::new(seq.id.clone());
    stripped.items = seq
        .items
        .iter()
        .map(|r| ImageRecord {
            cluster_id: None,
            position: None,
            orientation: None,
            angular_position: None,
            status: Status::Uncalibrated,
            ..r.clone()
        })
        .collect();
    stripped
}
