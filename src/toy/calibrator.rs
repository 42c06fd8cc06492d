//! Planar hit calibration

use crate::gsf::traits::HitCalibrator;
use crate::gsf::types::{Measurement, RawHit, TrackParam, TrackParameters};

/// Turns raw telescope hits into measurements
///
/// The nominal hit covariance is inflated for inclined tracks:
/// `V' = V (1 + incidence_scale * tan²(theta))`, with `theta` taken from the
/// predicted state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlanarCalibrator {
    incidence_scale: f64,
}

impl Default for PlanarCalibrator {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl PlanarCalibrator {
    pub fn new(incidence_scale: f64) -> Self {
        Self { incidence_scale }
    }
}

impl HitCalibrator for PlanarCalibrator {
    fn correct(&self, hit: &RawHit, predicted: &TrackParameters) -> Option<Measurement> {
        let surface = hit.surface?;
        let theta = predicted.get(TrackParam::Theta);
        if !theta.is_finite() {
            return None;
        }
        let inflation = 1.0 + self.incidence_scale * theta.tan().powi(2);
        Measurement::new(
            hit.local_position.clone(),
            &hit.local_covariance * inflation,
            &hit.measured,
            surface,
        )
        .ok()
    }

    fn name(&self) -> &'static str {
        "PlanarCalibrator"
    }
}
