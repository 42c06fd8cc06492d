//! Seeded toy tracks through a telescope

use nalgebra::{DMatrix, DVector};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use smallvec::smallvec;

use super::geometry::TelescopeGeometry;
use crate::gsf::types::{
    DetectorId, Measurement, RawHit, Surface, TrackParam, TrackParameters,
};

/// One generated track
#[derive(Debug, Clone)]
pub struct ToyTrack {
    /// True perigee parameters
    pub truth: TrackParameters,
    /// Seed for the fit: truth with a small fixed offset
    pub seed: TrackParameters,
    /// Calibrated 2D hits, innermost first
    pub measurements: Vec<Measurement>,
    /// The same hits in raw form
    pub raw_hits: Vec<RawHit>,
    /// Calorimeter constraint on `qOverP`, when the geometry has a calorimeter
    pub calorimeter: Option<Measurement>,
}

/// Deterministic straight-track generator
///
/// Tracks start near the perigee origin with `theta ≈ 0.1` and
/// `phi ≈ 0.25`, and are measured on every plane with Gaussian noise.
#[derive(Debug, Clone)]
pub struct ToyTrackGenerator {
    geometry: TelescopeGeometry,
    rng: StdRng,
    /// Hit resolution (mm)
    pub hit_sigma: f64,
    /// Nominal `qOverP` (1/GeV)
    pub q_over_p: f64,
    /// Relative resolution of the calorimeter constraint
    pub calorimeter_resolution: f64,
    /// `(plane index, displacement in units of hit_sigma)` added to `loc1`
    outliers: Vec<(usize, f64)>,
}

impl ToyTrackGenerator {
    pub fn new(geometry: TelescopeGeometry, seed: u64) -> Self {
        Self {
            geometry,
            rng: StdRng::seed_from_u64(seed),
            hit_sigma: 0.01,
            q_over_p: 0.1,
            calorimeter_resolution: 0.05,
            outliers: Vec::new(),
        }
    }

    /// Displace the hit on `plane` by `shift` hit resolutions in `loc1`
    pub fn with_outlier(mut self, plane: usize, shift: f64) -> Self {
        self.outliers.push((plane, shift));
        self
    }

    pub fn geometry(&self) -> &TelescopeGeometry {
        &self.geometry
    }

    fn gaussian(&mut self) -> f64 {
        self.rng.sample::<f64, _>(StandardNormal)
    }

    /// Generate the next track
    pub fn generate(&mut self) -> ToyTrack {
        let loc1 = 0.1 * self.gaussian();
        let loc2 = 0.1 * self.gaussian();
        let phi = 0.25 + 0.01 * self.gaussian();
        let theta = 0.1 + 0.005 * self.gaussian();
        let q_over_p = self.q_over_p;

        let truth_vector = DVector::from_vec(vec![loc1, loc2, phi, theta, q_over_p]);
        let seed_vector =
            DVector::from_vec(vec![loc1 + 0.05, loc2 + 0.05, phi + 1e-4, theta + 1e-4, q_over_p]);

        let (sin_phi, cos_phi) = phi.sin_cos();
        let tan_theta = theta.tan();
        let variance = self.hit_sigma * self.hit_sigma;

        let mut measurements = Vec::with_capacity(self.geometry.num_planes());
        let mut raw_hits = Vec::with_capacity(self.geometry.num_planes());

        for (index, surface) in self.geometry.detectors().into_iter().enumerate() {
            let z = self.geometry.z_of(&surface).unwrap_or_default();
            let mut x = loc1 + z * tan_theta * cos_phi + self.hit_sigma * self.gaussian();
            let y = loc2 + z * tan_theta * sin_phi + self.hit_sigma * self.gaussian();
            for &(plane, shift) in &self.outliers {
                if plane == index {
                    x += shift * self.hit_sigma;
                }
            }

            let detector_id = DetectorId(index as u64);
            measurements.push(
                Measurement::position_2d(surface, x, y, self.hit_sigma, self.hit_sigma)
                    .with_detector_id(detector_id),
            );
            raw_hits.push(RawHit {
                detector_id,
                surface: Some(surface),
                local_position: DVector::from_vec(vec![x, y]),
                local_covariance: DMatrix::identity(2, 2) * variance,
                measured: smallvec![TrackParam::Loc1, TrackParam::Loc2],
            });
        }

        let calorimeter = self.geometry.calorimeter().map(|surface| {
            let sigma = self.calorimeter_resolution * q_over_p;
            let measured = q_over_p + sigma * self.gaussian();
            Measurement::calo_cluster(surface, measured, sigma)
        });

        ToyTrack {
            truth: TrackParameters {
                parameters: truth_vector,
                covariance: None,
                surface: Surface::perigee(),
            },
            seed: TrackParameters {
                parameters: seed_vector,
                covariance: None,
                surface: Surface::perigee(),
            },
            measurements,
            raw_hits,
            calorimeter,
        }
    }
}
