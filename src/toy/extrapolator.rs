//! Straight-line extrapolation through a telescope
//!
//! ```text
//! x' = x + dz tan(theta) cos(phi)
//! y' = y + dz tan(theta) sin(phi)
//! P' = J P Jᵀ + Q_material
//! ```
//!
//! Material is applied on arrival at a detector plane: multiple scattering
//! inflates the angular variances, and electrons optionally branch into
//! several energy-loss hypotheses.

use nalgebra::{DMatrix, DVector};

use super::geometry::TelescopeGeometry;
use crate::gsf::errors::GsfError;
use crate::gsf::traits::MultiStateExtrapolator;
use crate::gsf::types::{
    Component, ComponentVec, MultiComponentState, ParticleHypothesis, PropDirection, Surface,
    TrackParam, N_TRACK_PARAMS,
};

const LOC1: usize = TrackParam::Loc1.index();
const LOC2: usize = TrackParam::Loc2.index();
const PHI: usize = TrackParam::Phi.index();
const THETA: usize = TrackParam::Theta.index();
const QOP: usize = TrackParam::QOverP.index();

/// Highland scattering constant in GeV
const HIGHLAND_SCALE: f64 = 0.0136;

/// Energy-loss branching applied to electrons crossing material
#[derive(Debug, Clone, PartialEq)]
pub struct BremsstrahlungModel {
    /// `(weight, retained momentum fraction)` per branch
    pub branches: Vec<(f64, f64)>,
    /// Relative `qOverP` variance added to every branch
    pub relative_variance: f64,
}

impl BremsstrahlungModel {
    /// Three-branch model: no loss, moderate loss, hard radiation
    pub fn three_branch() -> Self {
        Self {
            branches: vec![(0.6, 1.0), (0.3, 0.9), (0.1, 0.6)],
            relative_variance: 1e-4,
        }
    }
}

/// Per-fit bookkeeping
#[derive(Debug, Clone, Default)]
pub struct ExtrapolationCache {
    /// Extrapolation calls made with this cache
    pub steps: usize,
    /// Detector planes crossed with material effects applied
    pub material_crossings: usize,
}

/// Straight-line multi-component extrapolator for [`TelescopeGeometry`]
#[derive(Debug, Clone)]
pub struct StraightLineExtrapolator {
    geometry: TelescopeGeometry,
    bremsstrahlung: Option<BremsstrahlungModel>,
}

impl StraightLineExtrapolator {
    pub fn new(geometry: TelescopeGeometry) -> Self {
        Self {
            geometry,
            bremsstrahlung: None,
        }
    }

    pub fn with_bremsstrahlung(mut self, model: BremsstrahlungModel) -> Self {
        self.bremsstrahlung = Some(model);
        self
    }

    pub fn geometry(&self) -> &TelescopeGeometry {
        &self.geometry
    }

    fn z_of(&self, surface: &Surface, role: &str) -> Result<f64, GsfError> {
        self.geometry
            .z_of(surface)
            .ok_or_else(|| GsfError::ExtrapolationFailed {
                surface: surface.id(),
                description: format!("{} surface is not part of the telescope", role),
            })
    }

    /// Transport Jacobian over `dz`
    fn jacobian(parameters: &DVector<f64>, dz: f64) -> DMatrix<f64> {
        let (sin_phi, cos_phi) = parameters[PHI].sin_cos();
        let theta = parameters[THETA];
        let tan_theta = theta.tan();
        let cos2_theta = theta.cos().powi(2);

        let mut j = DMatrix::identity(N_TRACK_PARAMS, N_TRACK_PARAMS);
        j[(LOC1, PHI)] = -dz * tan_theta * sin_phi;
        j[(LOC1, THETA)] = dz * cos_phi / cos2_theta;
        j[(LOC2, PHI)] = dz * tan_theta * cos_phi;
        j[(LOC2, THETA)] = dz * sin_phi / cos2_theta;
        j
    }

    fn transport(component: &Component, dz: f64, target: &Surface) -> Result<Component, GsfError> {
        let p = &component.parameters;
        let theta = p[THETA];
        if theta.cos().abs() < 1e-9 {
            return Err(GsfError::ExtrapolationFailed {
                surface: target.id(),
                description: "track runs parallel to the detector planes".to_string(),
            });
        }

        let (sin_phi, cos_phi) = p[PHI].sin_cos();
        let tan_theta = theta.tan();
        let mut parameters = p.clone();
        parameters[LOC1] += dz * tan_theta * cos_phi;
        parameters[LOC2] += dz * tan_theta * sin_phi;

        let covariance = component.covariance.as_ref().map(|cov| {
            let j = Self::jacobian(p, dz);
            &j * cov * j.transpose()
        });

        Ok(Component {
            weight: component.weight,
            parameters,
            covariance,
        })
    }

    /// Highland multiple scattering on the angular variances
    fn scatter(component: &mut Component, thickness: f64) {
        let Some(cov) = component.covariance.as_mut() else {
            return;
        };
        let q_over_p = component.parameters[QOP].abs();
        let theta0 =
            HIGHLAND_SCALE * q_over_p * thickness.sqrt() * (1.0 + 0.038 * thickness.ln());
        let variance = theta0 * theta0;
        let sin_theta = component.parameters[THETA].sin();

        cov[(THETA, THETA)] += variance;
        if sin_theta.abs() > 1e-9 {
            cov[(PHI, PHI)] += variance / (sin_theta * sin_theta);
        }
    }

    /// Split one component into energy-loss branches
    fn branch(
        model: &BremsstrahlungModel,
        component: &Component,
        direction: PropDirection,
        out: &mut ComponentVec,
    ) {
        for &(weight, fraction) in &model.branches {
            let mut parameters = component.parameters.clone();
            parameters[QOP] = match direction {
                PropDirection::AlongMomentum => parameters[QOP] / fraction,
                PropDirection::OppositeMomentum => parameters[QOP] * fraction,
            };
            let covariance = component.covariance.as_ref().map(|cov| {
                let mut cov = cov.clone();
                cov[(QOP, QOP)] += model.relative_variance * parameters[QOP] * parameters[QOP];
                cov
            });
            out.push(Component {
                weight: component.weight * weight,
                parameters,
                covariance,
            });
        }
    }

    fn propagate(
        &self,
        cache: &mut ExtrapolationCache,
        state: &MultiComponentState,
        target: &Surface,
        direction: PropDirection,
        particle: ParticleHypothesis,
    ) -> Result<MultiComponentState, GsfError> {
        cache.steps += 1;

        let z_start = self.z_of(state.surface(), "start")?;
        let z_target = self.z_of(target, "target")?;
        let dz = z_target - z_start;

        let wrong_way = match direction {
            PropDirection::AlongMomentum => dz < 0.0,
            PropDirection::OppositeMomentum => dz > 0.0,
        };
        if wrong_way {
            return Err(GsfError::ExtrapolationFailed {
                surface: target.id(),
                description: format!("target lies {:?} from z = {}", direction, z_start),
            });
        }

        let thickness = self.geometry.material_at(target);
        let interacts = particle != ParticleHypothesis::NonInteracting && thickness > 0.0 && dz != 0.0;
        if interacts {
            cache.material_crossings += 1;
        }

        let mut components = ComponentVec::new();
        for component in state.iter() {
            let mut moved = Self::transport(component, dz, target)?;
            if !interacts {
                components.push(moved);
                continue;
            }
            Self::scatter(&mut moved, thickness);
            match (&self.bremsstrahlung, particle) {
                (Some(model), ParticleHypothesis::Electron) => {
                    Self::branch(model, &moved, direction, &mut components)
                }
                _ => components.push(moved),
            }
        }

        let mut result = MultiComponentState::from_components(*target, components);
        result.normalize_weights();
        Ok(result)
    }
}

impl MultiStateExtrapolator for StraightLineExtrapolator {
    type Cache = ExtrapolationCache;

    fn extrapolate(
        &self,
        cache: &mut Self::Cache,
        state: &MultiComponentState,
        target: &Surface,
        direction: PropDirection,
        particle: ParticleHypothesis,
    ) -> Result<MultiComponentState, GsfError> {
        self.propagate(cache, state, target, direction, particle)
    }

    fn extrapolate_directly(
        &self,
        state: &MultiComponentState,
        target: &Surface,
        direction: PropDirection,
        particle: ParticleHypothesis,
    ) -> Result<MultiComponentState, GsfError> {
        self.propagate(
            &mut ExtrapolationCache::default(),
            state,
            target,
            direction,
            particle,
        )
    }

    fn name(&self) -> &'static str {
        "StraightLineExtrapolator"
    }
}
